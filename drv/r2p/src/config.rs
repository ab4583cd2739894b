// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boot-time configuration.
//!
//! [`BOOT_PARAMS`] and [`POLICY`] are generated by `build.rs` from the
//! `HUBRIS_TASK_CONFIG` table, falling back to [`BootParams::EMPTY`] and
//! [`Policy::DEFAULT`] when there isn't one.

use drv_tegra_smc::TailFill;

/// Initial values for the four configuration fields.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BootParams<'a> {
    pub action: &'a str,
    pub entry_id: &'a str,
    pub param1: i32,
    pub param2: i32,
}

impl BootParams<'static> {
    pub const EMPTY: Self = Self {
        action: "",
        entry_id: "",
        param1: 0,
        param2: 0,
    };
}

/// Behavior that has to be settled per board rather than assumed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    /// On compact parts, write the cleared encoding for a normal reboot so
    /// that a stale reason from an earlier reboot is not picked up again.
    pub encode_nop_on_new_hardware: bool,
    /// What a short final chunk carries past the end of the payload.
    pub tail_fill: TailFill,
}

impl Policy {
    pub const DEFAULT: Self = Self {
        encode_nop_on_new_hardware: true,
        tail_fill: TailFill::Zero,
    };
}

impl Default for Policy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

include!(concat!(env!("OUT_DIR"), "/r2p_config.rs"));
