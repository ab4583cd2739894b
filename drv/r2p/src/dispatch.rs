// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The reboot path.
//!
//! Both hardware generations go through the same steps: resolve, pick the
//! payload, stage it at the bottom of IRAM, then write the reason. Only the
//! last step differs. Legacy parts get a `BootConfig` record patched into
//! the staged image; compact parts get the packed reason in PMC scratch.

use crate::resolve::{resolve, ResolvedTarget, ResolverInput};
use crate::store::{DriverState, PayloadSlot};
use crate::{HardwareProfile, Policy, R2p};
use drv_tegra_smc::{set_reboot_config, ChunkedTransfer, SecureCall, SmcStatus};
use r2p_handoff::{RebootReason, BOOT_CONFIG_ADDR, IRAM_BASE, SCRATCH_SLOTS};
use ringbuf::{ringbuf, ringbuf_entry};

#[derive(Copy, Clone, PartialEq)]
enum Trace {
    None,
    Aborted,
    NormalReboot,
    MissingPayload(PayloadSlot),
    Staged {
        slot: PayloadSlot,
        len: u32,
        failed: u32,
    },
    BootConfigFailed,
    ScratchFailed {
        offset: u32,
        status: SmcStatus,
    },
    Encoded {
        reason: RebootReason,
        bits: u16,
    },
}

ringbuf!(Trace, 16, Trace::None);

impl<const CAP: usize> R2p<CAP> {
    /// Prepares the handoff for a reboot requested with `command`.
    ///
    /// Returns `true` if a payload has been staged and the reason written,
    /// in which case the caller must reset without touching IRAM or the
    /// scratch registers again. On `false` the caller should reboot the
    /// ordinary way; nothing was written, except that a compact part may
    /// have had its reason cleared (see
    /// [`Policy::encode_nop_on_new_hardware`]).
    ///
    /// The state lock is held throughout, so a concurrent `set` or `load`
    /// either lands before the decision or waits until after it.
    pub fn prepare_reboot(
        &self,
        smc: &mut impl SecureCall,
        command: Option<&str>,
    ) -> bool {
        let mut inner = self.inner.lock();
        let crate::Inner { state, xfer } = &mut *inner;

        let target = resolve(&ResolverInput {
            command,
            action: state.action.as_bytes(),
            entry_id: state.entry_id.as_bytes(),
            param1: state.param1,
            param2: state.param2,
            hardware: self.hardware,
            panic_occurred: self.has_panicked(),
        });

        if target.abort {
            ringbuf_entry!(Trace::Aborted);
            return false;
        }

        if target.reason == RebootReason::Nop
            && target.payload == PayloadSlot::Default
        {
            ringbuf_entry!(Trace::NormalReboot);
            if self.hardware == HardwareProfile::Compact {
                encode_compact(smc, &self.policy, &target);
            }
            return false;
        }

        if !stage(smc, state, xfer, &target) {
            return false;
        }

        match self.hardware {
            HardwareProfile::Legacy => encode_legacy(smc, xfer, &target),
            HardwareProfile::Compact => {
                encode_compact(smc, &self.policy, &target)
            }
        }
        true
    }
}

/// Stages the payload `target` needs at the bottom of IRAM.
///
/// Returns `false`, having done nothing, if that payload was never loaded.
fn stage<const CAP: usize>(
    smc: &mut impl SecureCall,
    state: &DriverState<CAP>,
    xfer: &mut ChunkedTransfer,
    target: &ResolvedTarget,
) -> bool {
    // A custom payload is only used if one was loaded.
    let custom = state.payload(PayloadSlot::Custom);
    let slot = match target.payload {
        PayloadSlot::Custom if !custom.is_empty() => PayloadSlot::Custom,
        _ => PayloadSlot::Default,
    };
    let blob = state.payload(slot);
    if blob.is_empty() {
        ringbuf_entry!(Trace::MissingPayload(slot));
        return false;
    }

    let report = xfer.stage(smc, blob.as_bytes(), IRAM_BASE);
    ringbuf_entry!(Trace::Staged {
        slot,
        len: blob.len() as u32,
        failed: report.failed as u32,
    });
    true
}

fn encode_legacy(
    smc: &mut impl SecureCall,
    xfer: &mut ChunkedTransfer,
    target: &ResolvedTarget,
) {
    let cfg = target.boot_config().serialize();
    if !xfer.copy(smc, &cfg, BOOT_CONFIG_ADDR).is_clean() {
        ringbuf_entry!(Trace::BootConfigFailed);
    }
    ringbuf_entry!(Trace::Encoded {
        reason: target.reason,
        bits: target.reason as u16,
    });
}

fn encode_compact(
    smc: &mut impl SecureCall,
    policy: &Policy,
    target: &ResolvedTarget,
) {
    if target.reason == RebootReason::Nop
        && !policy.encode_nop_on_new_hardware
    {
        return;
    }

    let reason = target.compact();
    for (slot, value) in SCRATCH_SLOTS.iter().zip(reason.slot_values()) {
        let r = set_reboot_config(smc, slot.offset, value, slot.mask);
        if !r.is_success() {
            ringbuf_entry!(Trace::ScratchFailed {
                offset: slot.offset,
                status: r.decode(),
            });
        }
    }
    ringbuf_entry!(Trace::Encoded {
        reason: target.reason,
        bits: reason.bits(),
    });
}
