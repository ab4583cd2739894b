// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reboot-to-payload.
//!
//! On the way down for a warm reboot, this driver decides where the next boot
//! should go, stages a bootloader image at the bottom of IRAM, and leaves the
//! decision somewhere that image will find it after reset:
//!
//! - On [`HardwareProfile::Legacy`] parts, a
//!   [`BootConfig`](r2p_handoff::BootConfig) record is patched into the staged
//!   image.
//! - On [`HardwareProfile::Compact`] parts, a packed reason is written into
//!   PMC scratch registers.
//!
//! All of the state involved lives in one [`R2p`] context. Configuration can
//! be changed at any time through [`R2p::set`], [`R2p::load`] or the attribute
//! surface in [`attr`]; the reboot path calls [`R2p::prepare_reboot`] once,
//! and if that returns `true` the caller must go straight to reset.

#![cfg_attr(not(test), no_std)]

use core::sync::atomic::{AtomicBool, Ordering};
use r2p_handoff::PAYLOAD_MAX_SIZE;
use ringbuf::{ringbuf, ringbuf_entry};
use spin::Mutex;

pub mod attr;
pub mod config;
mod dispatch;
pub mod resolve;
pub mod store;

pub use attr::{AttrError, Attribute};
pub use config::{BootParams, Policy, BOOT_PARAMS, POLICY};
pub use drv_tegra_smc::TailFill;
pub use resolve::{resolve, ResolvedTarget, ResolverInput};
pub use store::{
    AssetSource, ConfigField, FetchError, InvalidNumber, LoadError,
    PayloadSlot, StaticAssets,
};

use drv_tegra_smc::{ChunkedTransfer, CHUNK_SIZE};
use store::DriverState;

/// Which handoff encoding the part understands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HardwareProfile {
    /// T210: payload plus `BootConfig` in IRAM.
    Legacy,
    /// T210B01: payload in IRAM, packed reason in PMC scratch registers.
    Compact,
}

#[derive(Copy, Clone, PartialEq)]
enum Trace {
    None,
    Loaded { slot: PayloadSlot, len: u32 },
    LoadFailed { slot: PayloadSlot, err: LoadError },
    Panicked,
}

ringbuf!(Trace, 8, Trace::None);

struct Inner<const CAP: usize> {
    state: DriverState<CAP>,
    xfer: ChunkedTransfer,
}

/// The reboot-to-payload context.
///
/// `CAP` is the capacity of each payload slot. It must be a whole number of
/// transfer chunks no larger than the IRAM window, so that staging never
/// writes past the end of IRAM.
pub struct R2p<const CAP: usize = PAYLOAD_MAX_SIZE> {
    hardware: HardwareProfile,
    policy: Policy,
    panicked: AtomicBool,
    inner: Mutex<Inner<CAP>>,
}

impl<const CAP: usize> R2p<CAP> {
    const CAP_FITS: () = assert!(
        CAP <= PAYLOAD_MAX_SIZE && CAP % CHUNK_SIZE == 0,
        "payload capacity must be whole chunks within the IRAM window"
    );

    /// Builds a context pre-populated with `params`.
    ///
    /// This is `const` so that the whole thing, payload buffers included,
    /// can live in a `static`.
    pub const fn new(
        hardware: HardwareProfile,
        policy: Policy,
        params: &BootParams<'_>,
    ) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAP_FITS;
        Self {
            hardware,
            policy,
            panicked: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                state: DriverState::new(params),
                xfer: ChunkedTransfer::new(policy.tail_fill),
            }),
        }
    }

    pub fn hardware(&self) -> HardwareProfile {
        self.hardware
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Records that this boot has panicked.
    ///
    /// Meant to be called from the host's panic hook, so it takes no locks.
    pub fn note_panic(&self) {
        if !self.panicked.swap(true, Ordering::Relaxed) {
            ringbuf_entry!(Trace::Panicked);
        }
    }

    pub fn has_panicked(&self) -> bool {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Writes one configuration field from text.
    ///
    /// Invalid numbers leave the field unchanged.
    pub fn set(
        &self,
        field: ConfigField,
        text: &[u8],
    ) -> Result<(), InvalidNumber> {
        self.inner.lock().state.set(field, text)
    }

    /// Renders one configuration field into `out` and returns its length.
    pub fn get(&self, field: ConfigField, out: &mut [u8]) -> usize {
        self.inner.lock().state.get(field, out)
    }

    /// Replaces the payload in `slot` with the asset called `name`.
    ///
    /// The asset is fetched before the state lock is taken. On any error the
    /// slot keeps its previous payload.
    pub fn load(
        &self,
        slot: PayloadSlot,
        name: &str,
        source: &impl AssetSource,
    ) -> Result<usize, LoadError> {
        let r = self.try_load(slot, name, source);
        match r {
            Ok(len) => ringbuf_entry!(Trace::Loaded {
                slot,
                len: len as u32,
            }),
            Err(err) => ringbuf_entry!(Trace::LoadFailed { slot, err }),
        }
        r
    }

    fn try_load(
        &self,
        slot: PayloadSlot,
        name: &str,
        source: &impl AssetSource,
    ) -> Result<usize, LoadError> {
        let image = source.fetch(name)?;
        if image.len() > CAP {
            return Err(LoadError::TooLarge);
        }
        self.inner.lock().state.payload_mut(slot).replace(image)?;
        Ok(image.len())
    }

    /// Length of the payload currently in `slot`, zero if none.
    pub fn payload_len(&self, slot: PayloadSlot) -> usize {
        self.inner.lock().state.payload(slot).len()
    }
}
