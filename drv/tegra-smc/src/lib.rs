// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Secure monitor calls used to hand data across a warm reset.
//!
//! IRAM and the PMC scratch registers are only writable from the secure
//! world, so everything the reboot path leaves behind goes through one of
//! two SiP calls:
//!
//! - [`COPY_TO_IRAM`]: copy `size` bytes from a physical source address into
//!   IRAM.
//! - [`SET_REBOOT_CONFIG`]: read-modify-write a masked field of a PMC scratch
//!   register.
//!
//! Callers talk to the monitor through the [`SecureCall`] trait, so the
//! staging and encoding logic can be exercised on the host against a mock.

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "mock")]
extern crate std;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

mod transfer;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use transfer::{ChunkedTransfer, StageReport, TailFill, CHUNK_SIZE};

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use aarch64::Smc;
    }
}

/// SiP call: copy a buffer into IRAM.
///
/// Arguments: source physical address, destination IRAM address, size in
/// bytes, and a flags word which must be zero.
pub const COPY_TO_IRAM: u32 = 0xC2FF_FE01;

/// SiP call: edit a PMC scratch register.
///
/// Arguments: register offset within the PMC aperture, value, mask. Only
/// bits set in the mask are changed.
pub const SET_REBOOT_CONFIG: u32 = 0xC2FF_FE02;

/// What came back from the monitor.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SmcResult {
    pub status: u64,
    pub out: [u64; 2],
}

impl SmcResult {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    pub fn decode(&self) -> SmcStatus {
        SmcStatus::from_raw(self.status)
    }
}

/// Status codes defined by the SMC calling convention.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(i64)]
pub enum SmcStatus {
    Success = 0,
    NotSupported = -1,
    NotRequired = -2,
    InvalidParameter = -3,
    /// Anything the calling convention does not define
    Unknown = i64::MIN,
}

impl SmcStatus {
    pub fn from_raw(raw: u64) -> Self {
        SmcStatus::from_i64(raw as i64).unwrap_or(SmcStatus::Unknown)
    }
}

/// A synchronous trap into the secure monitor.
///
/// Implementations block until the monitor returns; there is no timeout and
/// no retry. A nonzero status is returned as-is for the caller to trace.
pub trait SecureCall {
    /// Issues call `id` with six argument words.
    fn invoke(&mut self, id: u32, args: [u64; 6]) -> SmcResult;

    /// Makes `buf` visible to the monitor and returns its physical address.
    ///
    /// The monitor reads the source of a copy by physical address with the
    /// caches out of the picture, so this must be called after the buffer is
    /// filled and before the call that consumes it.
    fn prepare_dma(&mut self, buf: &[u8]) -> u64;
}

impl<T: SecureCall + ?Sized> SecureCall for &mut T {
    fn invoke(&mut self, id: u32, args: [u64; 6]) -> SmcResult {
        (**self).invoke(id, args)
    }

    fn prepare_dma(&mut self, buf: &[u8]) -> u64 {
        (**self).prepare_dma(buf)
    }
}

/// Issues a [`COPY_TO_IRAM`] call for an already-prepared source buffer.
pub fn copy_to_iram(
    smc: &mut impl SecureCall,
    src_phys: u64,
    dst: u64,
    size: u64,
) -> SmcResult {
    smc.invoke(COPY_TO_IRAM, [src_phys, dst, size, 0, 0, 0])
}

/// Issues a [`SET_REBOOT_CONFIG`] call writing `value` under `mask`.
pub fn set_reboot_config(
    smc: &mut impl SecureCall,
    offset: u32,
    value: u32,
    mask: u32,
) -> SmcResult {
    smc.invoke(
        SET_REBOOT_CONFIG,
        [
            u64::from(offset),
            u64::from(value & mask),
            u64::from(mask),
            0,
            0,
            0,
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_decoding() {
        assert_eq!(SmcStatus::from_raw(0), SmcStatus::Success);
        assert_eq!(SmcStatus::from_raw(u64::MAX), SmcStatus::NotSupported);
        assert_eq!(
            SmcStatus::from_raw(-3i64 as u64),
            SmcStatus::InvalidParameter
        );
        assert_eq!(SmcStatus::from_raw(17), SmcStatus::Unknown);
    }

    #[test]
    fn reboot_config_masks_value() {
        let mut smc = mock::RecordingSmc::new();
        let r = set_reboot_config(&mut smc, 0x840, 0x1ff, 0x3f);
        assert!(r.is_success());
        assert_eq!(smc.calls[0].id, SET_REBOOT_CONFIG);
        assert_eq!(smc.calls[0].args, [0x840, 0x3f, 0x3f, 0, 0, 0]);
        assert_eq!(smc.scratch(0x840), 0x3f);
    }

    #[test]
    fn failed_call_decodes_for_tracing() {
        let mut smc = mock::RecordingSmc::new();
        smc.fail_call(0);
        let r = set_reboot_config(&mut smc, 0x840, 1, 0x3f);
        assert!(!r.is_success());
        assert_eq!(r.decode(), SmcStatus::InvalidParameter);
        assert_eq!(smc.scratch(0x840), 0);

        // Anything but the two SiP calls is refused.
        let r = smc.invoke(0xC2FF_FEFF, [0; 6]);
        assert_eq!(r.decode(), SmcStatus::NotSupported);
    }
}
