// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Records handed across a warm reset to the secondary bootloader.
//!
//! There are two encodings, one per hardware generation:
//!
//! - On T210 the bootloader payload itself is staged into IRAM and a
//!   [`BootConfig`] is written over the reserved window at
//!   [`BOOT_CONFIG_ADDR`] inside it.
//! - On T210B01 nothing is staged. A [`CompactReason`] is split into two
//!   6-bit values and written into PMC scratch registers, together with a
//!   magic byte that tells the bootloader the values are meaningful.
//!
//! Both layouts are consumed by a bootloader we do not build, so every byte
//! here is load-bearing.

#![cfg_attr(not(test), no_std)]

use bitflags::bitflags;
use core::ops::Range;
use num_derive::FromPrimitive;
use static_assertions::{const_assert, const_assert_eq};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

mod compact;

pub use compact::{
    CompactReason, ScratchSlot, REBOOT_REASON_MAGIC, SCRATCH_SLOTS,
};

/// Physical base of the IRAM window the payload is staged into.
pub const IRAM_BASE: u64 = 0x4001_0000;

/// Largest payload that fits the IRAM window.
pub const PAYLOAD_MAX_SIZE: usize = 0x3_0000;

/// Offset of the boot configuration window within a staged payload.
pub const BOOT_CONFIG_OFFSET: u64 = 0x94;
pub const BOOT_CONFIG_ADDR: u64 = IRAM_BASE + BOOT_CONFIG_OFFSET;
pub const BOOT_CONFIG_SIZE: usize = 132;

pub const IRAM_RANGE: Range<u64> =
    IRAM_BASE..IRAM_BASE + PAYLOAD_MAX_SIZE as u64;

const_assert!(
    BOOT_CONFIG_ADDR + BOOT_CONFIG_SIZE as u64 <= IRAM_RANGE.end
);

/// Length of the entry id field, including its NUL terminator.
pub const ID_LEN: usize = 8;
/// Length of the emuMMC path that follows the id.
pub const PATH_LEN: usize = 120;
/// Length of the variant region at the end of a [`BootConfig`].
pub const EXTRA_LEN: usize = ID_LEN + PATH_LEN;

/// Reboot reason codes understood by the bootloader.
///
/// These are the values carried in the low nibble of a [`CompactReason`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum RebootReason {
    /// Nothing to do; boot normally.
    Nop = 0,
    /// Boot the bootloader and let it autoboot an entry.
    SelfBoot = 1,
    /// Stop in the bootloader menu.
    Menu = 2,
    /// Export storage over USB mass storage.
    Ums = 3,
    /// Boot the recovery entry.
    Recovery = 4,
    /// The previous boot panicked.
    Panic = 5,
}

bitflags! {
    /// `boot_cfg` byte of a [`BootConfig`].
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct BootCfg: u8 {
        const AUTOBOOT_EN = 1 << 0;
        const FROM_ID = 1 << 2;
        const TO_EMUMMC = 1 << 3;
        const SEPT_RUN = 1 << 7;
    }
}

bitflags! {
    /// `extra_cfg` byte of a [`BootConfig`].
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct ExtraCfg: u8 {
        const KEYS = 1 << 0;
        const PAYLOAD = 1 << 1;
        const MODULE = 1 << 2;
        const UMS = 1 << 5;
        const RELOAD = 1 << 6;
        const DUMP = 1 << 7;
    }
}

/// The trailing 128 bytes of a [`BootConfig`].
///
/// The bootloader reads the same bytes three different ways depending on the
/// flags in front of them; only one reading is ever meaningful at a time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BootConfigExtra {
    /// Selected by [`BootCfg::FROM_ID`]: a NUL-padded entry id followed by a
    /// NUL-padded emuMMC path.
    Id { id: [u8; ID_LEN], path: [u8; PATH_LEN] },
    /// Selected by [`ExtraCfg::UMS`]: index of the storage to export.
    Ums(u8),
    /// Anything else, passed through untouched.
    Raw([u8; EXTRA_LEN]),
}

impl BootConfigExtra {
    pub const fn empty() -> Self {
        BootConfigExtra::Raw([0; EXTRA_LEN])
    }

    /// Builds the id variant from an entry id of at most `ID_LEN - 1` bytes.
    ///
    /// Longer ids are truncated so the field stays NUL-terminated.
    pub fn from_id(entry_id: &[u8]) -> Self {
        let mut id = [0; ID_LEN];
        let n = entry_id.len().min(ID_LEN - 1);
        id[..n].copy_from_slice(&entry_id[..n]);
        BootConfigExtra::Id {
            id,
            path: [0; PATH_LEN],
        }
    }
}

/// The legacy boot configuration record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BootConfig {
    pub boot_cfg: BootCfg,
    pub autoboot: u8,
    pub autoboot_list: u8,
    pub extra_cfg: ExtraCfg,
    pub extra: BootConfigExtra,
}

/// Exact in-memory layout of a [`BootConfig`].
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct RawBootConfig {
    boot_cfg: u8,
    autoboot: u8,
    autoboot_list: u8,
    extra_cfg: u8,
    xt: [u8; EXTRA_LEN],
}

const_assert_eq!(core::mem::size_of::<RawBootConfig>(), BOOT_CONFIG_SIZE);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    WrongSize,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::empty()
    }
}

impl BootConfig {
    pub const fn empty() -> Self {
        Self {
            boot_cfg: BootCfg::empty(),
            autoboot: 0,
            autoboot_list: 0,
            extra_cfg: ExtraCfg::empty(),
            extra: BootConfigExtra::empty(),
        }
    }

    pub fn serialize(&self) -> [u8; BOOT_CONFIG_SIZE] {
        let mut xt = [0; EXTRA_LEN];
        match &self.extra {
            BootConfigExtra::Id { id, path } => {
                xt[..ID_LEN].copy_from_slice(id);
                xt[ID_LEN..].copy_from_slice(path);
            }
            BootConfigExtra::Ums(ndx) => xt[0] = *ndx,
            BootConfigExtra::Raw(bytes) => xt = *bytes,
        }

        let raw = RawBootConfig {
            boot_cfg: self.boot_cfg.bits(),
            autoboot: self.autoboot,
            autoboot_list: self.autoboot_list,
            extra_cfg: self.extra_cfg.bits(),
            xt,
        };

        let mut out = [0; BOOT_CONFIG_SIZE];
        out.copy_from_slice(raw.as_bytes());
        out
    }

    /// Decodes a record as the bootloader would.
    ///
    /// The variant region is interpreted from the flags: `FROM_ID` wins over
    /// extra `UMS`, and anything else comes back as raw bytes. Unknown flag
    /// bits are preserved.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let raw = RawBootConfig::read_from_bytes(bytes)
            .map_err(|_| ParseError::WrongSize)?;

        let boot_cfg = BootCfg::from_bits_retain(raw.boot_cfg);
        let extra_cfg = ExtraCfg::from_bits_retain(raw.extra_cfg);

        let extra = if boot_cfg.contains(BootCfg::FROM_ID) {
            let mut id = [0; ID_LEN];
            let mut path = [0; PATH_LEN];
            id.copy_from_slice(&raw.xt[..ID_LEN]);
            path.copy_from_slice(&raw.xt[ID_LEN..]);
            BootConfigExtra::Id { id, path }
        } else if extra_cfg.contains(ExtraCfg::UMS) {
            BootConfigExtra::Ums(raw.xt[0])
        } else {
            BootConfigExtra::Raw(raw.xt)
        };

        Ok(Self {
            boot_cfg,
            autoboot: raw.autoboot,
            autoboot_list: raw.autoboot_list,
            extra_cfg,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_offsets() {
        let cfg = BootConfig {
            boot_cfg: BootCfg::AUTOBOOT_EN | BootCfg::FROM_ID,
            autoboot: 3,
            autoboot_list: 1,
            extra_cfg: ExtraCfg::PAYLOAD,
            extra: BootConfigExtra::from_id(b"L4T"),
        };
        let bytes = cfg.serialize();

        assert_eq!(bytes.len(), BOOT_CONFIG_SIZE);
        assert_eq!(bytes[..4], [0x05, 3, 1, 0x02]);
        assert_eq!(&bytes[4..12], b"L4T\0\0\0\0\0");
        assert!(bytes[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn ums_index_is_first_variant_byte() {
        let cfg = BootConfig {
            boot_cfg: BootCfg::AUTOBOOT_EN,
            extra_cfg: ExtraCfg::UMS,
            extra: BootConfigExtra::Ums(2),
            ..BootConfig::empty()
        };
        let bytes = cfg.serialize();

        assert_eq!(bytes[0], 0x01);
        assert_eq!(bytes[3], 0x20);
        assert_eq!(bytes[4], 2);
        assert!(bytes[5..].iter().all(|&b| b == 0));
        assert_eq!(BootConfig::parse(&bytes), Ok(cfg));
    }

    #[test]
    fn id_is_truncated_and_terminated() {
        let extra = BootConfigExtra::from_id(b"much-too-long");
        let BootConfigExtra::Id { id, .. } = extra else {
            panic!("expected id variant");
        };
        assert_eq!(&id, b"much-to\0");
    }

    #[test]
    fn parse_picks_variant_from_flags() {
        let mut bytes = [0u8; BOOT_CONFIG_SIZE];
        bytes[0] = BootCfg::FROM_ID.bits();
        bytes[3] = ExtraCfg::UMS.bits();
        bytes[4..9].copy_from_slice(b"LAKKA");

        let cfg = BootConfig::parse(&bytes).unwrap();
        let BootConfigExtra::Id { id, path } = cfg.extra else {
            panic!("FROM_ID should select the id variant: {cfg:?}");
        };
        assert_eq!(&id, b"LAKKA\0\0\0");
        assert_eq!(path, [0; PATH_LEN]);
        assert_eq!(cfg.serialize(), bytes);
    }

    #[test]
    fn parse_keeps_unknown_bits() {
        let mut bytes = [0u8; BOOT_CONFIG_SIZE];
        bytes[0] = 0x42;
        bytes[3] = 0x18;
        bytes[100] = 0xaa;
        let cfg = BootConfig::parse(&bytes).unwrap();
        assert_eq!(cfg.boot_cfg.bits(), 0x42);
        assert_eq!(cfg.extra_cfg.bits(), 0x18);
        assert_eq!(cfg.serialize(), bytes);
    }

    #[test]
    fn parse_rejects_short_input() {
        assert_eq!(
            BootConfig::parse(&[0; BOOT_CONFIG_SIZE - 1]),
            Err(ParseError::WrongSize)
        );
    }
}
