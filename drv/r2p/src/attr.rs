// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Textual attribute surface.
//!
//! Each attribute is a named endpoint taking and producing text, the way a
//! host exposes driver knobs to userspace. Reads end in a newline; writes may
//! or may not. The two payload attributes are write-only and take the name of
//! an asset to load.

use crate::store::{AssetSource, ConfigField, InvalidNumber, LoadError};
use crate::{PayloadSlot, R2p};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Attribute {
    Action,
    EntryId,
    Param1,
    Param2,
    DefaultPayload,
    CustomPayload,
}

impl Attribute {
    pub const ALL: [Attribute; 6] = [
        Attribute::Action,
        Attribute::EntryId,
        Attribute::Param1,
        Attribute::Param2,
        Attribute::DefaultPayload,
        Attribute::CustomPayload,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Attribute::Action => "action",
            Attribute::EntryId => "entry_id",
            Attribute::Param1 => "param1",
            Attribute::Param2 => "param2",
            Attribute::DefaultPayload => "default_payload",
            Attribute::CustomPayload => "custom_payload",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    pub fn is_readable(self) -> bool {
        self.field().is_some()
    }

    fn field(self) -> Option<ConfigField> {
        match self {
            Attribute::Action => Some(ConfigField::Action),
            Attribute::EntryId => Some(ConfigField::EntryId),
            Attribute::Param1 => Some(ConfigField::Param1),
            Attribute::Param2 => Some(ConfigField::Param2),
            Attribute::DefaultPayload | Attribute::CustomPayload => None,
        }
    }

    fn slot(self) -> Option<PayloadSlot> {
        match self {
            Attribute::DefaultPayload => Some(PayloadSlot::Default),
            Attribute::CustomPayload => Some(PayloadSlot::Custom),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttrError {
    WriteOnly,
    /// The text doesn't parse for this attribute.
    Invalid,
    Load(LoadError),
}

impl From<InvalidNumber> for AttrError {
    fn from(_: InvalidNumber) -> Self {
        AttrError::Invalid
    }
}

impl From<LoadError> for AttrError {
    fn from(e: LoadError) -> Self {
        AttrError::Load(e)
    }
}

impl<const CAP: usize> R2p<CAP> {
    /// Reads `attr` into `out`, newline-terminated, and returns the length.
    pub fn show(
        &self,
        attr: Attribute,
        out: &mut [u8],
    ) -> Result<usize, AttrError> {
        let field = attr.field().ok_or(AttrError::WriteOnly)?;
        let Some(room) = out.len().checked_sub(1) else {
            return Ok(0);
        };
        let n = self.get(field, &mut out[..room]);
        out[n] = b'\n';
        Ok(n + 1)
    }

    /// Writes `text` to `attr`, returning the number of bytes consumed.
    ///
    /// Payload attributes look the (newline-trimmed) text up in `assets`.
    pub fn store(
        &self,
        attr: Attribute,
        text: &[u8],
        assets: &impl AssetSource,
    ) -> Result<usize, AttrError> {
        if let Some(field) = attr.field() {
            self.set(field, text)?;
        } else if let Some(slot) = attr.slot() {
            let name = text.strip_suffix(b"\n").unwrap_or(text);
            let name =
                core::str::from_utf8(name).map_err(|_| AttrError::Invalid)?;
            if name.is_empty() {
                return Err(AttrError::Invalid);
            }
            self.load(slot, name, assets)?;
        }
        Ok(text.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StaticAssets, EMPTY_PLACEHOLDER};
    use crate::tests::context;
    use crate::HardwareProfile;

    static PAYLOAD: [u8; 64] = [0x11; 64];
    static TABLE: [(&str, &[u8]); 1] = [("hekate.bin", &PAYLOAD)];
    const ASSETS: StaticAssets<'static> = StaticAssets::new(&TABLE);

    fn show(r2p: &R2p<{ crate::tests::TEST_CAP }>, attr: Attribute) -> Vec<u8> {
        let mut out = [0u8; 64];
        let n = r2p.show(attr, &mut out).unwrap();
        out[..n].to_vec()
    }

    #[test]
    fn names_round_trip() {
        for attr in Attribute::ALL {
            assert_eq!(Attribute::from_name(attr.name()), Some(attr));
        }
        assert_eq!(Attribute::from_name("reboot_action"), None);
    }

    #[test]
    fn echo_then_cat() {
        let r2p = context(HardwareProfile::Legacy);

        let mut placeholder = EMPTY_PLACEHOLDER.to_vec();
        placeholder.push(b'\n');
        assert_eq!(show(&r2p, Attribute::EntryId), placeholder);

        let written = r2p.store(Attribute::Action, b"via-payload\n", &ASSETS);
        assert_eq!(written, Ok(12));
        assert_eq!(show(&r2p, Attribute::Action), b"via-payload\n");

        r2p.store(Attribute::Param1, b"0x10\n", &ASSETS).unwrap();
        assert_eq!(show(&r2p, Attribute::Param1), b"16\n");
    }

    #[test]
    fn bad_number_is_rejected() {
        let r2p = context(HardwareProfile::Legacy);
        r2p.store(Attribute::Param2, b"5", &ASSETS).unwrap();
        assert_eq!(
            r2p.store(Attribute::Param2, b"five\n", &ASSETS),
            Err(AttrError::Invalid)
        );
        assert_eq!(show(&r2p, Attribute::Param2), b"5\n");
    }

    #[test]
    fn payload_attributes_are_write_only() {
        let r2p = context(HardwareProfile::Legacy);
        let mut out = [0u8; 16];
        assert_eq!(
            r2p.show(Attribute::DefaultPayload, &mut out),
            Err(AttrError::WriteOnly)
        );
        assert!(!Attribute::CustomPayload.is_readable());
    }

    #[test]
    fn payload_write_loads_asset() {
        let r2p = context(HardwareProfile::Legacy);
        r2p.store(Attribute::CustomPayload, b"hekate.bin\n", &ASSETS)
            .unwrap();
        assert_eq!(r2p.payload_len(PayloadSlot::Custom), PAYLOAD.len());

        assert_eq!(
            r2p.store(Attribute::DefaultPayload, b"missing.bin", &ASSETS),
            Err(AttrError::Load(LoadError::NotFound))
        );
        assert_eq!(
            r2p.store(Attribute::DefaultPayload, b"\n", &ASSETS),
            Err(AttrError::Invalid)
        );
        assert_eq!(r2p.payload_len(PayloadSlot::Default), 0);
    }

    #[test]
    fn show_into_tiny_buffer() {
        let r2p = context(HardwareProfile::Legacy);
        r2p.store(Attribute::Action, b"bootloader", &ASSETS).unwrap();

        let mut out = [0u8; 5];
        assert_eq!(r2p.show(Attribute::Action, &mut out), Ok(5));
        assert_eq!(&out, b"boot\n");

        assert_eq!(r2p.show(Attribute::Action, &mut []), Ok(0));
    }
}
