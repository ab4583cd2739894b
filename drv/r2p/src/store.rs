// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Staged payloads and the textual configuration that steers the next
//! reboot.

use core::fmt;

/// Capacity of the `action` field, including the NUL terminator.
pub const ACTION_LEN: usize = 16;
/// Capacity of the `entry_id` field, including the NUL terminator.
pub const ENTRY_ID_LEN: usize = r2p_handoff::ID_LEN;

/// Shown in place of an empty string field.
pub const EMPTY_PLACEHOLDER: &[u8] = b"(none)";

/// A NUL-terminated string field of fixed capacity `N`.
///
/// At most `N - 1` bytes are ever stored, so there is always a terminator.
/// A single trailing newline (as left by `echo foo > attr`) is dropped when
/// the field is set.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct CStrField<const N: usize> {
    buf: [u8; N],
}

impl<const N: usize> CStrField<N> {
    const NONEMPTY: () = assert!(N > 0);

    pub const fn empty() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NONEMPTY;
        Self { buf: [0; N] }
    }

    pub const fn from_bytes(text: &[u8]) -> Self {
        let mut field = Self::empty();
        let n = if text.len() < N - 1 { text.len() } else { N - 1 };

        // `copy_from_slice` isn't const.
        let mut i = 0;
        while i < n {
            field.buf[i] = text[i];
            i += 1;
        }
        if n > 0 && field.buf[n - 1] == b'\n' {
            field.buf[n - 1] = 0;
        }
        field
    }

    pub fn set(&mut self, text: &[u8]) {
        *self = Self::from_bytes(text);
    }

    /// The stored bytes, up to (not including) the first NUL.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.buf.iter().position(|&b| b == 0).unwrap_or(N);
        &self.buf[..len]
    }

    pub fn is_empty(&self) -> bool {
        self.buf[0] == 0
    }
}

impl<const N: usize> Default for CStrField<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> fmt::Debug for CStrField<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match core::str::from_utf8(self.as_bytes()) {
            Ok(s) => fmt::Debug::fmt(s, f),
            Err(_) => fmt::Debug::fmt(self.as_bytes(), f),
        }
    }
}

/// Which of the two payload buffers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PayloadSlot {
    /// The bootloader that understands the reboot configuration.
    Default,
    /// An arbitrary payload requested with the `payload` reboot command.
    Custom,
}

/// A payload image of at most `CAP` bytes.
pub struct PayloadBlob<const CAP: usize> {
    data: [u8; CAP],
    len: usize,
}

impl<const CAP: usize> PayloadBlob<CAP> {
    pub const fn empty() -> Self {
        Self {
            data: [0; CAP],
            len: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Replaces the whole image. On error the previous image is kept.
    pub fn replace(&mut self, image: &[u8]) -> Result<(), LoadError> {
        let dst = self
            .data
            .get_mut(..image.len())
            .ok_or(LoadError::TooLarge)?;
        dst.copy_from_slice(image);
        self.len = image.len();
        Ok(())
    }
}

/// Everything the next reboot depends on.
pub struct DriverState<const CAP: usize> {
    pub action: CStrField<ACTION_LEN>,
    pub entry_id: CStrField<ENTRY_ID_LEN>,
    pub param1: i32,
    pub param2: i32,
    default: PayloadBlob<CAP>,
    custom: PayloadBlob<CAP>,
}

impl<const CAP: usize> DriverState<CAP> {
    pub const fn new(params: &crate::BootParams<'_>) -> Self {
        Self {
            action: CStrField::from_bytes(params.action.as_bytes()),
            entry_id: CStrField::from_bytes(params.entry_id.as_bytes()),
            param1: params.param1,
            param2: params.param2,
            default: PayloadBlob::empty(),
            custom: PayloadBlob::empty(),
        }
    }

    pub fn payload(&self, slot: PayloadSlot) -> &PayloadBlob<CAP> {
        match slot {
            PayloadSlot::Default => &self.default,
            PayloadSlot::Custom => &self.custom,
        }
    }

    pub fn payload_mut(&mut self, slot: PayloadSlot) -> &mut PayloadBlob<CAP> {
        match slot {
            PayloadSlot::Default => &mut self.default,
            PayloadSlot::Custom => &mut self.custom,
        }
    }

    /// Applies a textual write to one configuration field.
    pub fn set(
        &mut self,
        field: ConfigField,
        text: &[u8],
    ) -> Result<(), InvalidNumber> {
        match field {
            ConfigField::Action => self.action.set(text),
            ConfigField::EntryId => self.entry_id.set(text),
            ConfigField::Param1 => self.param1 = parse_int(text)?,
            ConfigField::Param2 => self.param2 = parse_int(text)?,
        }
        Ok(())
    }

    /// Renders one configuration field into `out`, returning the length.
    ///
    /// Empty string fields render as [`EMPTY_PLACEHOLDER`]. Output that does
    /// not fit is truncated.
    pub fn get(&self, field: ConfigField, out: &mut [u8]) -> usize {
        let text = match field {
            ConfigField::Action => self.action.as_bytes(),
            ConfigField::EntryId => self.entry_id.as_bytes(),
            ConfigField::Param1 => return render_int(self.param1, out),
            ConfigField::Param2 => return render_int(self.param2, out),
        };
        let text = if text.is_empty() {
            EMPTY_PLACEHOLDER
        } else {
            text
        };
        let n = text.len().min(out.len());
        out[..n].copy_from_slice(&text[..n]);
        n
    }
}

fn render_int(value: i32, out: &mut [u8]) -> usize {
    let mut w = ByteWriter::new(out);
    // A short buffer just truncates the number.
    let _ = fmt::Write::write_fmt(&mut w, format_args!("{value}"));
    w.len()
}

/// The four textual configuration fields.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigField {
    Action,
    EntryId,
    Param1,
    Param2,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InvalidNumber;

/// Parses an integer the way attribute writes are usually parsed: optional
/// sign, decimal or `0x`-prefixed hex, optional trailing newline.
pub fn parse_int(text: &[u8]) -> Result<i32, InvalidNumber> {
    let text = text.strip_suffix(b"\n").unwrap_or(text);
    let (negative, digits) = match text.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        _ => (false, text),
    };
    let (radix, digits) = match digits
        .strip_prefix(b"0x")
        .or_else(|| digits.strip_prefix(b"0X"))
    {
        Some(hex) => (16, hex),
        None => (10, digits),
    };
    if digits.is_empty() {
        return Err(InvalidNumber);
    }

    let limit = i64::from(i32::MAX) + 1;
    let mut value: i64 = 0;
    for &b in digits {
        let d = char::from(b).to_digit(radix).ok_or(InvalidNumber)?;
        value = value * i64::from(radix) + i64::from(d);
        if value > limit {
            return Err(InvalidNumber);
        }
    }

    let value = if negative { -value } else { value };
    i32::try_from(value).map_err(|_| InvalidNumber)
}

/// `fmt::Write` over a byte slice that refuses to overflow it.
pub(crate) struct ByteWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> ByteWriter<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

impl fmt::Write for ByteWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len() - self.len;
        let n = s.len().min(room);
        self.buf[self.len..][..n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        if n < s.len() {
            Err(fmt::Error)
        } else {
            Ok(())
        }
    }
}

/// Why a named payload could not be fetched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FetchError {
    NotFound,
    Unavailable,
}

/// Why a payload slot was not replaced.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    NotFound,
    Unavailable,
    /// The image is larger than the slot (and than the IRAM window).
    TooLarge,
}

impl From<FetchError> for LoadError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::NotFound => LoadError::NotFound,
            FetchError::Unavailable => LoadError::Unavailable,
        }
    }
}

/// Somewhere named payload images come from.
pub trait AssetSource {
    fn fetch(&self, name: &str) -> Result<&[u8], FetchError>;
}

/// Images linked into the firmware, looked up by name.
#[derive(Copy, Clone)]
pub struct StaticAssets<'a> {
    assets: &'a [(&'a str, &'a [u8])],
}

impl<'a> StaticAssets<'a> {
    pub const fn new(assets: &'a [(&'a str, &'a [u8])]) -> Self {
        Self { assets }
    }
}

impl AssetSource for StaticAssets<'_> {
    fn fetch(&self, name: &str) -> Result<&[u8], FetchError> {
        self.assets
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, image)| *image)
            .ok_or(FetchError::NotFound)
    }
}
