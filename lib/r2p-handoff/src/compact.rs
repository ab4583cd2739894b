// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::RebootReason;
use num_traits::FromPrimitive;

/// Written into the last two scratch slots so the bootloader can tell a
/// reboot reason from whatever was left in the registers.
pub const REBOOT_REASON_MAGIC: u8 = 0x77;

/// A field within a PMC scratch register that survives warm reset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScratchSlot {
    /// Register offset from the start of the PMC aperture.
    pub offset: u32,
    pub mask: u32,
}

/// The four scratch slots, in the order they are written: `val1`, `val2`,
/// then the magic byte twice.
pub const SCRATCH_SLOTS: [ScratchSlot; 4] = [
    ScratchSlot {
        offset: 0x840,
        mask: 0x3f,
    },
    ScratchSlot {
        offset: 0x844,
        mask: 0x3f,
    },
    ScratchSlot {
        offset: 0x848,
        mask: 0xff,
    },
    ScratchSlot {
        offset: 0x84c,
        mask: 0xff,
    },
];

/// Reboot reason packed into 12 bits.
///
/// ```text
///  15   12 11     9   8   7          4 3       0
/// +-------+--------+----+-------------+---------+
/// | rsvd  | ums_idx|list| autoboot_idx| reason  |
/// +-------+--------+----+-------------+---------+
///         |<------ val2 ------>|<---- val1 ---->|
///               bits 6..12          bits 0..6
/// ```
///
/// The bootloader reassembles the same 16 bits from `val1` and `val2`, so the
/// split is purely a property of the registers, not of the fields.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CompactReason(u16);

const REASON_SHIFT: u16 = 0;
const REASON_MASK: u16 = 0xf;
const AUTOBOOT_IDX_SHIFT: u16 = 4;
const AUTOBOOT_IDX_MASK: u16 = 0xf;
const AUTOBOOT_LIST_SHIFT: u16 = 8;
const UMS_IDX_SHIFT: u16 = 9;
const UMS_IDX_MASK: u16 = 0x7;

const VAL_BITS: u16 = 6;
const VAL_MASK: u16 = (1 << VAL_BITS) - 1;

impl CompactReason {
    /// Packs the fields, silently dropping bits that do not fit.
    pub fn new(
        reason: RebootReason,
        autoboot_idx: u8,
        autoboot_list: bool,
        ums_idx: u8,
    ) -> Self {
        let mut bits = (reason as u16 & REASON_MASK) << REASON_SHIFT;
        bits |= (u16::from(autoboot_idx) & AUTOBOOT_IDX_MASK)
            << AUTOBOOT_IDX_SHIFT;
        bits |= u16::from(autoboot_list) << AUTOBOOT_LIST_SHIFT;
        bits |= (u16::from(ums_idx) & UMS_IDX_MASK) << UMS_IDX_SHIFT;
        Self(bits)
    }

    /// Reassembles a reason from the two 6-bit register values.
    pub fn from_vals(val1: u8, val2: u8) -> Self {
        Self(
            (u16::from(val1) & VAL_MASK)
                | ((u16::from(val2) & VAL_MASK) << VAL_BITS),
        )
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Returns the reason code, or `None` if the bits hold a code this
    /// driver never writes.
    pub fn reason(&self) -> Option<RebootReason> {
        RebootReason::from_u16((self.0 >> REASON_SHIFT) & REASON_MASK)
    }

    pub fn autoboot_idx(&self) -> u8 {
        ((self.0 >> AUTOBOOT_IDX_SHIFT) & AUTOBOOT_IDX_MASK) as u8
    }

    pub fn autoboot_list(&self) -> bool {
        (self.0 >> AUTOBOOT_LIST_SHIFT) & 1 != 0
    }

    pub fn ums_idx(&self) -> u8 {
        ((self.0 >> UMS_IDX_SHIFT) & UMS_IDX_MASK) as u8
    }

    pub fn val1(&self) -> u8 {
        (self.0 & VAL_MASK) as u8
    }

    pub fn val2(&self) -> u8 {
        ((self.0 >> VAL_BITS) & VAL_MASK) as u8
    }

    /// The value to write into each of [`SCRATCH_SLOTS`], in order.
    pub fn slot_values(&self) -> [u32; 4] {
        [
            u32::from(self.val1()),
            u32::from(self.val2()),
            u32::from(REBOOT_REASON_MAGIC),
            u32::from(REBOOT_REASON_MAGIC),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_positions() {
        let r = CompactReason::new(RebootReason::Ums, 0, false, 5);
        assert_eq!(r.bits(), 0x3 | (5 << 9));

        let r = CompactReason::new(RebootReason::SelfBoot, 9, true, 0);
        assert_eq!(r.bits(), 0x1 | (9 << 4) | (1 << 8));
        assert_eq!(r.val1(), 0x11 & 0x3f);
        assert_eq!(r.val2(), 0b0110);
    }

    #[test]
    fn out_of_range_fields_are_masked() {
        let r = CompactReason::new(RebootReason::Recovery, 0x1f, false, 0xff);
        assert_eq!(r.autoboot_idx(), 0xf);
        assert_eq!(r.ums_idx(), 0x7);
        assert_eq!(r.reason(), Some(RebootReason::Recovery));
        assert_eq!(r.bits() & 0xf000, 0);
    }

    #[test]
    fn vals_reassemble() {
        let r = CompactReason::new(RebootReason::Menu, 7, true, 3);
        let back = CompactReason::from_vals(r.val1(), r.val2());
        assert_eq!(back, r);
        assert_eq!(back.autoboot_idx(), 7);
        assert!(back.autoboot_list());
        assert_eq!(back.ums_idx(), 3);
    }

    #[test]
    fn nop_clears_both_values() {
        let r = CompactReason::new(RebootReason::Nop, 0, false, 0);
        assert_eq!(r.slot_values(), [0, 0, 0x77, 0x77]);
    }

    #[test]
    fn unknown_reason_code() {
        assert_eq!(CompactReason::from_vals(0xf, 0).reason(), None);
    }

    #[test]
    fn slot_values_fit_their_masks() {
        let r = CompactReason::new(RebootReason::Panic, 0xf, true, 0x7);
        for (slot, value) in SCRATCH_SLOTS.iter().zip(r.slot_values()) {
            assert_eq!(value & !slot.mask, 0, "slot {:#x}", slot.offset);
        }
    }
}
