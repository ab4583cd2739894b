// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `smc #0` from EL1/EL2.

use crate::{SecureCall, SmcResult};
use core::arch::asm;

/// Smallest data cache line on the parts we run on.
const CACHE_LINE: usize = 64;

/// The real secure monitor.
pub struct Smc {
    _private: (),
}

impl Smc {
    /// # Safety
    ///
    /// The caller must be running at an exception level that can issue `smc`,
    /// under a monitor that implements the SiP calls in this crate, with
    /// buffers identity-mapped so that a virtual address is also the physical
    /// address the monitor will read.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl SecureCall for Smc {
    fn invoke(&mut self, id: u32, args: [u64; 6]) -> SmcResult {
        let status: u64;
        let out0: u64;
        let out1: u64;

        // SMCCC: function id in w0, arguments in x1-x6, results in x0-x2.
        // x4-x17 may be clobbered by the monitor.
        unsafe {
            asm!(
                "smc #0",
                inout("x0") u64::from(id) => status,
                inout("x1") args[0] => out0,
                inout("x2") args[1] => out1,
                inout("x3") args[2] => _,
                inout("x4") args[3] => _,
                inout("x5") args[4] => _,
                inout("x6") args[5] => _,
                lateout("x7") _,
                lateout("x8") _,
                lateout("x9") _,
                lateout("x10") _,
                lateout("x11") _,
                lateout("x12") _,
                lateout("x13") _,
                lateout("x14") _,
                lateout("x15") _,
                lateout("x16") _,
                lateout("x17") _,
                options(nostack),
            );
        }

        SmcResult {
            status,
            out: [out0, out1],
        }
    }

    fn prepare_dma(&mut self, buf: &[u8]) -> u64 {
        let start = buf.as_ptr() as usize & !(CACHE_LINE - 1);
        let end = buf.as_ptr() as usize + buf.len();

        // Clean to the point of coherency so the monitor sees what we wrote.
        let mut line = start;
        while line < end {
            unsafe {
                asm!(
                    "dc cvac, {}",
                    in(reg) line,
                    options(nostack, preserves_flags),
                );
            }
            line += CACHE_LINE;
        }
        unsafe {
            asm!("dsb sy", options(nostack, preserves_flags));
        }

        buf.as_ptr() as u64
    }
}
