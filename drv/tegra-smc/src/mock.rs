// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A host-side stand-in for the secure monitor.
//!
//! `RecordingSmc` logs every call and emulates the effect of the two SiP
//! calls on an IRAM image and a sparse set of scratch registers, so tests can
//! check both the call sequence and what the bootloader would find after
//! reset.

use crate::{SecureCall, SmcResult, SmcStatus, COPY_TO_IRAM, SET_REBOOT_CONFIG};
use std::collections::BTreeMap;
use std::vec::Vec;

/// Physical address handed out for every prepared buffer.
pub const MOCK_DMA_ADDR: u64 = 0x8000_0000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub id: u32,
    pub args: [u64; 6],
    /// Contents of the prepared buffer at the time of a copy call.
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct RecordingSmc {
    pub calls: Vec<Call>,
    dma: Vec<u8>,
    failing: Vec<usize>,
    iram_base: u64,
    iram: Vec<u8>,
    scratch: BTreeMap<u32, u32>,
}

impl RecordingSmc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulates `len` bytes of IRAM starting at physical address `base`.
    pub fn with_iram(base: u64, len: usize) -> Self {
        Self {
            iram_base: base,
            iram: std::vec![0; len],
            ..Self::default()
        }
    }

    /// Makes the `n`th call (counting from zero) fail with
    /// [`SmcStatus::InvalidParameter`] and have no effect.
    pub fn fail_call(&mut self, n: usize) {
        self.failing.push(n);
    }

    pub fn iram(&self) -> &[u8] {
        &self.iram
    }

    pub fn scratch(&self, offset: u32) -> u32 {
        self.scratch.get(&offset).copied().unwrap_or(0)
    }

    pub fn set_scratch(&mut self, offset: u32, value: u32) {
        self.scratch.insert(offset, value);
    }

    fn apply_copy(&mut self, args: &[u64; 6]) -> SmcResult {
        let [src, dst, size, flags, ..] = *args;
        let size = size as usize;
        if src != MOCK_DMA_ADDR || flags != 0 || size > self.dma.len() {
            return status(SmcStatus::InvalidParameter);
        }
        let Some(start) = dst.checked_sub(self.iram_base) else {
            return status(SmcStatus::InvalidParameter);
        };
        let start = start as usize;
        let Some(window) = self.iram.get_mut(start..start + size) else {
            return status(SmcStatus::InvalidParameter);
        };
        window.copy_from_slice(&self.dma[..size]);
        SmcResult::default()
    }

    fn apply_scratch(&mut self, args: &[u64; 6]) -> SmcResult {
        let [offset, value, mask, ..] = *args;
        let reg = self.scratch.entry(offset as u32).or_insert(0);
        *reg = (*reg & !(mask as u32)) | (value as u32 & mask as u32);
        SmcResult::default()
    }
}

fn status(s: SmcStatus) -> SmcResult {
    SmcResult {
        status: s as i64 as u64,
        out: [0; 2],
    }
}

impl SecureCall for RecordingSmc {
    fn invoke(&mut self, id: u32, args: [u64; 6]) -> SmcResult {
        let n = self.calls.len();
        self.calls.push(Call {
            id,
            args,
            data: if id == COPY_TO_IRAM {
                self.dma.clone()
            } else {
                Vec::new()
            },
        });

        if self.failing.contains(&n) {
            return status(SmcStatus::InvalidParameter);
        }

        match id {
            COPY_TO_IRAM => self.apply_copy(&args),
            SET_REBOOT_CONFIG => self.apply_scratch(&args),
            _ => status(SmcStatus::NotSupported),
        }
    }

    fn prepare_dma(&mut self, buf: &[u8]) -> u64 {
        self.dma.clear();
        self.dma.extend_from_slice(buf);
        MOCK_DMA_ADDR
    }
}
