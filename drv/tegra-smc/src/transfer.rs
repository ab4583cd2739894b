// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Moving an image into IRAM one bounce buffer at a time.
//!
//! The monitor copies at most one chunk per call, and it reads the source by
//! physical address, so the image is walked in `CHUNK`-sized windows through
//! a single buffer whose address is stable for the life of the transfer.
//!
//! Windows are always written in increasing offset order. The firmware
//! consumes the destination as one contiguous image, and the bounce buffer is
//! shared between windows, so there is no way to write them out of order or
//! concurrently without corrupting the result.

use crate::{copy_to_iram, SecureCall, SmcStatus};
use ringbuf::{ringbuf, ringbuf_entry};

/// Size of one window, and the most the monitor copies per call.
pub const CHUNK_SIZE: usize = 0x4000;

/// What the tail of the bounce buffer holds when the last window of an
/// image is shorter than a chunk.
///
/// Every window is transferred as a full chunk, so the bytes past the end of
/// the image land in IRAM either way.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TailFill {
    /// Clear the tail.
    Zero,
    /// Leave whatever the previous window left there.
    Stale,
}

/// Outcome of a best-effort transfer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Copy calls issued.
    pub chunks: usize,
    /// Copy calls that returned a nonzero status.
    pub failed: usize,
}

impl StageReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Copy, Clone, PartialEq)]
enum Trace {
    None,
    ChunkFailed { dst: u64, status: SmcStatus },
    Staged { dst: u64, len: u32, chunks: u32, failed: u32 },
    Copied { dst: u64, len: u32, failed: u32 },
}

ringbuf!(Trace, 16, Trace::None);

pub struct ChunkedTransfer<const CHUNK: usize = CHUNK_SIZE> {
    bounce: [u8; CHUNK],
    tail: TailFill,
}

impl<const CHUNK: usize> ChunkedTransfer<CHUNK> {
    const NONEMPTY: () = assert!(CHUNK > 0);

    pub const fn new(tail: TailFill) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NONEMPTY;
        Self {
            bounce: [0; CHUNK],
            tail,
        }
    }

    pub fn tail_fill(&self) -> TailFill {
        self.tail
    }

    /// Stages `image` at `dst`, one full chunk per call.
    ///
    /// Issues exactly `ceil(image.len() / CHUNK)` calls, each transferring
    /// `CHUNK` bytes to `dst + n * CHUNK`. A failed call is traced and the
    /// transfer moves on; whatever ends up in IRAM is what the firmware gets.
    pub fn stage(
        &mut self,
        smc: &mut impl SecureCall,
        image: &[u8],
        dst: u64,
    ) -> StageReport {
        let mut report = StageReport::default();

        for (n, window) in image.chunks(CHUNK).enumerate() {
            self.bounce[..window.len()].copy_from_slice(window);
            if self.tail == TailFill::Zero {
                self.bounce[window.len()..].fill(0);
            }

            let chunk_dst = dst + (n * CHUNK) as u64;
            let src = smc.prepare_dma(&self.bounce);
            let r = copy_to_iram(smc, src, chunk_dst, CHUNK as u64);

            report.chunks += 1;
            if !r.is_success() {
                report.failed += 1;
                ringbuf_entry!(Trace::ChunkFailed {
                    dst: chunk_dst,
                    status: r.decode(),
                });
            }
        }

        ringbuf_entry!(Trace::Staged {
            dst,
            len: image.len() as u32,
            chunks: report.chunks as u32,
            failed: report.failed as u32,
        });
        report
    }

    /// Copies `bytes` to `dst` verbatim.
    ///
    /// Unlike [`Self::stage`], no call transfers more than the bytes it was
    /// given, so nothing around the destination is disturbed. Used for small
    /// records patched into an already-staged image.
    pub fn copy(
        &mut self,
        smc: &mut impl SecureCall,
        bytes: &[u8],
        dst: u64,
    ) -> StageReport {
        let mut report = StageReport::default();

        for (n, window) in bytes.chunks(CHUNK).enumerate() {
            let buf = &mut self.bounce[..window.len()];
            buf.copy_from_slice(window);

            let chunk_dst = dst + (n * CHUNK) as u64;
            let src = smc.prepare_dma(buf);
            let r = copy_to_iram(smc, src, chunk_dst, window.len() as u64);

            report.chunks += 1;
            if !r.is_success() {
                report.failed += 1;
                ringbuf_entry!(Trace::ChunkFailed {
                    dst: chunk_dst,
                    status: r.decode(),
                });
            }
        }

        ringbuf_entry!(Trace::Copied {
            dst,
            len: bytes.len() as u32,
            failed: report.failed as u32,
        });
        report
    }
}
