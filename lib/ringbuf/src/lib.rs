// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trace ring buffers for the reboot path.
//!
//! Each module that wants to leave a trail declares a small static ring of
//! `Copy + PartialEq` entries with [`ringbuf!`] and records into it with
//! [`ringbuf_entry!`]. Nothing is formatted and nothing is allocated; the ring
//! is meant to be read out of a crash dump or with a debugger after the fact,
//! e.g.
//!
//! ```console
//! (gdb) print drv_r2p::dispatch::__RINGBUF
//! ```
//!
//! A typical declaration, with one ring per module:
//!
//! ```ignore
//! #[derive(Copy, Clone, PartialEq)]
//! enum Trace {
//!     None,
//!     ChunkFailed { offset: u32, status: u64 },
//! }
//!
//! ringbuf!(Trace, 16, Trace::None);
//!
//! fn oops(offset: u32, status: u64) {
//!     ringbuf_entry!(Trace::ChunkFailed { offset, status });
//! }
//! ```
//!
//! Consecutive identical entries recorded from the same line are folded into
//! one entry with a repeat count, so a retry loop does not wipe out history.
//!
//! The rings live behind a `spin::Mutex` rather than a single-borrow cell:
//! the code recording into them runs both on the reboot path and from
//! attribute writes on other threads.

#![cfg_attr(not(test), no_std)]

#[doc(hidden)]
pub use spin;

/// Declares a ring buffer in the current module.
///
/// `ringbuf!(NAME, Type, N, expr)` makes a static ring named `NAME` holding
/// `N` entries of `Type`, all initialized to `expr`. Without a name the ring
/// is called `__RINGBUF`, which is what [`ringbuf_entry!`] uses by default.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[used]
        static $name: $crate::spin::Mutex<$crate::Ringbuf<$t, $n>> =
            $crate::spin::Mutex::new($crate::Ringbuf::new($init));
    };
    ($t:ty, $n:expr, $init:expr) => {
        $crate::ringbuf!(__RINGBUF, $t, $n, $init);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
    ($t:ty, $n:expr, $init:expr) => {
        #[allow(dead_code)]
        const _: $t = $init;
    };
}

/// Records an entry into a ring declared with [`ringbuf!`].
///
/// `ringbuf_entry!(NAME, expr)` records into `NAME`; `ringbuf_entry!(expr)`
/// records into the module's default `__RINGBUF`.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        // Evaluate the payload before taking the lock so that a payload
        // expression which itself records an entry cannot deadlock.
        let (p, buf) = ($payload, &$buf);
        $crate::Ringbuf::entry(
            &mut *$crate::spin::Mutex::lock(buf),
            line!() as u16,
            p,
        );
    }};
    ($payload:expr) => {
        $crate::ringbuf_entry!(__RINGBUF, $payload);
    };
}

#[cfg(feature = "disabled")]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        let _ = &$payload;
    }};
    ($payload:expr) => {{
        let _ = &$payload;
    }};
}

/// One slot in a [`Ringbuf`].
///
/// `generation` counts how many times this slot has been overwritten, which
/// makes it possible to tell wrapped history apart from fresh history when
/// reading a dump. `count` is the number of consecutive identical entries
/// folded into this slot.
#[derive(Debug, Copy, Clone)]
pub struct RingbufEntry<T: Copy + PartialEq> {
    pub line: u16,
    pub generation: u16,
    pub count: u32,
    pub payload: T,
}

/// A fixed-size ring of trace entries. See [`ringbuf!`].
#[derive(Debug)]
pub struct Ringbuf<T: Copy + PartialEq, const N: usize> {
    pub last: Option<usize>,
    pub buffer: [RingbufEntry<T>; N],
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, N> {
    pub const fn new(init: T) -> Self {
        Self {
            last: None,
            buffer: [RingbufEntry {
                line: 0,
                generation: 0,
                count: 0,
                payload: init,
            }; N],
        }
    }

    pub fn entry(&mut self, line: u16, payload: T) {
        // `None` is treated as an out-of-range index so that the first entry
        // lands in slot 0 and is never folded into an unused slot.
        let last = self.last.unwrap_or(usize::MAX);

        if let Some(ent) = self.buffer.get_mut(last) {
            if ent.line == line && ent.payload == payload {
                if let Some(new_count) = ent.count.checked_add(1) {
                    ent.count = new_count;
                    return;
                }
            }
        }

        let next = last.wrapping_add(1);
        let ndx = if next >= N { 0 } else { next };

        let ent = &mut self.buffer[ndx];
        *ent = RingbufEntry {
            line,
            payload,
            count: 1,
            generation: ent.generation.wrapping_add(1),
        };

        self.last = Some(ndx);
    }

    /// Returns the most recently recorded entry, if any.
    pub fn last_entry(&self) -> Option<&RingbufEntry<T>> {
        self.last.and_then(|ndx| self.buffer.get(ndx))
    }

    /// Iterates over recorded entries from oldest to newest.
    ///
    /// Slots that have never been written are skipped.
    pub fn iter(&self) -> impl Iterator<Item = &RingbufEntry<T>> + '_ {
        let start = match self.last {
            Some(last) => last + 1,
            None => N,
        };
        (0..N)
            .map(move |i| &self.buffer[(start + i) % N])
            .filter(|ent| ent.generation != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq)]
    enum Event {
        None,
        Called(u32),
    }

    fn payloads<const N: usize>(r: &Ringbuf<Event, N>) -> Vec<(Event, u32)> {
        r.iter().map(|e| (e.payload, e.count)).collect()
    }

    #[test]
    fn empty_ring_has_no_entries() {
        let r = Ringbuf::<Event, 4>::new(Event::None);
        assert!(r.last_entry().is_none());
        assert_eq!(r.iter().count(), 0);
    }

    #[test]
    fn repeated_entries_fold() {
        let mut r = Ringbuf::<Event, 4>::new(Event::None);
        r.entry(10, Event::Called(1));
        r.entry(10, Event::Called(1));
        r.entry(10, Event::Called(1));
        r.entry(11, Event::Called(1));

        assert_eq!(
            payloads(&r),
            [(Event::Called(1), 3), (Event::Called(1), 1)]
        );
    }

    #[test]
    fn wraps_oldest_first() {
        let mut r = Ringbuf::<Event, 3>::new(Event::None);
        for i in 0..5 {
            r.entry(1, Event::Called(i));
        }

        assert_eq!(
            payloads(&r),
            [
                (Event::Called(2), 1),
                (Event::Called(3), 1),
                (Event::Called(4), 1)
            ]
        );
        // Slot 0 was written by entries 0 and 3.
        assert_eq!(r.buffer[0].generation, 2);
        assert_eq!(r.last_entry().unwrap().payload, Event::Called(4));
    }

    ringbuf!(TEST_RINGBUF, Event, 8, Event::None);

    #[test]
    fn macro_records_line() {
        ringbuf_entry!(TEST_RINGBUF, Event::Called(7));
        let ring = TEST_RINGBUF.lock();
        let last = ring.last_entry().unwrap();
        assert_eq!(last.payload, Event::Called(7));
        assert_ne!(last.line, 0);
    }
}
