// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ring buffers for tracing early boot
//!
//! Nothing that runs before the scheduler has a console to print to, so the
//! startup path leaves a trail in statically allocated ring buffers instead.
//! A debugger (or a RAM dump taken after the fact) can read them back; host
//! tests read them with [`StaticRingbuf::snapshot`].
//!
//! ## Constraints
//!
//! Payloads must implement both `Copy` and `PartialEq`. If you use the
//! variants of the macros that leave the name implicit, you can only have one
//! ring buffer per module.
//!
//! ## Creating a ring buffer
//!
//! ```ignore
//! ringbuf!(Trace, 16, Trace::None);
//! ringbuf_entry!(Trace::MarkerRead(raw));
//! ```
//!
//! or, with an explicit name:
//!
//! ```ignore
//! ringbuf!(RESOLVER_RINGBUF, Trace, 16, Trace::None);
//! ringbuf_entry!(RESOLVER_RINGBUF, Trace::MarkerRead(raw));
//! ```
//!
//! When an entry is recorded with the same line and payload as the most recent
//! one, the existing entry's `count` is bumped instead of using a new slot.
//!
//! ## Inspecting a ring buffer via GDB
//!
//! ```console
//! (gdb) set print pretty on
//! (gdb) print reset_cause::RESOLVER_RINGBUF
//! ```
//!
//! Entries are stored inside a `critical_section::Mutex`, so the payloads are
//! found under `inner.inner.value.buffer`.
//!
//! ## Concurrency
//!
//! On a dual-core part either core may record (the non-authoritative core can
//! be the one restarting the system), so every access goes through a
//! `critical-section` lock rather than a single-owner cell.

#![cfg_attr(not(test), no_std)]

use core::cell::RefCell;
use critical_section::Mutex;

/// Declares a ring buffer in the current module or context.
///
/// `ringbuf!(NAME, Type, N, expr)` makes a ring buffer named `NAME`, holding
/// up to `N` entries of type `Type`, with every slot initialized to `expr`.
/// The resulting ring buffer is a `static` of type `StaticRingbuf<Type, N>`.
///
/// If you omit the name, it defaults to `__RINGBUF`.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr, $init:expr) => {
        #[used]
        static $name: $crate::StaticRingbuf<$t, $n> =
            $crate::StaticRingbuf::new($init);
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

/// Records `payload` in a ring buffer declared with [`ringbuf!`], tagged with
/// the line of the call site.
///
/// If you declared your ring buffer without a name, you can also use this
/// without a name, and it will default to `__RINGBUF`.
#[cfg(not(feature = "disabled"))]
#[macro_export]
macro_rules! ringbuf_entry {
    ($buf:expr, $payload:expr) => {{
        // Evaluate both buf and payload in a tuple so neither can capture
        // the other's binding.
        let (p, buf) = ($payload, &$buf);
        $crate::StaticRingbuf::record(buf, line!() as u16, p);
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

/// A single slot. `count == 0` marks a slot that has never been written.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RingbufEntry<T: Copy + PartialEq> {
    pub line: u16,
    pub generation: u16,
    pub count: u32,
    pub payload: T,
}

/// A ring buffer of parametrized type and size. Usually reached through
/// [`StaticRingbuf`] rather than used directly.
#[derive(Debug, Copy, Clone)]
pub struct Ringbuf<T: Copy + PartialEq, const N: usize> {
    /// Slot written most recently, `None` until the first entry.
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
        // A corrupted `last` is treated like an empty buffer: `get_mut`
        // misses and we start over at slot 0.
        let last = self.last.and_then(|i| Some((i, self.buffer.get_mut(i)?)));
        let next = match last {
            Some((i, ent)) => {
                if ent.line == line && ent.payload == payload {
                    if let Some(count) = ent.count.checked_add(1) {
                        ent.count = count;
                        return;
                    }
                }
                if i + 1 >= N {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };

        let Some(ent) = self.buffer.get_mut(next) else {
            // N == 0; nothing to record into.
            return;
        };
        *ent = RingbufEntry {
            line,
            generation: ent.generation.wrapping_add(1),
            count: 1,
            payload,
        };
        self.last = Some(next);
    }

    /// Iterates over written entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &RingbufEntry<T>> + '_ {
        let start = match self.last {
            Some(i) if i < N => i + 1,
            _ => 0,
        };
        (0..N)
            .map(move |k| &self.buffer[(start + k) % N])
            .filter(|e| e.count != 0)
    }
}

/// A [`Ringbuf`] that can live in a `static` and be written from any core.
pub struct StaticRingbuf<T: Copy + PartialEq, const N: usize> {
    inner: Mutex<RefCell<Ringbuf<T, N>>>,
}

impl<T: Copy + PartialEq, const N: usize> StaticRingbuf<T, N> {
    pub const fn new(init: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Ringbuf::new(init))),
        }
    }

    pub fn record(&self, line: u16, payload: T) {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).entry(line, payload);
        });
    }

    /// Copies out the current contents.
    pub fn snapshot(&self) -> Ringbuf<T, N> {
        critical_section::with(|cs| *self.inner.borrow_ref(cs))
    }
}
