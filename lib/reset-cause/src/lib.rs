// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reset cause classification
//!
//! Early in every boot, before anything else gets to look at the hardware,
//! the startup code calls [`resolve`]. It reads the raw reset code latched by
//! the authoritative core, folds in the one-shot [`PreResetMarker`] left by
//! whichever handler forced the previous restart, and caches a single
//! [`ResetCause`] for the rest of the boot. Everything after that reads the
//! cached value with [`current`].
//!
//! The raw codes alias: a plain software restart, a restart after a fatal
//! exception and a restart after a watchdog handler gave up all latch the same
//! code. The marker is what tells them apart, and it is only consulted when
//! the silicon table says the code is one of those aliased software resets.
//! Codes produced directly by hardware (a watchdog tier resetting the chip on
//! its own, a brownout, deep sleep exit) are final regardless of the marker.

#![cfg_attr(not(test), no_std)]

use core::sync::atomic::{AtomicU8, Ordering};
use hubpack::SerializedSize;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use ringbuf::{ringbuf, ringbuf_entry};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

pub mod esp32;
mod marker;
mod restart;

pub use marker::{arm, take, MarkerCorrupt, MarkerRegister, PreResetMarker};
pub use restart::{restart, RestartIntent, SystemReset};

/// Canonical reason the processor restarted.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    SerializedSize,
    FromPrimitive,
)]
#[repr(u8)]
pub enum ResetCause {
    PowerOn,
    SoftwareRestart,
    DeepSleepWake,
    Panic,
    InterruptWatchdog,
    TaskWatchdog,
    /// Generic RTC-tier watchdog.
    Watchdog,
    Brownout,
    Unknown,
}

impl ResetCause {
    pub const ALL: [ResetCause; 9] = [
        ResetCause::PowerOn,
        ResetCause::SoftwareRestart,
        ResetCause::DeepSleepWake,
        ResetCause::Panic,
        ResetCause::InterruptWatchdog,
        ResetCause::TaskWatchdog,
        ResetCause::Watchdog,
        ResetCause::Brownout,
        ResetCause::Unknown,
    ];
}

// The cache uses a byte value outside the enum to mean "not yet resolved".
const UNRESOLVED: u8 = 0xff;
const_assert!((ResetCause::Unknown as u8) < UNRESOLVED);

/// Index of a logical core.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CoreId(pub u8);

/// The reset status exactly as the silicon reports it. Its encoding is
/// vendor-defined and can change between chip revisions; only a [`Silicon`]
/// table gives it meaning.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawResetCode(pub u32);

/// What the silicon table makes of a raw code, before the marker is
/// considered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RawClass {
    /// The code is produced by exactly one kind of event.
    Definite(ResetCause),
    /// The code is the generic software CPU reset, which every pre-reset
    /// handler also goes through. The marker decides.
    Software,
}

/// Per-chip knowledge of the raw reset code encoding.
pub trait Silicon {
    /// The core that owns the boot sequence, and whose latched code is used
    /// for classification.
    const AUTHORITATIVE_CORE: CoreId;

    fn classify(raw: RawResetCode) -> RawClass;
}

/// Read access to the per-core reset status latches.
pub trait ResetStatus {
    type Silicon: Silicon;

    fn raw_reset_code(&self, core: CoreId) -> RawResetCode;
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    RawCode(u32),
    Class(RawClass),
    Marker(PreResetMarker),
    Resolved(ResetCause),
}

ringbuf!(RESOLVER_RINGBUF, Trace, 8, Trace::None);

/// Combines the provisional class with the marker.
pub fn disambiguate(class: RawClass, marker: PreResetMarker) -> ResetCause {
    match class {
        RawClass::Definite(cause) => cause,
        RawClass::Software => match marker {
            PreResetMarker::None => ResetCause::SoftwareRestart,
            PreResetMarker::FatalException => ResetCause::Panic,
            PreResetMarker::TaskWatchdogExpired => ResetCause::TaskWatchdog,
            PreResetMarker::InterruptWatchdogExpired => {
                ResetCause::InterruptWatchdog
            }
            PreResetMarker::BrownoutDetected => ResetCause::Brownout,
        },
    }
}

/// Reads the hardware and the marker and works out why we reset. The marker
/// register is cleared as a side effect, so this must only happen once per
/// boot; use [`BootCause`] rather than calling this directly.
pub fn classify<S, M>(status: &S, marker: &mut M) -> ResetCause
where
    S: ResetStatus,
    M: MarkerRegister,
{
    let raw = status.raw_reset_code(S::Silicon::AUTHORITATIVE_CORE);
    ringbuf_entry!(RESOLVER_RINGBUF, Trace::RawCode(raw.0));

    let class = S::Silicon::classify(raw);
    ringbuf_entry!(RESOLVER_RINGBUF, Trace::Class(class));

    // The marker is taken on every boot, even when the raw code means it
    // won't be used, so that a stale marker can't leak into a later boot.
    let hint = take(marker);
    ringbuf_entry!(RESOLVER_RINGBUF, Trace::Marker(hint));

    let cause = disambiguate(class, hint);
    ringbuf_entry!(RESOLVER_RINGBUF, Trace::Resolved(cause));
    cause
}

/// Initialize-once holder for the boot's reset cause.
///
/// [`BootCause::resolve`] is called from single-threaded startup code; once
/// it has returned, [`BootCause::current`] can be called from any core
/// without further synchronization.
pub struct BootCause {
    state: AtomicU8,
}

impl BootCause {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNRESOLVED),
        }
    }

    /// Classifies this boot on the first call and returns the cached cause on
    /// every later one, without touching the hardware again.
    pub fn resolve<S, M>(&self, status: &S, marker: &mut M) -> ResetCause
    where
        S: ResetStatus,
        M: MarkerRegister,
    {
        if let Some(cause) = self.get() {
            return cause;
        }
        let cause = classify(status, marker);
        self.state.store(cause as u8, Ordering::Release);
        cause
    }

    /// The cached cause, or `None` before [`BootCause::resolve`] has run.
    pub fn get(&self) -> Option<ResetCause> {
        ResetCause::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The cached cause. Reads as [`ResetCause::Unknown`] if nothing has
    /// resolved it yet.
    pub fn current(&self) -> ResetCause {
        self.get().unwrap_or(ResetCause::Unknown)
    }
}

impl Default for BootCause {
    fn default() -> Self {
        Self::new()
    }
}

static BOOT_CAUSE: BootCause = BootCause::new();

/// Resolves the reset cause for this boot. Startup code calls this exactly
/// once, before any other subsystem runs; later calls return the cached
/// value.
pub fn resolve<S, M>(status: &S, marker: &mut M) -> ResetCause
where
    S: ResetStatus,
    M: MarkerRegister,
{
    BOOT_CAUSE.resolve(status, marker)
}

/// The reset cause resolved for this boot.
pub fn current() -> ResetCause {
    BOOT_CAUSE.current()
}
