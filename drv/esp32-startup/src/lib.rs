// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ESP32 startup: reset cause first, then retention zones.
//!
//! The reset vector's Rust entry point calls [`boot`] on the PRO CPU before
//! anything else runs, and in particular before the APP CPU is released.
//! Fatal exception handlers and watchdog interrupt handlers restart through
//! [`restart_after`]; everything else that wants a restart uses [`restart`].
//!
//! The zone table comes from `zones.toml` (or `$RETENTION_ZONES_CONFIG`) and
//! the linker script has to provide every symbol it names. The final binary
//! also has to provide a `critical-section` implementation that masks
//! interrupts and takes the inter-core lock.

#![no_std]

use reset_cause::esp32::{
    self, Esp32, ResetState, RtcCntl, RESET_STATE, RTC_CNTL_BASE, STORE6,
};
use reset_cause::{
    CoreId, MarkerRegister, PreResetMarker, RawResetCode, ResetCause,
    ResetStatus, RestartIntent, SystemReset,
};
use retention_zones::{Direct, ZoneReport};
use ringbuf::{ringbuf, ringbuf_entry};

include!(concat!(env!("OUT_DIR"), "/zones.rs"));

/// The RTC_CNTL register block itself.
struct Registers;

impl RtcCntl for Registers {
    fn read(&self, offset: usize) -> u32 {
        let reg = (RTC_CNTL_BASE + offset) as *const u32;
        // Safety: the offsets in `esp32` are all RTC_CNTL registers, which
        // are always mapped and readable.
        unsafe { core::ptr::read_volatile(reg) }
    }

    fn write(&mut self, offset: usize, value: u32) {
        let reg = (RTC_CNTL_BASE + offset) as *mut u32;
        // Safety: as above. Only startup and the restart path write, each
        // with interrupts masked.
        unsafe { core::ptr::write_volatile(reg, value) }
    }
}

/// The per-core reset cause latches in `RTC_CNTL_RESET_STATE`.
pub struct ResetLatch {
    _private: (),
}

impl ResetStatus for ResetLatch {
    type Silicon = Esp32;

    fn raw_reset_code(&self, core: CoreId) -> RawResetCode {
        ResetState(Registers.read(RESET_STATE)).code(core)
    }
}

/// The RTC controller, as far as restarting goes: the marker register and
/// the software CPU reset and stall bits.
pub struct RtcControl {
    regs: Registers,
}

impl RtcControl {
    /// # Safety
    ///
    /// Whoever holds this may reset the chip and overwrite the marker. Only
    /// startup and the restart path, both with interrupts masked, take one.
    unsafe fn new() -> Self {
        Self { regs: Registers }
    }
}

impl MarkerRegister for RtcControl {
    fn read(&self) -> u32 {
        self.regs.read(STORE6)
    }

    fn write(&mut self, value: u32) {
        self.regs.write(STORE6, value);
    }
}

impl SystemReset for RtcControl {
    fn system_reset(&mut self, intent: RestartIntent) -> ! {
        esp32::reset_cores(&mut self.regs, intent.origin);
        loop {
            core::hint::spin_loop();
        }
    }
}

/// What startup found and did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Boot {
    pub cause: ResetCause,
    pub zones: ZoneReport,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Booted(Boot),
    Restart(RestartIntent),
}

ringbuf!(Trace, 4, Trace::None);

/// Resolves the reset cause and applies every zone's retention policy.
///
/// A zone table that doesn't match the image halts here.
///
/// # Safety
///
/// Must be called once, on the PRO CPU, before the APP CPU is started and
/// before anything reads or writes a declared zone.
pub unsafe fn boot() -> Boot {
    // Safety: passed on from our caller.
    let cause = unsafe { resolve() };

    // Safety: the generated table only holds linker-defined zones, and our
    // caller promises nobody is using them yet.
    let mut memory = unsafe { Direct::new() };
    let table = zone_table();
    let zones =
        retention_zones::apply_policies_or_halt(&table, cause, &mut memory);

    let boot = Boot { cause, zones };
    ringbuf_entry!(Trace::Booted(boot));
    boot
}

/// Resolves the reset cause without touching any zone. Only the first call
/// reads the hardware (and consumes the marker); later ones return the
/// cached value.
///
/// # Safety
///
/// The first call must come from startup on the PRO CPU, before the APP CPU
/// is started.
pub unsafe fn resolve() -> ResetCause {
    let latch = ResetLatch { _private: () };
    // Safety: nothing else is running yet, per our caller.
    let mut rtc = unsafe { RtcControl::new() };
    reset_cause::resolve(&latch, &mut rtc)
}

/// The reset cause resolved by [`boot`].
pub fn cause() -> ResetCause {
    reset_cause::current()
}

/// Restarts the system on purpose. The next boot sees
/// [`ResetCause::SoftwareRestart`].
pub fn restart(origin: CoreId) -> ! {
    restart_with(RestartIntent::deliberate(origin))
}

/// Restarts the system from a handler that wants the next boot to know why,
/// e.g. [`PreResetMarker::FatalException`] from the panic handler.
pub fn restart_after(marker: PreResetMarker, origin: CoreId) -> ! {
    restart_with(RestartIntent::after(marker, origin))
}

fn restart_with(intent: RestartIntent) -> ! {
    ringbuf_entry!(Trace::Restart(intent));
    // Safety: `reset_cause::restart` masks interrupts for the marker write
    // and the reset.
    let mut rtc = unsafe { RtcControl::new() };
    reset_cause::restart(&mut rtc, intent)
}
