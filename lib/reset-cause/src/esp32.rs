// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ESP32 reset code table, and the RTC controller bits that go with it.
//!
//! Each core latches a 6-bit code in `RTC_CNTL_RESET_STATE_REG` (PRO CPU in
//! bits 0..6, APP CPU in bits 6..12). See the ESP32 TRM, "Reset and Clock",
//! table 4-1 for the list.

use crate::{CoreId, RawClass, RawResetCode, ResetCause, Silicon};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

pub const PRO_CPU: CoreId = CoreId(0);
pub const APP_CPU: CoreId = CoreId(1);

pub const RTC_CNTL_BASE: usize = 0x3ff4_8000;

// Register offsets from `RTC_CNTL_BASE`.
pub const OPTIONS0: usize = 0x0;
pub const RESET_STATE: usize = 0x34;
pub const SW_CPU_STALL: usize = 0xac;
/// Otherwise unused by the ROM, and keeps its value across every reset short
/// of power loss. Holds the pre-reset marker.
pub const STORE6: usize = 0xb8;

/// Word access to the RTC controller, by offset from [`RTC_CNTL_BASE`].
pub trait RtcCntl {
    fn read(&self, offset: usize) -> u32;
    fn write(&mut self, offset: usize, value: u32);
}

bitfield::bitfield! {
    #[derive(Copy, Clone)]
    pub struct ResetState(u32);
    pub procpu_cause, set_procpu_cause: 5, 0;
    pub appcpu_cause, set_appcpu_cause: 11, 6;
}

bitfield::bitfield! {
    #[derive(Copy, Clone)]
    pub struct Options0(u32);
    pub stall_appcpu_c0, set_stall_appcpu_c0: 1, 0;
    pub stall_procpu_c0, set_stall_procpu_c0: 3, 2;
    pub appcpu_rst, set_appcpu_rst: 4;
    pub procpu_rst, set_procpu_rst: 5;
}

bitfield::bitfield! {
    #[derive(Copy, Clone)]
    pub struct SwCpuStall(u32);
    pub stall_appcpu_c1, set_stall_appcpu_c1: 25, 20;
    pub stall_procpu_c1, set_stall_procpu_c1: 31, 26;
}

// A core is held only while both of its stall fields carry these values.
const STALL_C1: u32 = 0x21;
const STALL_C0: u32 = 0x2;

impl ResetState {
    /// The code latched for `core` by its last reset.
    pub fn code(&self, core: CoreId) -> RawResetCode {
        RawResetCode(if core == APP_CPU {
            self.appcpu_cause()
        } else {
            self.procpu_cause()
        })
    }
}

pub fn is_stalled<R: RtcCntl + ?Sized>(regs: &R, core: CoreId) -> bool {
    let options = Options0(regs.read(OPTIONS0));
    let stall = SwCpuStall(regs.read(SW_CPU_STALL));
    if core == APP_CPU {
        options.stall_appcpu_c0() == STALL_C0
            && stall.stall_appcpu_c1() == STALL_C1
    } else {
        options.stall_procpu_c0() == STALL_C0
            && stall.stall_procpu_c1() == STALL_C1
    }
}

fn set_stalled<R: RtcCntl + ?Sized>(regs: &mut R, core: CoreId, held: bool) {
    let (c1, c0) = if held { (STALL_C1, STALL_C0) } else { (0, 0) };
    let mut stall = SwCpuStall(regs.read(SW_CPU_STALL));
    let mut options = Options0(regs.read(OPTIONS0));
    if core == APP_CPU {
        stall.set_stall_appcpu_c1(c1);
        options.set_stall_appcpu_c0(c0);
    } else {
        stall.set_stall_procpu_c1(c1);
        options.set_stall_procpu_c0(c0);
    }
    regs.write(SW_CPU_STALL, stall.0);
    regs.write(OPTIONS0, options.0);
}

/// Resets both cores on behalf of `origin`, the core running this.
///
/// The other core is stalled before anything is reset. The PRO CPU must come
/// out of reset unstalled with `SwCpu` latched, since it runs the next boot:
/// from the PRO CPU both cores are reset in one write, and from the APP CPU
/// the PRO CPU is reset and released before the APP CPU resets itself.
///
/// On hardware the last write doesn't return.
pub fn reset_cores<R: RtcCntl + ?Sized>(regs: &mut R, origin: CoreId) {
    let other = if origin == APP_CPU { PRO_CPU } else { APP_CPU };
    set_stalled(regs, other, true);

    let mut options = Options0(regs.read(OPTIONS0));
    if origin == APP_CPU {
        options.set_procpu_rst(true);
        regs.write(OPTIONS0, options.0);
        set_stalled(regs, PRO_CPU, false);

        let mut options = Options0(regs.read(OPTIONS0));
        options.set_appcpu_rst(true);
        regs.write(OPTIONS0, options.0);
    } else {
        options.set_procpu_rst(true);
        options.set_appcpu_rst(true);
        regs.write(OPTIONS0, options.0);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u32)]
pub enum Esp32ResetCode {
    PowerOn = 1,
    /// Digital system reset requested by software.
    Sw = 3,
    /// Legacy watchdog.
    Owdt = 4,
    DeepSleep = 5,
    /// Reset by the SDIO host.
    Sdio = 6,
    /// Timer group 0 watchdog resetting the digital system.
    TaskWdtSys = 7,
    /// Timer group 1 watchdog resetting the digital system.
    IntWdtSys = 8,
    RtcWdtSys = 9,
    Intrusion = 10,
    TgWdtCpu = 11,
    /// CPU reset by software. Every restart that goes through software ends
    /// up here, including those forced by panic and watchdog handlers.
    SwCpu = 12,
    RtcWdtCpu = 13,
    /// APP CPU reset by the PRO CPU.
    ExtCpu = 14,
    Brownout = 15,
    RtcWdtRtc = 16,
}

impl Esp32ResetCode {
    pub const fn raw(self) -> RawResetCode {
        RawResetCode(self as u32)
    }
}

pub struct Esp32;

impl Silicon for Esp32 {
    const AUTHORITATIVE_CORE: CoreId = PRO_CPU;

    fn classify(raw: RawResetCode) -> RawClass {
        let Some(code) = Esp32ResetCode::from_u32(raw.0) else {
            return RawClass::Definite(ResetCause::Unknown);
        };
        match code {
            Esp32ResetCode::PowerOn => RawClass::Definite(ResetCause::PowerOn),
            Esp32ResetCode::Sw
            | Esp32ResetCode::SwCpu
            | Esp32ResetCode::ExtCpu => RawClass::Software,
            Esp32ResetCode::DeepSleep => {
                RawClass::Definite(ResetCause::DeepSleepWake)
            }
            Esp32ResetCode::TaskWdtSys => {
                RawClass::Definite(ResetCause::TaskWatchdog)
            }
            Esp32ResetCode::IntWdtSys => {
                RawClass::Definite(ResetCause::InterruptWatchdog)
            }
            Esp32ResetCode::Owdt
            | Esp32ResetCode::RtcWdtSys
            | Esp32ResetCode::TgWdtCpu
            | Esp32ResetCode::RtcWdtCpu
            | Esp32ResetCode::RtcWdtRtc => {
                RawClass::Definite(ResetCause::Watchdog)
            }
            Esp32ResetCode::Brownout => {
                RawClass::Definite(ResetCause::Brownout)
            }
            // No canonical cause for these.
            Esp32ResetCode::Sdio | Esp32ResetCode::Intrusion => {
                RawClass::Definite(ResetCause::Unknown)
            }
        }
    }
}
