// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Two-stage reset scenarios: the first stage fills every zone and then
//! resets the chip some way, the second checks what the next boot saw.

use boot_sim::zones::*;
use boot_sim::{Soc, CHECK};
use reset_cause::esp32::{Esp32ResetCode, APP_CPU, PRO_CPU};
use reset_cause::{PreResetMarker, ResetCause};

/// Zones after any reset that ran the full bootstrap but kept power.
fn check_normal_boot(soc: &mut Soc) {
    assert_eq!(soc.read(NOINIT), CHECK);
    assert_eq!(soc.read(RTC_NOINIT), CHECK);
    assert_eq!(soc.read(RTC_DATA), 0);
    assert_eq!(soc.read(RTC_BSS), 0);
    assert_eq!(soc.read(RTC_RODATA), CHECK);
    assert_eq!(soc.read(RTC_FORCE_FAST), 0);
    assert_eq!(soc.read(RTC_FORCE_SLOW), 0);
}

#[test]
fn power_on() {
    let mut soc = Soc::power_on();
    let boot = soc.boot();
    assert_eq!(boot.cause, ResetCause::PowerOn);

    assert_eq!(soc.read(NOINIT), 0);
    assert_eq!(soc.read(RTC_BSS), 0);
    assert_eq!(soc.read(RTC_DATA), 0);
    assert_eq!(soc.read(RTC_RODATA), CHECK);
    // Never initialized, so whatever the SRAM powered up with.
    assert_eq!(soc.read(RTC_NOINIT), u32::from_le_bytes([boot_sim::GARBAGE; 4]));
}

#[test]
fn deep_sleep() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.deep_sleep()
    });

    assert_eq!(soc.boot().cause, ResetCause::DeepSleepWake);
    assert_eq!(soc.read(RTC_NOINIT), CHECK);
    assert_eq!(soc.read(RTC_BSS), CHECK);
    assert_eq!(soc.read(RTC_FORCE_FAST), CHECK);
    assert_eq!(soc.read(RTC_FORCE_SLOW), CHECK);
    // Reloaded zones are restored even on wake.
    assert_eq!(soc.read(RTC_DATA), 0);
    assert_eq!(soc.read(RTC_RODATA), CHECK);
    // NOINIT is in main SRAM and nothing is promised about it here.
}

#[test]
fn panic_after_exception() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        panic!("LoadStoreError")
    });

    assert_eq!(soc.boot().cause, ResetCause::Panic);
    check_normal_boot(&mut soc);
}

#[test]
fn panic_after_abort() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.restart_after(PreResetMarker::FatalException, PRO_CPU)
    });

    assert_eq!(soc.boot().cause, ResetCause::Panic);
    check_normal_boot(&mut soc);
}

#[test]
fn restart() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.restart(PRO_CPU)
    });

    assert_eq!(soc.boot().cause, ResetCause::SoftwareRestart);
    check_normal_boot(&mut soc);
}

#[test]
fn restart_from_app_cpu() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.restart(APP_CPU)
    });

    assert_eq!(soc.restarts.last().map(|r| r.origin), Some(APP_CPU));
    assert_eq!(soc.boot().cause, ResetCause::SoftwareRestart);
    check_normal_boot(&mut soc);
}

#[test]
fn panic_on_app_cpu() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.on_app_cpu(|_| panic!("IllegalInstruction"))
    });

    let intent = soc.restarts.last().copied().unwrap();
    assert_eq!(intent.origin, APP_CPU);
    assert_eq!(intent.marker, PreResetMarker::FatalException);
    assert_eq!(soc.boot().cause, ResetCause::Panic);
    check_normal_boot(&mut soc);
}

#[test]
fn task_watchdog_on_app_cpu() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.on_app_cpu(|fw| fw.task_watchdog_expires())
    });

    assert_eq!(soc.restarts.last().map(|r| r.origin), Some(APP_CPU));
    assert_eq!(soc.boot().cause, ResetCause::TaskWatchdog);
}

#[test]
fn interrupt_watchdog_via_panic() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.interrupt_watchdog_expires(PRO_CPU)
    });

    assert_eq!(soc.boot().cause, ResetCause::InterruptWatchdog);
    assert_eq!(soc.read(RTC_NOINIT), CHECK);
}

#[test]
fn interrupt_watchdog_in_hardware() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.hardware_reset(Esp32ResetCode::IntWdtSys)
    });

    assert_eq!(soc.boot().cause, ResetCause::InterruptWatchdog);
    assert_eq!(soc.read(RTC_NOINIT), CHECK);
}

#[test]
fn rtc_watchdog_overrides_marker() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        // The interrupt watchdog handler got as far as its marker, but with
        // interrupts masked the RTC watchdog reset the chip first.
        fw.arm_marker(PreResetMarker::InterruptWatchdogExpired);
        fw.hardware_reset(Esp32ResetCode::RtcWdtRtc)
    });

    assert_eq!(soc.boot().cause, ResetCause::Watchdog);
    assert_eq!(soc.read(RTC_NOINIT), CHECK);
    assert_eq!(soc.marker_word(), 0);
}

#[test]
fn task_watchdog() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.task_watchdog_expires()
    });

    assert_eq!(soc.boot().cause, ResetCause::TaskWatchdog);
    check_normal_boot(&mut soc);
}

#[test]
fn brownout_via_interrupt() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.brownout_detected()
    });

    assert_eq!(soc.boot().cause, ResetCause::Brownout);
    check_normal_boot(&mut soc);
}

#[test]
fn brownout_in_hardware() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.hardware_reset(Esp32ResetCode::Brownout)
    });

    assert_eq!(soc.boot().cause, ResetCause::Brownout);
    assert_eq!(soc.read(RTC_NOINIT), CHECK);
}

#[test]
fn unlisted_codes_boot_as_unknown() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.hardware_reset(Esp32ResetCode::Sdio)
    });

    let boot = soc.boot();
    assert_eq!(boot.cause, ResetCause::Unknown);
    assert_eq!(boot.zones.zeroed, 3);
    check_normal_boot(&mut soc);
}

#[test]
fn resolve_is_cached_for_the_whole_boot() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| fw.task_watchdog_expires());

    assert!(!soc.resolved());
    assert_eq!(soc.current(), ResetCause::Unknown);

    assert_eq!(soc.resolve(), ResetCause::TaskWatchdog);
    assert!(soc.resolved());

    // A marker showing up later in the same boot is neither read nor
    // consumed.
    let stray = PreResetMarker::FatalException.encode();
    soc.scribble_marker(stray);
    assert_eq!(soc.resolve(), ResetCause::TaskWatchdog);
    assert_eq!(soc.current(), ResetCause::TaskWatchdog);
    assert_eq!(soc.marker_word(), stray);
}

#[test]
fn markers_do_not_outlive_their_boot() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| fw.restart_after(PreResetMarker::FatalException, PRO_CPU));
    let boot = soc.stage(|fw| {
        assert_eq!(fw.cause(), ResetCause::Panic);
        fw.restart(PRO_CPU)
    });
    assert_eq!(boot.cause, ResetCause::Panic);
    assert_eq!(soc.boot().cause, ResetCause::SoftwareRestart);
}

#[test]
fn marker_left_before_deep_sleep_is_discarded() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.arm_marker(PreResetMarker::TaskWatchdogExpired);
        fw.deep_sleep()
    });
    assert_eq!(soc.boot().cause, ResetCause::DeepSleepWake);
    assert_eq!(soc.marker_word(), 0);

    soc.stage(|fw| fw.restart(PRO_CPU));
    assert_eq!(soc.boot().cause, ResetCause::SoftwareRestart);
}

#[test]
fn corrupted_marker_reads_as_plain_restart() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| fw.restart(PRO_CPU));
    soc.scribble_marker(PreResetMarker::FatalException.encode() ^ 0x0001_0000);
    assert_eq!(soc.boot().cause, ResetCause::SoftwareRestart);
}

#[test]
fn power_loss_forgets_everything() {
    let mut soc = Soc::power_on();
    soc.stage(|fw| {
        fw.setup_values();
        fw.arm_marker(PreResetMarker::FatalException);
        fw.deep_sleep()
    });
    soc.cut_power();

    assert_eq!(soc.boot().cause, ResetCause::PowerOn);
    assert_eq!(soc.read(NOINIT), 0);
    assert_eq!(soc.read(RTC_BSS), 0);
    assert_ne!(soc.read(RTC_NOINIT), CHECK);
}
