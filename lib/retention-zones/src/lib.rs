// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Retention policies for memory that may outlive a reset
//!
//! Every region that the startup code is allowed to leave alone, clear, or
//! refill is declared as a [`MemoryZone`] with exactly one
//! [`RetentionPolicy`]. Once the reset cause is known, the startup code calls
//! [`apply_policies`] (or [`apply_policies_or_halt`]) before anything else
//! reads those regions.
//!
//! | Policy                | Deep-sleep wake | Power-on | Any other cause |
//! |-----------------------|-----------------|----------|-----------------|
//! | `NeverCleared`        | preserve        | preserve | preserve        |
//! | `ClearedOnColdBoot`   | preserve        | zero     | preserve        |
//! | `ClearedOnNormalBoot` | preserve        | zero     | zero            |
//! | `ReloadFromImage`     | reload          | reload   | reload          |
//!
//! Deep sleep is the only way through reset that skips the normal bootstrap,
//! which is why it is the only cause that spares `ClearedOnNormalBoot`. The
//! image copy is part of every boot, deep-sleep wake included.

#![cfg_attr(not(test), no_std)]

use ringbuf::{ringbuf, ringbuf_entry};

pub use reset_cause::ResetCause;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Lives in an always-powered domain and is never touched by startup.
    /// Contents are only meaningful once something has written them.
    NeverCleared,
    /// Zeroed only when the retention domain itself lost power.
    ClearedOnColdBoot,
    /// Zeroed by every boot that runs the normal bootstrap, i.e. everything
    /// except a deep-sleep wake.
    ClearedOnNormalBoot,
    /// Restored from its compile-time image on every boot.
    ReloadFromImage,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ZoneAction {
    Preserve,
    Zero,
    Reload,
}

impl RetentionPolicy {
    pub const fn action(self, cause: ResetCause) -> ZoneAction {
        match (self, cause) {
            (RetentionPolicy::NeverCleared, _) => ZoneAction::Preserve,
            (RetentionPolicy::ReloadFromImage, _) => ZoneAction::Reload,
            (_, ResetCause::DeepSleepWake) => ZoneAction::Preserve,
            (RetentionPolicy::ClearedOnColdBoot, ResetCause::PowerOn) => {
                ZoneAction::Zero
            }
            (RetentionPolicy::ClearedOnColdBoot, _) => ZoneAction::Preserve,
            (RetentionPolicy::ClearedOnNormalBoot, _) => ZoneAction::Zero,
        }
    }
}

/// The power island a zone physically lives in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PowerDomain {
    RtcFast,
    RtcSlow,
    /// Powered down during deep sleep.
    Main,
}

impl PowerDomain {
    pub const fn survives_deep_sleep(self) -> bool {
        !matches!(self, PowerDomain::Main)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZoneId(pub u8);

/// An address range, `base..base + len`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Region {
    pub base: usize,
    pub len: usize,
}

impl Region {
    pub const fn new(base: usize, len: usize) -> Self {
        Self { base, len }
    }

    /// Builds a region from a pair of linker symbols. An `end` below `start`
    /// gives an empty region.
    pub fn from_symbols(start: *const u8, end: *const u8) -> Self {
        let base = start as usize;
        Self {
            base,
            len: (end as usize).saturating_sub(base),
        }
    }

    /// One past the last byte, clamped at the top of the address space.
    pub const fn end(&self) -> usize {
        self.base.saturating_add(self.len)
    }

    /// Whether the two regions share a byte. Empty regions share nothing.
    pub const fn overlaps(&self, other: &Region) -> bool {
        self.len != 0
            && other.len != 0
            && self.base < other.end()
            && other.base < self.end()
    }
}

/// One entry in the zone registry.
#[derive(Copy, Clone, Debug)]
pub struct MemoryZone {
    pub id: ZoneId,
    pub name: &'static str,
    pub policy: RetentionPolicy,
    pub domain: PowerDomain,
    pub region: Region,
    /// Compile-time initial contents. Only meaningful for
    /// [`RetentionPolicy::ReloadFromImage`].
    pub image: Option<&'static [u8]>,
}

impl MemoryZone {
    fn locate_image(&self) -> Result<&'static [u8], ZoneError> {
        let image = self.image.ok_or(ZoneError::MissingImage(self.id))?;
        if image.len() != self.region.len {
            return Err(ZoneError::ImageSizeMismatch {
                zone: self.id,
                expected: self.region.len,
                found: image.len(),
            });
        }
        Ok(image)
    }
}

/// Locates a zone's compile-time image at `start`.
///
/// Linker scripts `PROVIDE` a load symbol as 0 when the section it belongs to
/// wasn't emitted; that reads as no image at all.
///
/// # Safety
///
/// Unless null, `start` must point at `len` bytes of memory that stay valid
/// and unmodified for the rest of the program (in practice, flash).
pub unsafe fn image_at(start: *const u8, len: usize) -> Option<&'static [u8]> {
    // `start` is usually the address of an extern static, which the compiler
    // takes to be non-null; it has to lose track of where it came from.
    if core::hint::black_box(start).is_null() {
        return None;
    }
    // Safety: upheld by our caller.
    Some(unsafe { core::slice::from_raw_parts(start, len) })
}

/// Ways applying the policies can fail. Every one of them means the zone
/// table doesn't match the image we're running, and none is recoverable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ZoneError {
    MissingImage(ZoneId),
    /// Two zones claim the same bytes.
    Overlap(ZoneId, ZoneId),
    ImageSizeMismatch {
        zone: ZoneId,
        expected: usize,
        found: usize,
    },
}

/// Something that can write zone memory.
pub trait ZoneMemory {
    fn zero(&mut self, region: Region);
    fn load(&mut self, region: Region, image: &[u8]);
}

/// Writes straight to the addresses in each region.
pub struct Direct {
    _private: (),
}

impl Direct {
    /// # Safety
    ///
    /// Every region later passed to this must be real, writable memory that
    /// nothing else is using yet. In practice that means this may only be
    /// used by startup code, on zones taken from the generated zone table.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl ZoneMemory for Direct {
    fn zero(&mut self, region: Region) {
        let base = region.base as *mut u8;
        for i in 0..region.len {
            // Safety: the caller of `Direct::new` vouched for the region.
            // Volatile, because nothing the compiler can see reads these
            // bytes before the next reset.
            unsafe { core::ptr::write_volatile(base.add(i), 0) };
        }
    }

    fn load(&mut self, region: Region, image: &[u8]) {
        let base = region.base as *mut u8;
        for (i, &b) in image.iter().take(region.len).enumerate() {
            // Safety: as above.
            unsafe { core::ptr::write_volatile(base.add(i), b) };
        }
    }
}

/// What [`apply_policies`] did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneReport {
    pub preserved: usize,
    pub zeroed: usize,
    pub reloaded: usize,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Trace {
    None,
    Cause(ResetCause),
    Applied(ZoneId, ZoneAction),
    Failed(ZoneError),
}

ringbuf!(ZONE_RINGBUF, Trace, 16, Trace::None);

/// Applies each zone's policy for `cause`, once per zone.
///
/// The whole table is checked before any zone is written (images located,
/// regions disjoint), so a bad table fails without having changed anything.
pub fn apply_policies<M: ZoneMemory + ?Sized>(
    zones: &[MemoryZone],
    cause: ResetCause,
    memory: &mut M,
) -> Result<ZoneReport, ZoneError> {
    ringbuf_entry!(ZONE_RINGBUF, Trace::Cause(cause));

    if let Err(e) = check_table(zones) {
        ringbuf_entry!(ZONE_RINGBUF, Trace::Failed(e));
        return Err(e);
    }

    let mut report = ZoneReport::default();
    for zone in zones {
        let action = zone.policy.action(cause);
        match action {
            ZoneAction::Preserve => report.preserved += 1,
            ZoneAction::Zero => {
                memory.zero(zone.region);
                report.zeroed += 1;
            }
            ZoneAction::Reload => {
                memory.load(zone.region, zone.locate_image()?);
                report.reloaded += 1;
            }
        }
        ringbuf_entry!(ZONE_RINGBUF, Trace::Applied(zone.id, action));
    }
    Ok(report)
}

fn check_table(zones: &[MemoryZone]) -> Result<(), ZoneError> {
    for (i, zone) in zones.iter().enumerate() {
        if zone.policy == RetentionPolicy::ReloadFromImage {
            zone.locate_image()?;
        }
        for other in &zones[i + 1..] {
            if zone.region.overlaps(&other.region) {
                return Err(ZoneError::Overlap(zone.id, other.id));
            }
        }
    }
    Ok(())
}

/// [`apply_policies`] for startup code: a zone table that doesn't match the
/// image halts the boot, since nothing downstream can be trusted with an
/// undefined zone. The error is left in the trace ring buffer.
pub fn apply_policies_or_halt<M: ZoneMemory + ?Sized>(
    zones: &[MemoryZone],
    cause: ResetCause,
    memory: &mut M,
) -> ZoneReport {
    match apply_policies(zones, cause, memory) {
        Ok(report) => report,
        Err(_) => panic!(),
    }
}
