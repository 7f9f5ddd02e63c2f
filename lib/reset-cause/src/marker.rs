// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// One-shot note left by a pre-reset handler, telling the next boot why the
/// software restart it is about to see really happened.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum PreResetMarker {
    None = 0,
    FatalException = 1,
    TaskWatchdogExpired = 2,
    InterruptWatchdogExpired = 3,
    /// Written by the brownout detector's interrupt handler, which restarts
    /// through the software path.
    BrownoutDetected = 4,
}

/// A marker register held a word that isn't a well-formed marker.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MarkerCorrupt(pub u32);

/// The always-powered scratch register holding the marker across a reset.
pub trait MarkerRegister {
    fn read(&self) -> u32;
    fn write(&mut self, value: u32);
}

// The tag is stored twice, with a valid bit on top. A register that was
// scribbled on, or left over from a partially applied write, fails either the
// valid bit or the mirror comparison.
bitfield::bitfield! {
    #[derive(Copy, Clone)]
    struct MarkerWord(u32);
    u16, tag, set_tag: 14, 0;
    reserved, _: 15;
    u16, mirror, set_mirror: 30, 16;
    valid, set_valid: 31;
}

impl PreResetMarker {
    /// The word to store in the marker register. `None` is stored as zero,
    /// which is also what the register reads after a cold boot.
    pub fn encode(self) -> u32 {
        if self == PreResetMarker::None {
            return 0;
        }
        let mut word = MarkerWord(0);
        word.set_tag(self as u16);
        word.set_mirror(self as u16);
        word.set_valid(true);
        word.0
    }

    pub fn decode(raw: u32) -> Result<Self, MarkerCorrupt> {
        if raw == 0 {
            return Ok(PreResetMarker::None);
        }
        let word = MarkerWord(raw);
        if !word.valid() || word.reserved() || word.tag() != word.mirror() {
            return Err(MarkerCorrupt(raw));
        }
        PreResetMarker::from_u16(word.tag()).ok_or(MarkerCorrupt(raw))
    }
}

/// Stores `marker` for the next boot to find.
///
/// Pre-reset handlers must do this and the reset itself without being
/// interrupted; [`crate::restart`] does both inside a critical section.
pub fn arm<M: MarkerRegister + ?Sized>(reg: &mut M, marker: PreResetMarker) {
    reg.write(marker.encode());
}

/// Reads and clears the marker. Anything malformed reads as
/// [`PreResetMarker::None`].
pub fn take<M: MarkerRegister + ?Sized>(reg: &mut M) -> PreResetMarker {
    let raw = reg.read();
    if raw != 0 {
        reg.write(0);
    }
    PreResetMarker::decode(raw).unwrap_or(PreResetMarker::None)
}
