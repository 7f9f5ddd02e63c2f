// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::marker::{arm, MarkerRegister, PreResetMarker};
use crate::CoreId;
use core::convert::Infallible;

/// A request, from some core, to restart the whole system.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RestartIntent {
    pub origin: CoreId,
    pub marker: PreResetMarker,
}

impl RestartIntent {
    /// A restart somebody asked for on purpose.
    pub const fn deliberate(origin: CoreId) -> Self {
        Self {
            origin,
            marker: PreResetMarker::None,
        }
    }

    /// A restart forced by a handler that wants the next boot to know why.
    pub const fn after(marker: PreResetMarker, origin: CoreId) -> Self {
        Self { origin, marker }
    }
}

/// The platform's restart primitive.
pub trait SystemReset: MarkerRegister {
    /// Resets every core. Whichever core `intent.origin` names, the
    /// authoritative core must come back up having latched the generic
    /// software reset code.
    fn system_reset(&mut self, intent: RestartIntent) -> !;
}

/// Leaves `intent.marker` for the next boot and restarts the system.
///
/// The marker write and the reset happen inside one critical section, so an
/// interrupt can't land between them and the next boot never sees a half
/// written marker paired with a reset it didn't describe.
pub fn restart<P: SystemReset + ?Sized>(
    platform: &mut P,
    intent: RestartIntent,
) -> ! {
    let never: Infallible = critical_section::with(|_| {
        arm(platform, intent.marker);
        platform.system_reset(intent)
    });
    match never {}
}
