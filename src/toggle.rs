//! Two fists held wide apart flip control on or off.

use std::time::Duration;

use crate::debounce::{ActionKind, Debouncer};
use crate::gestures::Gesture;
use crate::tracker::HandReading;

/// Exactly two hands, both fists, wrists more than `separation` apart.
pub fn is_toggle_pose(readings: &[HandReading], separation: f32) -> bool {
    match readings {
        [a, b] => {
            a.gesture == Gesture::Fist
                && b.gesture == Gesture::Fist
                && (a.wrist_x - b.wrist_x).abs() > separation
        }
        _ => false,
    }
}

/// True when the pose is held and the toggle cooldown allows a flip.
pub fn detect_toggle(
    readings: &[HandReading],
    separation: f32,
    debouncer: &mut Debouncer,
    now: Duration,
) -> bool {
    is_toggle_pose(readings, separation) && debouncer.try_fire(ActionKind::Toggle, now)
}
