//! Per-frame hand role resolution and frame readings.
//!
//! The detector keeps no identity between frames, so "the same hand as last
//! frame" is only ever rebuilt from role. Two hands can land on the same role;
//! callers decide what to do with that.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::gestures::Gesture;
use crate::landmarks::{Hand, HandLabel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Left,
    Right,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Left => "left",
            Role::Right => "right",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Role::Left),
            "right" => Ok(Role::Right),
            other => Err(format!("unknown hand role: {other}")),
        }
    }
}

/// Detector label when it names a side, else wrist position in the
/// unmirrored frame (left half → Left).
pub fn resolve_role(hand: &Hand) -> Role {
    match hand.handedness {
        Some(HandLabel::Left) => Role::Left,
        Some(HandLabel::Right) => Role::Right,
        Some(HandLabel::Unknown) | None => {
            if hand.wrist().x < 0.5 {
                Role::Left
            } else {
                Role::Right
            }
        }
    }
}

/// What one hand looked like this frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HandReading {
    /// Position of the hand in the detector's list.
    pub slot: usize,
    pub role: Role,
    pub gesture: Gesture,
    pub wrist_x: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LANDMARK_COUNT, Landmark};

    fn hand_at(wrist_x: f32, handedness: Option<HandLabel>) -> Hand {
        let mut landmarks = [Landmark::flat(wrist_x, 0.5); LANDMARK_COUNT];
        landmarks[0] = Landmark::flat(wrist_x, 0.9);
        Hand {
            landmarks,
            handedness,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_label_wins_over_position() {
        assert_eq!(resolve_role(&hand_at(0.9, Some(HandLabel::Left))), Role::Left);
        assert_eq!(resolve_role(&hand_at(0.1, Some(HandLabel::Right))), Role::Right);
    }

    #[test]
    fn test_positional_fallback() {
        assert_eq!(resolve_role(&hand_at(0.2, None)), Role::Left);
        assert_eq!(resolve_role(&hand_at(0.7, Some(HandLabel::Unknown))), Role::Right);
        // the midline itself belongs to the right hand
        assert_eq!(resolve_role(&hand_at(0.5, None)), Role::Right);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Left".parse::<Role>(), Ok(Role::Left));
        assert_eq!(" right ".parse::<Role>(), Ok(Role::Right));
        assert!("both".parse::<Role>().is_err());
    }
}
