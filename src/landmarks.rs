//! Hand skeleton data model as delivered by the landmark detector.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_TIP: usize = 20;

/// A normalized keypoint. x/y are fractions of frame width/height (y grows
/// downward); z is relative depth and only meaningful for distances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub const fn flat(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

// detectors disagree on the shape: [x, y], [x, y, z] or {x, y, z?}
impl<'de> Deserialize<'de> for Landmark {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Seq(Vec<f32>),
            Map {
                x: f32,
                y: f32,
                #[serde(default)]
                z: f32,
            },
        }

        match Repr::deserialize(de)? {
            Repr::Map { x, y, z } => Ok(Landmark { x, y, z }),
            Repr::Seq(v) => match v.as_slice() {
                [x, y] => Ok(Landmark::flat(*x, *y)),
                [x, y, z] => Ok(Landmark::new(*x, *y, *z)),
                other => Err(serde::de::Error::custom(format!(
                    "landmark must have 2 or 3 coordinates, got {}",
                    other.len()
                ))),
            },
        }
    }
}

/// Handedness as reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandLabel {
    Left,
    Right,
    Unknown,
}

impl HandLabel {
    /// Case-insensitive substring match on a detector category name.
    pub fn from_category(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("left") {
            HandLabel::Left
        } else if lower.contains("right") {
            HandLabel::Right
        } else {
            HandLabel::Unknown
        }
    }
}

impl<'de> Deserialize<'de> for HandLabel {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(de)?;
        Ok(HandLabel::from_category(&s))
    }
}

/// One hand as it arrives on the wire, not yet validated.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectedHand {
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub handedness: Option<HandLabel>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

/// All hands seen in a single capture tick.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameObservation {
    #[serde(default)]
    pub t_ms: Option<u64>,
    #[serde(default)]
    pub hands: Vec<DetectedHand>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObservationError {
    #[error("hand {index}: expected 21 landmarks, got {found}")]
    TooFewLandmarks { index: usize, found: usize },
    #[error("hand {index}: landmark {landmark} has a non-finite coordinate")]
    NonFinite { index: usize, landmark: usize },
}

/// A validated hand: exactly 21 finite landmarks.
#[derive(Debug, Clone)]
pub struct Hand {
    pub landmarks: [Landmark; LANDMARK_COUNT],
    pub handedness: Option<HandLabel>,
    pub confidence: f32,
}

impl Hand {
    /// `index` is the hand's position in the frame, used for error reporting.
    pub fn from_detected(index: usize, d: &DetectedHand) -> Result<Self, ObservationError> {
        let landmarks: [Landmark; LANDMARK_COUNT] = match d.landmarks.get(..LANDMARK_COUNT) {
            Some(head) => {
                let mut out = [Landmark::default(); LANDMARK_COUNT];
                out.copy_from_slice(head);
                out
            }
            None => {
                return Err(ObservationError::TooFewLandmarks {
                    index,
                    found: d.landmarks.len(),
                });
            }
        };
        if let Some(landmark) = landmarks.iter().position(|p| !p.is_finite()) {
            return Err(ObservationError::NonFinite { index, landmark });
        }
        Ok(Self {
            landmarks,
            handedness: d.handedness,
            confidence: d.confidence,
        })
    }

    #[inline]
    pub fn at(&self, idx: usize) -> &Landmark {
        &self.landmarks[idx]
    }

    pub fn wrist(&self) -> &Landmark {
        self.at(WRIST)
    }

    pub fn index_tip(&self) -> &Landmark {
        self.at(INDEX_TIP)
    }
}
