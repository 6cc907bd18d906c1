//! Static hand pose classification.
//!
//! Several poses are structural subsets of others (a fist also "points" with
//! zero fingers, an OK sign is a loose pinch), so `classify` walks a fixed
//! priority list and returns the first match.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::config::Thresholds;
use crate::geometry::distance3d;
use crate::landmarks::{
    Hand, INDEX_MCP, INDEX_PIP, INDEX_TIP, MIDDLE_MCP, MIDDLE_PIP, MIDDLE_TIP, PINKY_MCP,
    PINKY_PIP, PINKY_TIP, RING_MCP, RING_PIP, RING_TIP, THUMB_IP, THUMB_MCP, THUMB_TIP,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gesture {
    ThumbUp,
    Fist,
    Pointing,
    Pinch,
    OpenPalm,
    Victory,
    OkSign,
    Rock,
    Unknown,
}

impl Gesture {
    pub const ALL: [Gesture; 9] = [
        Gesture::ThumbUp,
        Gesture::Fist,
        Gesture::Pointing,
        Gesture::Pinch,
        Gesture::OpenPalm,
        Gesture::Victory,
        Gesture::OkSign,
        Gesture::Rock,
        Gesture::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gesture::ThumbUp => "thumb_up",
            Gesture::Fist => "fist",
            Gesture::Pointing => "pointing",
            Gesture::Pinch => "pinch",
            Gesture::OpenPalm => "open_palm",
            Gesture::Victory => "victory",
            Gesture::OkSign => "ok_sign",
            Gesture::Rock => "rock",
            Gesture::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gesture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Gesture::ALL
            .into_iter()
            .find(|g| g.as_str() == key)
            .ok_or_else(|| format!("unknown gesture: {s}"))
    }
}

#[derive(Debug, Clone, Copy)]
struct Finger {
    tip: usize,
    pip: usize,
    mcp: usize,
}

const INDEX: Finger = Finger {
    tip: INDEX_TIP,
    pip: INDEX_PIP,
    mcp: INDEX_MCP,
};
const MIDDLE: Finger = Finger {
    tip: MIDDLE_TIP,
    pip: MIDDLE_PIP,
    mcp: MIDDLE_MCP,
};
const RING: Finger = Finger {
    tip: RING_TIP,
    pip: RING_PIP,
    mcp: RING_MCP,
};
const PINKY: Finger = Finger {
    tip: PINKY_TIP,
    pip: PINKY_PIP,
    mcp: PINKY_MCP,
};
const FINGERS: [Finger; 4] = [INDEX, MIDDLE, RING, PINKY];

/// Per-frame digit states, computed once and shared by every rule.
struct Digits {
    /// tip above PIP (image y grows downward)
    extended: [bool; 4],
    /// not extended, or tip folded onto its MCP in 3-D
    closed: [bool; 4],
    thumb_closed: bool,
}

impl Digits {
    fn read(hand: &Hand, th: &Thresholds) -> Self {
        let mut extended = [false; 4];
        let mut closed = [false; 4];
        for (i, f) in FINGERS.iter().enumerate() {
            extended[i] = hand.at(f.tip).y < hand.at(f.pip).y;
            // the y test alone misses fists facing the camera
            closed[i] = !extended[i]
                || distance3d(hand.at(f.tip), hand.at(f.mcp)) < th.finger_closed_distance;
        }
        let thumb_tip = hand.at(THUMB_TIP);
        let thumb_closed = thumb_tip.y >= hand.at(THUMB_IP).y
            || distance3d(thumb_tip, hand.at(INDEX_MCP)) < th.thumb_closed_distance;
        Self {
            extended,
            closed,
            thumb_closed,
        }
    }

    fn ext(&self, f: usize) -> bool {
        self.extended[f]
    }

    fn curled(&self, f: usize) -> bool {
        !self.extended[f]
    }
}

const I: usize = 0;
const M: usize = 1;
const R: usize = 2;
const P: usize = 3;

pub fn classify(hand: &Hand, th: &Thresholds) -> Gesture {
    let d = Digits::read(hand, th);
    let pinch_gap = distance3d(hand.at(THUMB_TIP), hand.at(INDEX_TIP));

    if is_thumb_up(hand, &d, th) {
        Gesture::ThumbUp
    } else if d.thumb_closed && d.closed.iter().all(|&c| c) {
        Gesture::Fist
    } else if d.ext(I) && d.curled(M) && d.curled(R) && d.curled(P) {
        Gesture::Pointing
    } else if pinch_gap < th.pinch_distance {
        Gesture::Pinch
    } else if d.extended.iter().all(|&e| e) {
        Gesture::OpenPalm
    } else if d.ext(I) && d.ext(M) && d.curled(R) && d.curled(P) {
        Gesture::Victory
    } else if pinch_gap < th.ok_distance && d.ext(M) && d.ext(R) && d.ext(P) {
        Gesture::OkSign
    } else if d.ext(I) && d.curled(M) && d.curled(R) && d.ext(P) {
        Gesture::Rock
    } else {
        Gesture::Unknown
    }
}

fn is_thumb_up(hand: &Hand, d: &Digits, th: &Thresholds) -> bool {
    let tip = hand.at(THUMB_TIP);
    if hand.at(THUMB_IP).y - tip.y < th.thumb_up_margin {
        return false;
    }
    if tip.y >= hand.at(THUMB_MCP).y {
        return false;
    }
    if FINGERS.iter().any(|f| hand.at(f.tip).y <= tip.y) {
        return false;
    }
    d.closed.iter().all(|&c| c)
}


#[cfg(test)]
mod tests {
    use super::test_hands::*;
    use super::*;

    fn th() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn test_fist() {
        assert_eq!(classify(&fist(), &th()), Gesture::Fist);
    }

    #[test]
    fn test_fist_facing_camera() {
        // y test says every digit is up; the distance check closes them
        let mut b = HandBuilder::new().thumb(Thumb::At(0.42, 0.65));
        for f in 0..4 {
            b = b.fold_toward_camera(f);
        }
        assert_eq!(classify(&b.build(), &th()), Gesture::Fist);
    }

    #[test]
    fn test_closed_hand_is_fist_for_any_thumb_fold() {
        for (x, y) in [(0.42, 0.70), (0.35, 0.68), (0.45, 0.75), (0.30, 0.66)] {
            let hand = HandBuilder::new().thumb(Thumb::At(x, y)).build();
            assert_eq!(
                classify(&hand, &th()),
                Gesture::Fist,
                "thumb tip at ({x}, {y})"
            );
        }
    }

    #[test]
    fn test_thumb_up() {
        let hand = HandBuilder::new().thumb(Thumb::Up).build();
        assert_eq!(classify(&hand, &th()), Gesture::ThumbUp);
    }

    #[test]
    fn test_thumb_up_beats_fist() {
        // a loose thumb threshold makes the raised thumb count as closed too
        let loose = Thresholds {
            thumb_closed_distance: 0.25,
            ..Thresholds::default()
        };
        let hand = HandBuilder::new().thumb(Thumb::Up).build();
        let d = Digits::read(&hand, &loose);
        assert!(d.thumb_closed && d.closed.iter().all(|&c| c));
        assert_eq!(classify(&hand, &loose), Gesture::ThumbUp);
    }

    #[test]
    fn test_thumb_up_needs_margin() {
        // tip barely above the IP joint
        let hand = HandBuilder::new().thumb(Thumb::At(0.28, 0.655)).build();
        assert_ne!(classify(&hand, &th()), Gesture::ThumbUp);
    }

    #[test]
    fn test_pointing() {
        assert_eq!(classify(&pointing(), &th()), Gesture::Pointing);
        let thumb_out = HandBuilder::new().extend(0).thumb(Thumb::Side).build();
        assert_eq!(classify(&thumb_out, &th()), Gesture::Pointing);
    }

    #[test]
    fn test_pinch() {
        let hand = HandBuilder::new()
            .extend(0)
            .extend(1)
            .extend(2)
            .extend(3)
            .thumb(Thumb::At(0.41, 0.36))
            .build();
        assert_eq!(classify(&hand, &th()), Gesture::Pinch);
    }

    #[test]
    fn test_open_palm() {
        assert_eq!(classify(&open_palm(), &th()), Gesture::OpenPalm);
    }

    #[test]
    fn test_victory() {
        assert_eq!(classify(&victory(), &th()), Gesture::Victory);
    }

    #[test]
    fn test_ok_sign() {
        let hand = HandBuilder::new()
            .extend(1)
            .extend(2)
            .extend(3)
            .index_tip(0.38, 0.52)
            .thumb(Thumb::At(0.415, 0.52))
            .build();
        assert_eq!(classify(&hand, &th()), Gesture::OkSign);
    }

    #[test]
    fn test_rock() {
        let hand = HandBuilder::new()
            .extend(0)
            .extend(3)
            .thumb(Thumb::Side)
            .build();
        assert_eq!(classify(&hand, &th()), Gesture::Rock);
    }

    #[test]
    fn test_unknown() {
        let hand = HandBuilder::new().extend(1).thumb(Thumb::Side).build();
        assert_eq!(classify(&hand, &th()), Gesture::Unknown);
    }

    #[test]
    fn test_gesture_names_round_trip() {
        for g in Gesture::ALL {
            assert_eq!(g.as_str().parse::<Gesture>(), Ok(g));
        }
        assert!("wave".parse::<Gesture>().is_err());
    }
}
