//! One control session: frame in, actions out.
//!
//! `SessionState` holds everything that survives between frames. The profile
//! is passed in on every call so a reload takes effect at the next frame.

use log::{debug, info};
use serde::Serialize;
use std::time::Duration;

use crate::actions::Action;
use crate::bindings::Binding;
use crate::config::Profile;
use crate::debounce::{ActionKind, Cooldowns, Debouncer};
use crate::geometry::curl;
use crate::gestures::classify;
use crate::landmarks::{FrameObservation, Hand, ObservationError};
use crate::motion::{MotionFilter, MotionParams};
use crate::toggle::detect_toggle;
use crate::tracker::{HandReading, resolve_role};

#[derive(Debug, Clone)]
pub struct SessionState {
    pub enabled: bool,
    pub debouncer: Debouncer,
    pub motion: MotionFilter,
}

impl SessionState {
    pub fn new(profile: &Profile) -> Self {
        Self {
            enabled: profile.tuning.start_enabled,
            debouncer: Debouncer::new(Cooldowns::from_tuning(&profile.tuning)),
            motion: MotionFilter::new(),
        }
    }

    /// Any change of state drops the pointer filter so control resumes
    /// from wherever the hand is, not from where it was.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.motion.reset();
        }
        self.enabled = enabled;
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameOutcome {
    pub readings: Vec<HandReading>,
    pub actions: Vec<Action>,
    /// new enabled state when this frame toggled control
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toggled: Option<bool>,
}

pub fn process_frame(
    state: &mut SessionState,
    profile: &Profile,
    obs: &FrameObservation,
    now: Duration,
) -> Result<FrameOutcome, ObservationError> {
    state
        .debouncer
        .set_cooldowns(Cooldowns::from_tuning(&profile.tuning));

    let mut hands: Vec<(usize, Hand)> = Vec::with_capacity(obs.hands.len());
    let mut malformed = Vec::new();
    for (i, detected) in obs.hands.iter().enumerate() {
        match Hand::from_detected(i, detected) {
            Ok(h) if h.confidence < profile.tuning.min_confidence => {
                debug!("hand {i}: confidence {:.2} below minimum", h.confidence);
            }
            Ok(h) => hands.push((i, h)),
            Err(e) => {
                debug!("dropping malformed hand: {e}");
                malformed.push(e);
            }
        }
    }
    if !obs.hands.is_empty() && malformed.len() == obs.hands.len() {
        state.motion.reset();
        return Err(malformed.swap_remove(0));
    }

    let readings: Vec<HandReading> = hands
        .iter()
        .map(|(slot, h)| HandReading {
            slot: *slot,
            role: resolve_role(h),
            gesture: classify(h, &profile.thresholds),
            wrist_x: h.wrist().x,
        })
        .collect();

    let mut out = FrameOutcome {
        readings,
        ..FrameOutcome::default()
    };

    if detect_toggle(
        &out.readings,
        profile.thresholds.toggle_separation,
        &mut state.debouncer,
        now,
    ) {
        let enabled = !state.enabled;
        state.set_enabled(enabled);
        info!("control {}", if enabled { "enabled" } else { "disabled" });
        out.toggled = Some(enabled);
        return Ok(out);
    }

    if !state.enabled {
        state.motion.reset();
        return Ok(out);
    }

    let params = MotionParams::from_profile(&profile.tuning, &profile.pointer);
    let mut pointer_driven = false;
    for ((_, hand), reading) in hands.iter().zip(out.readings.iter()) {
        match profile.table.get(reading.role, reading.gesture) {
            Binding::Move => {
                // first hand in detector order wins the pointer
                if pointer_driven {
                    continue;
                }
                pointer_driven = true;
                if let Some(a) = state.motion.update(hand.index_tip(), &params) {
                    out.actions.push(a);
                }
            }
            Binding::Click { button, count } => {
                if state.debouncer.try_fire(ActionKind::Click, now) {
                    out.actions.push(Action::Click {
                        button: *button,
                        count: *count,
                    });
                }
            }
            Binding::Hotkey(chord) => {
                if state.debouncer.try_fire(ActionKind::Click, now) {
                    out.actions.push(Action::Hotkey {
                        chord: chord.clone(),
                    });
                }
            }
            Binding::Scroll(direction) => {
                if state.debouncer.try_fire(ActionKind::Scroll, now) {
                    let openness = if profile.tuning.variable_scroll {
                        Some(1.0 - curl(hand, profile.thresholds.curl_band()))
                    } else {
                        None
                    };
                    out.actions.push(Action::Scroll {
                        amount: scroll_amount(profile.tuning.scroll_speed, openness),
                        direction: *direction,
                    });
                }
            }
            Binding::None => {}
        }
    }
    if !pointer_driven {
        state.motion.reset();
    }
    Ok(out)
}

/// `openness` in [0, 1] scales the step; at least one notch always scrolls.
pub fn scroll_amount(speed: i32, openness: Option<f32>) -> u32 {
    let speed = speed.max(1);
    match openness {
        None => speed as u32,
        Some(o) => ((speed as f32 * o.clamp(0.0, 1.0)).round() as u32).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{MouseButton, ScrollDirection};
    use crate::gestures::Gesture;
    use crate::gestures::test_hands::*;
    use crate::landmarks::{DetectedHand, HandLabel};
    use crate::tracker::Role;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn detected(h: &Hand) -> DetectedHand {
        DetectedHand {
            landmarks: h.landmarks.to_vec(),
            handedness: h.handedness,
            confidence: h.confidence,
        }
    }

    fn frame(hands: &[Hand]) -> FrameObservation {
        FrameObservation {
            t_ms: None,
            hands: hands.iter().map(detected).collect(),
        }
    }

    fn right_pointing_at(x: f32) -> Hand {
        HandBuilder::new()
            .extend(0)
            .index_tip(x, 0.35)
            .labelled(HandLabel::Right)
            .build()
    }

    fn fist_at(x: f32) -> Hand {
        HandBuilder::new().wrist_at(x).build()
    }

    #[test]
    fn test_right_pointing_drives_pointer() {
        let profile = Profile::default();
        let mut s = SessionState::new(&profile);
        let mut dxs = Vec::new();
        for i in 0..5u64 {
            let x = 0.50 + 0.025 * i as f32;
            let out = process_frame(&mut s, &profile, &frame(&[right_pointing_at(x)]), ms(i * 33))
                .expect("valid frame");
            assert_eq!(out.readings[0].role, Role::Right);
            assert_eq!(out.readings[0].gesture, Gesture::Pointing);
            for a in out.actions {
                match a {
                    Action::MoveRelative { dx, dy } => {
                        assert!(dx > 0, "dx={dx}");
                        assert_eq!(dy, 0);
                        dxs.push(dx);
                    }
                    other => panic!("unexpected action {other:?}"),
                }
            }
        }
        assert!(!dxs.is_empty());
        let total: i32 = dxs.iter().sum();
        // 0.1 of the frame width times sensitivity 3 is the ceiling
        assert!(total > 0 && total <= 576, "total dx {total}");
    }

    #[test]
    fn test_two_close_fists_never_toggle() {
        let profile = Profile::default();
        let mut s = SessionState::new(&profile);
        let hands = [fist_at(0.45), fist_at(0.55)];
        for i in 0..100u64 {
            let out = process_frame(&mut s, &profile, &frame(&hands), ms(i * 33)).unwrap();
            assert_eq!(out.toggled, None);
        }
        assert!(s.enabled);
    }

    #[test]
    fn test_two_wide_fists_toggle_once_per_cooldown() {
        let profile = Profile::default();
        let mut s = SessionState::new(&profile);
        let hands = [fist_at(0.25), fist_at(0.75)];
        let toggles: Vec<bool> = (0..30u64)
            .map(|i| process_frame(&mut s, &profile, &frame(&hands), ms(i * 33)).unwrap())
            .filter_map(|o| o.toggled)
            .collect();
        assert_eq!(toggles, vec![false]);
        assert!(!s.enabled);

        // after the cooldown the same pose turns control back on
        let out = process_frame(&mut s, &profile, &frame(&hands), ms(2000)).unwrap();
        assert_eq!(out.toggled, Some(true));
        assert!(s.enabled);
    }

    #[test]
    fn test_disabled_session_emits_nothing() {
        let profile = Profile::default();
        let mut s = SessionState::new(&profile);
        s.set_enabled(false);
        for i in 0..5u64 {
            let x = 0.5 + 0.05 * i as f32;
            let out = process_frame(&mut s, &profile, &frame(&[right_pointing_at(x)]), ms(i * 33))
                .unwrap();
            assert!(out.actions.is_empty());
            assert_eq!(out.readings.len(), 1);
        }
        assert!(!s.motion.is_initialized());
    }

    #[test]
    fn test_left_pointing_clicks_with_cooldown() {
        let profile = Profile::default();
        let mut s = SessionState::new(&profile);
        let left = HandBuilder::new()
            .extend(0)
            .labelled(HandLabel::Left)
            .build();
        let clicks = (0..20u64)
            .map(|i| process_frame(&mut s, &profile, &frame(&[left.clone()]), ms(i * 100)).unwrap())
            .filter(|o| {
                o.actions
                    == vec![Action::Click {
                        button: MouseButton::Left,
                        count: 1,
                    }]
            })
            .count();
        // fires at 0, 600, 1200, 1800 ms
        assert_eq!(clicks, 4);
    }

    #[test]
    fn test_right_open_palm_scrolls_down() {
        let profile = Profile::default();
        let mut s = SessionState::new(&profile);
        let palm = Hand {
            handedness: Some(HandLabel::Right),
            ..open_palm()
        };
        let out = process_frame(&mut s, &profile, &frame(&[palm]), ms(0)).unwrap();
        assert_eq!(
            out.actions,
            vec![Action::Scroll {
                amount: 12,
                direction: ScrollDirection::Down
            }]
        );
    }

    #[test]
    fn test_variable_scroll_follows_openness() {
        let mut profile = Profile::default();
        profile.tuning.variable_scroll = true;
        let mut s = SessionState::new(&profile);
        // tips 0.14 from their knuckles: still extended, curl 0.4
        let mut b = HandBuilder::new()
            .extend(0)
            .extend(1)
            .extend(2)
            .extend(3)
            .thumb(Thumb::Side)
            .labelled(HandLabel::Right);
        for tip in [8, 12, 16, 20] {
            b.landmarks[tip].y = 0.46;
        }
        let out = process_frame(&mut s, &profile, &frame(&[b.build()]), ms(0)).unwrap();
        assert_eq!(out.readings[0].gesture, Gesture::OpenPalm);
        assert_eq!(
            out.actions,
            vec![Action::Scroll {
                amount: 7,
                direction: ScrollDirection::Down
            }]
        );
    }

    #[test]
    fn test_hotkey_shares_click_cooldown() {
        let profile = Profile::default();
        let mut s = SessionState::new(&profile);
        let right_victory = Hand {
            handedness: Some(HandLabel::Right),
            ..victory()
        };
        let left_pointing = HandBuilder::new()
            .extend(0)
            .labelled(HandLabel::Left)
            .build();
        let hotkey = vec![Action::Hotkey {
            chord: "SUPER+TAB".into(),
        }];
        let click = vec![Action::Click {
            button: MouseButton::Left,
            count: 1,
        }];

        let out = process_frame(&mut s, &profile, &frame(&[right_victory.clone()]), ms(0)).unwrap();
        assert_eq!(out.readings[0].gesture, Gesture::Victory);
        assert_eq!(out.actions, hotkey);
        let out = process_frame(&mut s, &profile, &frame(&[right_victory]), ms(100)).unwrap();
        assert!(out.actions.is_empty());
        // the hotkey spent the click cooldown
        let out = process_frame(&mut s, &profile, &frame(&[left_pointing.clone()]), ms(200)).unwrap();
        assert!(out.actions.is_empty());
        let out = process_frame(&mut s, &profile, &frame(&[left_pointing]), ms(700)).unwrap();
        assert_eq!(out.actions, click);
    }

    #[test]
    fn test_negative_cooldown_means_no_cooldown() {
        let mut profile = Profile::default();
        profile.tuning.click_cooldown = -0.5;
        let mut s = SessionState::new(&profile);
        let left = HandBuilder::new()
            .extend(0)
            .labelled(HandLabel::Left)
            .build();
        for i in 0..3u64 {
            let out = process_frame(&mut s, &profile, &frame(&[left.clone()]), ms(i * 33)).unwrap();
            assert_eq!(out.actions.len(), 1, "frame {i}");
        }
    }

    #[test]
    fn test_first_pointer_hand_wins() {
        let profile = Profile::default();
        let mut s = SessionState::new(&profile);
        process_frame(
            &mut s,
            &profile,
            &frame(&[right_pointing_at(0.5), right_pointing_at(0.5)]),
            ms(0),
        )
        .unwrap();
        let out = process_frame(
            &mut s,
            &profile,
            &frame(&[right_pointing_at(0.55), right_pointing_at(0.45)]),
            ms(33),
        )
        .unwrap();
        match out.actions.as_slice() {
            [Action::MoveRelative { dx, .. }] => assert!(*dx > 0, "dx={dx}"),
            other => panic!("expected one move, got {other:?}"),
        }
    }

    #[test]
    fn test_losing_the_pointer_hand_resets_motion() {
        let profile = Profile::default();
        let mut s = SessionState::new(&profile);
        process_frame(&mut s, &profile, &frame(&[right_pointing_at(0.5)]), ms(0)).unwrap();
        assert!(s.motion.is_initialized());
        process_frame(&mut s, &profile, &frame(&[]), ms(33)).unwrap();
        assert!(!s.motion.is_initialized());
        // the jump back in only reseeds
        let out =
            process_frame(&mut s, &profile, &frame(&[right_pointing_at(0.9)]), ms(66)).unwrap();
        assert!(out.actions.is_empty());
    }

    #[test]
    fn test_all_malformed_is_error() {
        let profile = Profile::default();
        let mut s = SessionState::new(&profile);
        process_frame(&mut s, &profile, &frame(&[right_pointing_at(0.5)]), ms(0)).unwrap();

        let mut obs = frame(&[right_pointing_at(0.5)]);
        obs.hands[0].landmarks.truncate(20);
        let err = process_frame(&mut s, &profile, &obs, ms(33)).unwrap_err();
        assert_eq!(err, ObservationError::TooFewLandmarks { index: 0, found: 20 });
        assert!(!s.motion.is_initialized());
    }

    #[test]
    fn test_malformed_hand_is_skipped() {
        let profile = Profile::default();
        let mut s = SessionState::new(&profile);
        let mut obs = frame(&[fist(), right_pointing_at(0.5)]);
        obs.hands[0].landmarks[3].x = f32::NAN;
        let out = process_frame(&mut s, &profile, &obs, ms(0)).unwrap();
        assert_eq!(out.readings.len(), 1);
        assert_eq!(out.readings[0].slot, 1);
        assert_eq!(out.readings[0].gesture, Gesture::Pointing);
    }

    #[test]
    fn test_low_confidence_hands_are_ignored() {
        let mut profile = Profile::default();
        profile.tuning.min_confidence = 0.5;
        let mut s = SessionState::new(&profile);
        let mut obs = frame(&[right_pointing_at(0.5)]);
        obs.hands[0].confidence = 0.3;
        let out = process_frame(&mut s, &profile, &obs, ms(0)).unwrap();
        assert!(out.readings.is_empty());
        assert!(!s.motion.is_initialized());
    }

    #[test]
    fn test_scroll_amount() {
        assert_eq!(scroll_amount(12, None), 12);
        assert_eq!(scroll_amount(12, Some(0.5)), 6);
        assert_eq!(scroll_amount(12, Some(0.0)), 1);
        assert_eq!(scroll_amount(0, None), 1);
    }
}
