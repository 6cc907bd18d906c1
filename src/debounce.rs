//! Cooldown gates for discrete actions.
//!
//! A pose held across many frames is re-detected on every one of them; the
//! classifier has no memory, so this is the only thing that turns "pose held"
//! into "fire at most once per cooldown".

use serde::Serialize;
use std::time::Duration;

use crate::config::Tuning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// mouse buttons and hotkeys
    Click,
    Scroll,
    Toggle,
}

impl ActionKind {
    fn slot(self) -> usize {
        match self {
            ActionKind::Click => 0,
            ActionKind::Scroll => 1,
            ActionKind::Toggle => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cooldowns {
    pub click: Duration,
    pub scroll: Duration,
    pub toggle: Duration,
}

impl Cooldowns {
    pub fn from_tuning(t: &Tuning) -> Self {
        Self {
            click: seconds(t.click_cooldown),
            scroll: seconds(t.scroll_cooldown),
            toggle: seconds(t.toggle_cooldown),
        }
    }

    fn get(&self, kind: ActionKind) -> Duration {
        match kind {
            ActionKind::Click => self.click,
            ActionKind::Scroll => self.scroll,
            ActionKind::Toggle => self.toggle,
        }
    }
}

/// Negative or NaN seconds mean no cooldown; overflow saturates.
fn seconds(secs: f32) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f32(secs).unwrap_or(Duration::MAX)
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self::from_tuning(&Tuning::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Debouncer {
    cooldowns: Cooldowns,
    last_fired: [Option<Duration>; 3],
}

impl Debouncer {
    pub fn new(cooldowns: Cooldowns) -> Self {
        Self {
            cooldowns,
            last_fired: [None; 3],
        }
    }

    /// Takes effect on the next `try_fire`; fire history is kept.
    pub fn set_cooldowns(&mut self, cooldowns: Cooldowns) {
        self.cooldowns = cooldowns;
    }

    /// `now` is time since session start. Records `now` and returns true only
    /// if more than the kind's cooldown has passed since it last fired.
    pub fn try_fire(&mut self, kind: ActionKind, now: Duration) -> bool {
        let slot = &mut self.last_fired[kind.slot()];
        let ready = match *slot {
            None => true,
            Some(last) => now.saturating_sub(last) > self.cooldowns.get(kind),
        };
        if ready {
            *slot = Some(now);
        }
        ready
    }

    pub fn reset(&mut self) {
        self.last_fired = [None; 3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn debouncer(click_ms: u64) -> Debouncer {
        Debouncer::new(Cooldowns {
            click: ms(click_ms),
            scroll: ms(100),
            toggle: ms(1000),
        })
    }

    #[test]
    fn test_first_fire_passes() {
        let mut d = debouncer(500);
        assert!(d.try_fire(ActionKind::Click, ms(0)));
    }

    #[test]
    fn test_blocked_inside_cooldown() {
        let mut d = debouncer(500);
        assert!(d.try_fire(ActionKind::Click, ms(1000)));
        assert!(!d.try_fire(ActionKind::Click, ms(1200)));
        // exactly at the boundary is still blocked (strictly greater)
        assert!(!d.try_fire(ActionKind::Click, ms(1500)));
        assert!(d.try_fire(ActionKind::Click, ms(1501)));
    }

    #[test]
    fn test_rejected_attempt_does_not_restart_cooldown() {
        let mut d = debouncer(500);
        assert!(d.try_fire(ActionKind::Click, ms(0)));
        assert!(!d.try_fire(ActionKind::Click, ms(400)));
        assert!(d.try_fire(ActionKind::Click, ms(501)));
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut d = debouncer(500);
        assert!(d.try_fire(ActionKind::Click, ms(0)));
        assert!(d.try_fire(ActionKind::Scroll, ms(10)));
        assert!(d.try_fire(ActionKind::Toggle, ms(20)));
        assert!(d.try_fire(ActionKind::Scroll, ms(120)));
        assert!(!d.try_fire(ActionKind::Click, ms(120)));
    }

    #[test]
    fn test_sustained_pose_fire_count() {
        for (cooldown, dt, frames) in [(500u64, 33u64, 100u64), (100, 30, 20), (250, 40, 60), (1000, 33, 70)] {
            let mut d = debouncer(cooldown);
            let fired = (0..frames)
                .filter(|i| d.try_fire(ActionKind::Click, ms(i * dt)))
                .count() as i64;
            let expected = ((frames * dt) / cooldown) as i64;
            assert!(
                (fired - expected).abs() <= 1,
                "cooldown={cooldown} dt={dt} n={frames}: fired {fired}, expected {expected}±1"
            );
        }
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut d = debouncer(500);
        assert!(d.try_fire(ActionKind::Click, ms(0)));
        d.reset();
        assert!(d.try_fire(ActionKind::Click, ms(10)));
    }

    #[test]
    fn test_unsanitized_cooldowns_do_not_panic() {
        let t = Tuning {
            click_cooldown: -0.5,
            scroll_cooldown: f32::NAN,
            toggle_cooldown: f32::INFINITY,
            ..Tuning::default()
        };
        let c = Cooldowns::from_tuning(&t);
        assert_eq!(c.click, Duration::ZERO);
        assert_eq!(c.scroll, Duration::ZERO);
        assert_eq!(c.toggle, Duration::MAX);
    }

    #[test]
    fn test_cooldown_update_applies_immediately() {
        let mut d = debouncer(500);
        assert!(d.try_fire(ActionKind::Click, ms(0)));
        d.set_cooldowns(Cooldowns {
            click: ms(50),
            scroll: ms(100),
            toggle: ms(1000),
        });
        assert!(d.try_fire(ActionKind::Click, ms(60)));
    }
}
