//! Fingertip → pointer filtering.
//!
//! Two modes share one state machine: `Relative` smooths per-frame deltas and
//! emits `MoveRelative`; `Absolute` smooths a projected screen position and
//! emits `MoveAbsolute`. Either way the first observation after a reset only
//! seeds the state.

use crate::actions::Action;
use crate::config::{Pointer, PointerMode, Tuning};
use crate::landmarks::Landmark;

/// Everything the filter reads from the profile, flattened once per frame.
#[derive(Debug, Clone, Copy)]
pub struct MotionParams {
    pub mode: PointerMode,
    /// 0 = raw, towards 1 = heavier smoothing and more lag
    pub smoothing: f32,
    pub sensitivity: f32,
    /// normalized |dx| + |dy| below which relative motion is dropped
    pub movement_threshold: f32,
    pub screen_w: f32,
    pub screen_h: f32,
    pub mirror_x: bool,
    pub jitter_px: f32,
    pub stationary_px: f32,
}

impl MotionParams {
    pub fn from_profile(tuning: &Tuning, pointer: &Pointer) -> Self {
        Self {
            mode: pointer.mode,
            smoothing: tuning.smoothing,
            sensitivity: tuning.sensitivity,
            movement_threshold: tuning.movement_threshold,
            screen_w: pointer.screen_width as f32,
            screen_h: pointer.screen_height as f32,
            mirror_x: pointer.mirror_x,
            jitter_px: pointer.jitter_px,
            stationary_px: pointer.stationary_px,
        }
    }
}

impl Default for MotionParams {
    fn default() -> Self {
        Self::from_profile(&Tuning::default(), &Pointer::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MotionState {
    Uninit,
    Relative {
        last: (f32, f32),
        smoothed: (f32, f32),
    },
    Absolute {
        last_raw: (f32, f32),
        filtered: (f32, f32),
        emitted: (f32, f32),
    },
}

#[derive(Debug, Clone)]
pub struct MotionFilter {
    state: MotionState,
}

impl Default for MotionFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionFilter {
    pub fn new() -> Self {
        Self {
            state: MotionState::Uninit,
        }
    }

    pub fn reset(&mut self) {
        self.state = MotionState::Uninit;
    }

    #[cfg(test)]
    pub fn is_initialized(&self) -> bool {
        self.state != MotionState::Uninit
    }

    /// Current smoothed screen position (absolute mode only).
    #[cfg(test)]
    pub fn filtered_position(&self) -> Option<(f32, f32)> {
        match self.state {
            MotionState::Absolute { filtered, .. } => Some(filtered),
            _ => None,
        }
    }

    pub fn update(&mut self, tip: &Landmark, p: &MotionParams) -> Option<Action> {
        let x = if p.mirror_x { 1.0 - tip.x } else { tip.x };
        let y = tip.y;
        match p.mode {
            PointerMode::Relative => self.update_relative((x, y), p),
            PointerMode::Absolute => self.update_absolute((x, y), p),
        }
    }

    fn update_relative(&mut self, pos: (f32, f32), p: &MotionParams) -> Option<Action> {
        let MotionState::Relative { last, smoothed } = &mut self.state else {
            // also covers a mode switch mid-session
            self.state = MotionState::Relative {
                last: pos,
                smoothed: (0.0, 0.0),
            };
            return None;
        };

        let s = p.smoothing;
        let dx = pos.0 - last.0;
        let dy = pos.1 - last.1;
        smoothed.0 = smoothed.0 * s + dx * (1.0 - s);
        smoothed.1 = smoothed.1 * s + dy * (1.0 - s);
        *last = pos;

        if smoothed.0.abs() + smoothed.1.abs() > p.movement_threshold {
            let dx = (smoothed.0 * p.screen_w * p.sensitivity) as i32;
            let dy = (smoothed.1 * p.screen_h * p.sensitivity) as i32;
            if dx != 0 || dy != 0 {
                return Some(Action::MoveRelative { dx, dy });
            }
        } else {
            // drop the residue so a still hand cannot drift the cursor
            *smoothed = (0.0, 0.0);
        }
        None
    }

    fn update_absolute(&mut self, pos: (f32, f32), p: &MotionParams) -> Option<Action> {
        let raw = (
            (pos.0 * p.screen_w).clamp(0.0, (p.screen_w - 1.0).max(0.0)),
            (pos.1 * p.screen_h).clamp(0.0, (p.screen_h - 1.0).max(0.0)),
        );
        let MotionState::Absolute {
            last_raw,
            filtered,
            emitted,
        } = &mut self.state
        else {
            self.state = MotionState::Absolute {
                last_raw: raw,
                filtered: raw,
                emitted: raw,
            };
            return None;
        };

        let raw_step = (raw.0 - last_raw.0).abs().max((raw.1 - last_raw.1).abs());
        *last_raw = raw;
        let gap = (raw.0 - filtered.0).abs().max((raw.1 - filtered.1).abs());

        // stationary lock: hand still and filter already caught up
        if raw_step < p.stationary_px && gap <= p.jitter_px {
            return None;
        }

        let s = p.smoothing;
        filtered.0 = filtered.0 * s + raw.0 * (1.0 - s);
        filtered.1 = filtered.1 * s + raw.1 * (1.0 - s);

        let moved = (filtered.0 - emitted.0).abs() > p.jitter_px
            || (filtered.1 - emitted.1).abs() > p.jitter_px;
        if !moved {
            return None;
        }
        *emitted = *filtered;
        Some(Action::MoveAbsolute {
            x: filtered.0.round() as i32,
            y: filtered.1.round() as i32,
        })
    }
}
