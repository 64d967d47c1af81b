use serde::Serialize;

use crate::config::ScreenTarget;

/// Tracked volume after a fresh install.
pub const DEFAULT_VOLUME: f64 = 0.3;

pub const VOLUME_MIN: f64 = 0.0;
pub const VOLUME_MAX: f64 = 1.0;

/// Projector screen position.
///
/// `Opening` and `Closing` only exist while the travel timer runs (or after a
/// stop, when the real resting place is unknown).
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScreenPosition {
    #[default]
    Up,
    Down,
    Opening,
    Closing,
}

impl ScreenPosition {
    pub fn is_moving(self) -> bool {
        matches!(self, ScreenPosition::Opening | ScreenPosition::Closing)
    }
}

impl From<ScreenTarget> for ScreenPosition {
    fn from(target: ScreenTarget) -> Self {
        match target {
            ScreenTarget::Up => ScreenPosition::Up,
            ScreenTarget::Down => ScreenPosition::Down,
        }
    }
}

/// The assumed state of the whole theater.
///
/// Everything here reflects commands sent, never device feedback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TheaterState {
    pub amp_power: bool,
    pub volume: f64,
    pub muted: bool,
    pub source: Option<String>,
    pub screen_position: ScreenPosition,
    pub active_scene: Option<String>,
}

impl Default for TheaterState {
    fn default() -> Self {
        Self {
            amp_power: false,
            volume: DEFAULT_VOLUME,
            muted: false,
            source: None,
            screen_position: ScreenPosition::Up,
            active_scene: None,
        }
    }
}

/// Round to 4 decimal places so repeated steps don't accumulate drift.
pub fn round_volume(volume: f64) -> f64 {
    (volume * 10_000.0).round() / 10_000.0
}

/// Round then clamp into `[0, 1]`. Non-finite input maps to silence.
pub fn clamp_volume(volume: f64) -> f64 {
    if volume.is_nan() {
        return VOLUME_MIN;
    }
    round_volume(volume).clamp(VOLUME_MIN, VOLUME_MAX)
}

/// One press up from `volume`.
pub fn step_up(volume: f64, step: f64) -> f64 {
    round_volume(volume + step).min(VOLUME_MAX)
}

/// One press down from `volume`.
pub fn step_down(volume: f64, step: f64) -> f64 {
    round_volume(volume - step).max(VOLUME_MIN)
}

/// Number of whole presses needed to walk from `current` to `target`.
///
/// The quotient is nudged by a tiny epsilon so that float noise such as
/// `0.2 / 0.02 = 9.999999999999998` still yields 10 presses.
pub fn steps_between(current: f64, target: f64, step: f64) -> u32 {
    if step <= 0.0 {
        return 0;
    }
    ((target - current).abs() / step + 1e-9).floor() as u32
}

/// How `set_volume_level` gets from the tracked volume to a requested level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeRamp {
    /// Rounded, clamped level the tracked volume is snapped to at the end
    pub target: f64,
    /// Whole IR presses to send
    pub presses: u32,
    pub up: bool,
}

impl VolumeRamp {
    pub fn plan(current: f64, level: f64, step: f64) -> Self {
        let target = clamp_volume(level);
        Self {
            target,
            presses: steps_between(current, target, step),
            up: target > current,
        }
    }

    /// Tracked volume after every press has been applied, before the snap.
    pub fn after_presses(&self, current: f64, step: f64) -> f64 {
        (0..self.presses).fold(current, |volume, _| {
            if self.up {
                step_up(volume, step)
            } else {
                step_down(volume, step)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;

    use super::*;

    /// Worst-case error one press can add by rounding to 4 decimal places.
    const ROUNDING: f64 = 5e-5 + 1e-12;

    prop_compose! {
        /// A tracked volume as it would be persisted: already rounded.
        fn arb_volume()(n in 0u32..=10_000) -> f64 {
            f64::from(n) / 10_000.0
        }
    }

    #[test]
    fn test_default_state() {
        let state = TheaterState::default();
        assert!(!state.amp_power);
        assert_eq!(state.volume, 0.3);
        assert_eq!(state.screen_position, ScreenPosition::Up);
        assert_eq!(state.active_scene, None);
    }

    #[test]
    fn test_step_stays_in_range() {
        let step = 0.02;
        let mut volume = 0.97;
        volume = step_up(volume, step);
        assert_eq!(volume, 0.99);
        volume = step_up(volume, step);
        assert_eq!(volume, 1.0);
        volume = step_up(volume, step);
        assert_eq!(volume, 1.0);

        let mut volume = 0.03;
        volume = step_down(volume, step);
        assert_eq!(volume, 0.01);
        volume = step_down(volume, step);
        assert_eq!(volume, 0.0);
    }

    #[test]
    fn test_repeated_steps_stay_quantized() {
        let step = 1.0 / 3.0;
        let mut volume = 0.0;
        for i in 0..20 {
            volume = if i % 7 < 4 {
                step_up(volume, step)
            } else {
                step_down(volume, step)
            };
            assert!((VOLUME_MIN..=VOLUME_MAX).contains(&volume));
            assert_eq!(volume, round_volume(volume));
        }

        let mut volume = 0.3;
        for _ in 0..10 {
            volume = step_up(volume, 0.02);
        }
        assert_eq!(volume, 0.5);
    }

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(-0.5), 0.0);
        assert_eq!(clamp_volume(1.7), 1.0);
        assert_eq!(clamp_volume(0.123456), 0.1235);
        assert_eq!(clamp_volume(f64::NAN), 0.0);
        assert_eq!(clamp_volume(f64::INFINITY), 1.0);
    }

    #[test]
    fn test_steps_between() {
        assert_eq!(steps_between(0.3, 0.5, 0.02), 10);
        assert_eq!(steps_between(0.5, 0.3, 0.02), 10);
        assert_eq!(steps_between(0.3, 0.31, 0.02), 0);
        assert_eq!(steps_between(0.0, 1.0, 0.02), 50);
        assert_eq!(steps_between(0.0, 1.0, 0.0), 0);
    }

    proptest! {
        #[test]
        fn test_presses_track_exact_steps(
            max_steps in 1u32..=200,
            start in arb_volume(),
            presses in prop::collection::vec(any::<bool>(), 0..300),
        ) {
            let step = 1.0 / f64::from(max_steps);
            let mut volume = start;
            for up in presses {
                let expected = if up {
                    (volume + step).min(VOLUME_MAX)
                } else {
                    (volume - step).max(VOLUME_MIN)
                };
                volume = if up { step_up(volume, step) } else { step_down(volume, step) };

                prop_assert!((VOLUME_MIN..=VOLUME_MAX).contains(&volume));
                prop_assert_eq!(volume, round_volume(volume));
                prop_assert!((volume - expected).abs() <= ROUNDING);
            }
        }

        #[test]
        fn test_steps_between_covers_distance(
            max_steps in 1u32..=200,
            current in arb_volume(),
            target in arb_volume(),
        ) {
            let step = 1.0 / f64::from(max_steps);
            let distance = (target - current).abs();
            let presses = steps_between(current, target, step);

            prop_assert!(presses <= max_steps);
            prop_assert!(f64::from(presses) * step <= distance + 1e-9);
            prop_assert!(distance - f64::from(presses) * step < step + 1e-9);
            prop_assert_eq!(steps_between(target, current, step), presses);
        }

        #[test]
        fn test_ramp_lands_near_target(
            max_steps in 1u32..=200,
            start in arb_volume(),
            level in -0.5f64..1.5,
        ) {
            let step = 1.0 / f64::from(max_steps);
            let ramp = VolumeRamp::plan(start, level, step);

            prop_assert_eq!(ramp.target, clamp_volume(level));
            prop_assert!((VOLUME_MIN..=VOLUME_MAX).contains(&ramp.target));
            if ramp.target == start {
                prop_assert_eq!(ramp.presses, 0);
            } else {
                prop_assert_eq!(ramp.up, ramp.target > start);
            }

            let drift = f64::from(ramp.presses) * ROUNDING;
            let landed = ramp.after_presses(start, step);
            prop_assert!((VOLUME_MIN..=VOLUME_MAX).contains(&landed));
            prop_assert!((ramp.target - landed).abs() <= step + drift + 1e-9);

            // Presses never carry the volume past the target by more than rounding.
            if ramp.up {
                prop_assert!(landed <= ramp.target + drift + 1e-9);
            } else {
                prop_assert!(landed >= ramp.target - drift - 1e-9);
            }
        }
    }

    #[test]
    fn test_volume_ramp_plan() {
        let ramp = VolumeRamp::plan(0.3, 0.5, 0.02);
        assert_eq!(
            ramp,
            VolumeRamp {
                target: 0.5,
                presses: 10,
                up: true,
            }
        );
        assert_eq!(ramp.after_presses(0.3, 0.02), 0.5);

        let ramp = VolumeRamp::plan(0.3, -2.0, 0.02);
        assert_eq!(ramp.target, 0.0);
        assert_eq!(ramp.presses, 15);
        assert!(!ramp.up);
    }

    #[test]
    fn test_screen_position_strings() {
        assert_eq!(ScreenPosition::Closing.to_string(), "closing");
        assert_eq!(ScreenPosition::from_str("opening").unwrap(), ScreenPosition::Opening);
        assert!(ScreenPosition::from_str("sideways").is_err());
        assert!(ScreenPosition::Opening.is_moving());
        assert!(!ScreenPosition::Down.is_moving());
        assert_eq!(ScreenPosition::from(ScreenTarget::Down), ScreenPosition::Down);
    }
}
