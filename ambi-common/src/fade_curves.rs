//! Fade curve implementations for crossfading
//!
//! A crossfade drives two volumes from one normalized progress value
//! `t` in `0.0..=1.0`: the incoming channel follows the fade-in curve and the
//! outgoing channel follows the fade-out curve. Every curve returns exactly
//! `0.0`/`1.0` at the endpoints so a completed ramp lands on the target volume
//! without drift.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Fade curve types for crossfading
///
/// - Linear: Constant rate of change
/// - Quadratic: Ease-in `t²` for the incoming track, ease-out `(1-t)²` for the outgoing track
/// - SCurve: Smooth acceleration and deceleration
/// - EqualPower: Constant perceived loudness during the overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// v(t) = t
    Linear,

    /// fade-in v(t) = t², fade-out v(t) = (1-t)²
    Quadratic,

    /// v(t) = 0.5 × (1 - cos(π × t))
    SCurve,

    /// fade-in v(t) = sin(t × π/2), fade-out v(t) = cos(t × π/2)
    EqualPower,
}

impl FadeCurve {
    /// Calculate fade-in multiplier at given position
    ///
    /// # Arguments
    /// * `position` - Normalized position through fade (0.0 to 1.0)
    ///
    /// # Returns
    /// Volume multiplier (0.0 = silence, 1.0 = full volume)
    pub fn fade_in(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);
        if t <= 0.0 {
            return 0.0;
        }
        if t >= 1.0 {
            return 1.0;
        }

        match self {
            FadeCurve::Linear => t,
            FadeCurve::Quadratic => t * t,
            FadeCurve::SCurve => 0.5 * (1.0 - (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Calculate fade-out multiplier at given position
    ///
    /// Returns 1.0 at the start of the fade-out and exactly 0.0 at its end.
    pub fn fade_out(&self, position: f32) -> f32 {
        let t = position.clamp(0.0, 1.0);
        if t <= 0.0 {
            return 1.0;
        }
        if t >= 1.0 {
            return 0.0;
        }

        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::Quadratic => {
                let inv = 1.0 - t;
                inv * inv
            }
            FadeCurve::SCurve => 0.5 * (1.0 + (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).cos(),
        }
    }

    /// Parse curve from a configuration string
    ///
    /// Accepts the serde names plus the aliases 'cosine', 's-curve' and 'equalpower'.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Some(FadeCurve::Linear),
            "quadratic" | "exponential" | "ease" => Some(FadeCurve::Quadratic),
            "cosine" | "scurve" | "s-curve" | "s_curve" => Some(FadeCurve::SCurve),
            "equal_power" | "equalpower" => Some(FadeCurve::EqualPower),
            _ => None,
        }
    }

    /// Get human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::Quadratic => "Quadratic",
            FadeCurve::SCurve => "S-Curve",
            FadeCurve::EqualPower => "Equal Power",
        }
    }

    /// Get all available fade curve variants
    pub fn all_variants() -> &'static [FadeCurve] {
        &[
            FadeCurve::Linear,
            FadeCurve::Quadratic,
            FadeCurve::SCurve,
            FadeCurve::EqualPower,
        ]
    }
}

impl Default for FadeCurve {
    /// Quadratic ease-in/ease-out, the venue default
    fn default() -> Self {
        FadeCurve::Quadratic
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
