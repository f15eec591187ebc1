//! Crossfade volume ramp
//!
//! A ramp of `steps` discrete intervals moves the outgoing channel from the
//! target volume to silence while the incoming channel rises to the target.
//! The last step lands exactly on (0.0, target).

use ambi_common::FadeCurve;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fader {
    curve: FadeCurve,
    steps: u32,
}

impl Fader {
    pub fn new(curve: FadeCurve, steps: u32) -> Self {
        Self {
            curve,
            steps: steps.max(1),
        }
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// (outgoing, incoming) volumes after `step` of `steps` intervals
    pub fn volumes_at(&self, step: u32, target: f32) -> (f32, f32) {
        let target = target.clamp(0.0, 1.0);
        if step >= self.steps {
            return (0.0, target);
        }
        let progress = step as f32 / self.steps as f32;
        let outgoing = target * self.curve.fade_out(progress);
        let incoming = (target * self.curve.fade_in(progress)).min(target);
        (outgoing, incoming)
    }
}
