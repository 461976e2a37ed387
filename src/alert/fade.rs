//! Opacity stepping for the alert animation
//!
//! Opacity rises linearly from 0 to 1 over the first half of the duration
//! and falls back to 0 over the second half. The step per frame is
//! `1 / (fps * half_duration_secs)`, so at 60 fps a 5 s alert takes 150
//! frames to reach full opacity.

use std::time::Duration;

/// Snap tolerance for accumulated float error at the ends of the ramp
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadePhase {
    In,
    Out,
    Done,
}

/// Frame-by-frame fade state
#[derive(Debug, Clone)]
pub struct FadeAnimation {
    alpha: f64,
    delta: f64,
    frames_to_half: f64,
    phase: FadePhase,
}

impl FadeAnimation {
    pub fn new(duration: Duration, fps: u32) -> Self {
        let frames_to_half = f64::from(fps) * duration.as_secs_f64() / 2.0;
        let delta = if frames_to_half > 0.0 {
            1.0 / frames_to_half
        } else {
            1.0
        };

        Self {
            alpha: 0.0,
            delta,
            frames_to_half,
            phase: FadePhase::In,
        }
    }

    /// Opacity change applied per frame
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Number of frames from transparent to opaque
    pub fn frames_to_half(&self) -> f64 {
        self.frames_to_half
    }

    pub fn phase(&self) -> FadePhase {
        self.phase
    }

    /// Opacity for the frame about to be drawn; advances to the next frame
    pub fn next_alpha(&mut self) -> f64 {
        let current = self.alpha;

        match self.phase {
            FadePhase::In => {
                self.alpha += self.delta;
                if self.alpha >= 1.0 - EPSILON {
                    self.alpha = 1.0;
                    self.phase = FadePhase::Out;
                }
            }
            FadePhase::Out => {
                self.alpha -= self.delta;
                if self.alpha <= EPSILON {
                    self.alpha = 0.0;
                    self.phase = FadePhase::Done;
                }
            }
            FadePhase::Done => {}
        }

        current
    }
}
