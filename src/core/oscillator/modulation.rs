use serde::{Serialize, Deserialize};

/// Shortest bounce period accepted, in seconds.
const MIN_BOUNCE_PERIOD: f64 = 1.0e-3;

/// Pulse-width automation of a channel.
///
/// Without bounce the width ramps from `start` to `stop` over the voice's
/// elapsed time, normalized against the largest elapsed time seen in the
/// chunk being rendered. The ramp re-estimates itself on every chunk, so a
/// held note sweeps towards `stop` within each chunk rather than over its
/// whole length.
///
/// With bounce the width ping-pongs between `start` and `stop` with period
/// `bounce_period`, driven by absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PulseWidthAutomation {
    pub enabled: bool,
    pub start: f32,
    pub stop: f32,
    pub bounce: bool,
    pub bounce_period: f32,
}

impl Default for PulseWidthAutomation {
    fn default() -> Self {
        Self {
            enabled: false,
            start: 0.125,
            stop: 0.5,
            bounce: false,
            bounce_period: 1.0,
        }
    }
}

impl PulseWidthAutomation {
    /// Width at absolute time `t` for a voice `elapsed` seconds old, where
    /// `span` is the largest elapsed time within the current chunk.
    pub fn width_at(&self, static_width: f64, t: f64, elapsed: f64, span: f64) -> f64 {
        if !self.enabled {
            return static_width;
        }

        let start = self.start as f64;
        let stop = self.stop as f64;

        let position = if self.bounce {
            let period = (self.bounce_period as f64).max(MIN_BOUNCE_PERIOD);
            let cycle = (t / period).fract();
            1.0 - (2.0 * cycle - 1.0).abs()
        } else if span > 0.0 {
            elapsed / span
        } else {
            0.0
        };

        start + (stop - start) * position
    }
}
