use rand::Rng;
use serde::{Serialize, Deserialize};
use std::f64::consts::TAU;

/// Melody oscillator shapes, evaluated on a normalized phase in [0, 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    #[default]
    Pulse,
    Triangle,
    Sawtooth,
}

impl Waveform {
    pub fn sample(self, phase: f64, pulse_width: f64) -> f64 {
        match self {
            Waveform::Pulse => pulse(phase, pulse_width),
            Waveform::Triangle => triangle(phase),
            Waveform::Sawtooth => sawtooth(phase),
        }
    }
}

/// Kick carrier selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KickWaveform {
    #[default]
    Triangle,
    Sine,
    Pulse,
    Noise,
}

impl KickWaveform {
    /// Carrier value at absolute time `t` (seconds) for a kick tuned to `frequency`.
    pub fn sample<R: Rng>(self, frequency: f64, t: f64, rng: &mut R) -> f64 {
        match self {
            KickWaveform::Triangle => triangle((t * frequency).fract()),
            KickWaveform::Sine => (TAU * frequency * t).sin(),
            KickWaveform::Pulse => signum((TAU * frequency * t).sin()),
            KickWaveform::Noise => rng.random_range(-1.0..1.0),
        }
    }
}

/// Snare noise source selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnareNoise {
    #[default]
    WhiteNoise,
    Digital,
    Metal,
}

impl SnareNoise {
    /// Ring frequency of the metal noise relative to the note frequency.
    pub const METAL_RATIO: f64 = 4.5;

    pub fn sample<R: Rng>(self, frequency: f64, t: f64, rng: &mut R) -> f64 {
        match self {
            SnareNoise::WhiteNoise => rng.random_range(-1.0..1.0),
            SnareNoise::Digital => if rng.random_bool(0.5) { 1.0 } else { -1.0 },
            SnareNoise::Metal => {
                let ring = (TAU * frequency * Self::METAL_RATIO * t).sin();
                rng.random_range(-1.0..1.0) * ring
            }
        }
    }
}

pub fn pulse(phase: f64, width: f64) -> f64 {
    if phase < width { 1.0 } else { -1.0 }
}

pub fn triangle(phase: f64) -> f64 {
    2.0 * (2.0 * (phase - (phase + 0.5).floor())).abs() - 1.0
}

pub fn sawtooth(phase: f64) -> f64 {
    2.0 * (phase - 0.5)
}

// `f64::signum` maps 0.0 to 1.0; a square built from sin() must stay silent at the zero crossing.
fn signum(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_respects_width() {
        assert_eq!(pulse(0.1, 0.25), 1.0);
        assert_eq!(pulse(0.3, 0.25), -1.0);
        assert_eq!(pulse(0.0, 0.5), 1.0);
        assert_eq!(pulse(0.5, 0.5), -1.0);
    }

    #[test]
    fn test_triangle_shape() {
        assert!((triangle(0.0) + 1.0).abs() < 1e-12);
        assert!(triangle(0.25).abs() < 1e-12);
        assert!((triangle(0.5) - 1.0).abs() < 1e-12);
        assert!(triangle(0.75).abs() < 1e-12);
    }

    #[test]
    fn test_sawtooth_shape() {
        assert_eq!(sawtooth(0.0), -1.0);
        assert_eq!(sawtooth(0.5), 0.0);
        assert!((sawtooth(0.999) - 0.998).abs() < 1e-9);
    }

    #[test]
    fn test_kick_pulse_is_silent_on_zero_crossing() {
        let mut rng = rand::rng();
        assert_eq!(KickWaveform::Pulse.sample(55.0, 0.0, &mut rng), 0.0);
        assert_eq!(KickWaveform::Pulse.sample(55.0, 0.001, &mut rng), 1.0);
    }

    #[test]
    fn test_noise_sources_stay_in_range() {
        let mut rng = rand::rng();
        for i in 0..1000 {
            let t = i as f64 / 44100.0;
            let white = SnareNoise::WhiteNoise.sample(200.0, t, &mut rng);
            let digital = SnareNoise::Digital.sample(200.0, t, &mut rng);
            let metal = SnareNoise::Metal.sample(200.0, t, &mut rng);
            assert!((-1.0..1.0).contains(&white));
            assert!(digital == 1.0 || digital == -1.0);
            assert!(metal.abs() <= 1.0);
        }
    }
}
