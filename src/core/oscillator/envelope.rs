use serde::{Serialize, Deserialize};

/// Shortest stage time accepted by the envelope; keeps the per-sample step finite.
const MIN_STAGE_TIME: f32 = 1.0e-4;

/// Envelope stage of a melody voice. There is no release stage: note-off
/// either cuts a voice that is still attacking or leaves it sustaining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopePhase {
    #[default]
    Attack,
    Decay,
    Sustain,
}

/// ADSR settings of a channel. `release` is carried for the configuration
/// surface but never applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Envelope {
    pub enabled: bool,
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            enabled: false,
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

/// Per-voice envelope position, advanced one sample at a time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvelopeState {
    pub phase: EnvelopePhase,
    pub level: f32,
}

impl EnvelopeState {
    /// Advances by `dt` seconds and returns the new level.
    pub fn advance(&mut self, envelope: &Envelope, dt: f32) -> f32 {
        match self.phase {
            EnvelopePhase::Attack => {
                self.level += dt / envelope.attack.max(MIN_STAGE_TIME);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.phase = EnvelopePhase::Decay;
                }
            },
            EnvelopePhase::Decay => {
                self.level -= dt * (1.0 - envelope.sustain) / envelope.decay.max(MIN_STAGE_TIME);
                if self.level <= envelope.sustain {
                    self.level = envelope.sustain;
                    self.phase = EnvelopePhase::Sustain;
                }
            },
            EnvelopePhase::Sustain => {
                self.level = envelope.sustain;
            },
        }
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(attack: f32, decay: f32, sustain: f32) -> Envelope {
        Envelope { enabled: true, attack, decay, sustain, release: 0.3 }
    }

    fn steps_until_leaving(state: &mut EnvelopeState, env: &Envelope, phase: EnvelopePhase, dt: f32) -> usize {
        let mut steps = 0;
        while state.phase == phase && steps < 10_000 {
            state.advance(env, dt);
            steps += 1;
        }
        steps
    }

    #[test]
    fn test_attack_ramps_linearly() {
        let env = envelope(0.01, 0.1, 0.5);
        let mut state = EnvelopeState::default();
        let dt = 1.0 / 1000.0;

        let first = state.advance(&env, dt);
        assert!((first - 0.1).abs() < 1e-6);
        assert_eq!(state.phase, EnvelopePhase::Attack);

        let steps = steps_until_leaving(&mut state, &env, EnvelopePhase::Attack, dt);
        assert!((9..=10).contains(&steps), "attack took {} more steps", steps);
        assert_eq!(state.level, 1.0);
        assert_eq!(state.phase, EnvelopePhase::Decay);
    }

    #[test]
    fn test_decay_settles_on_sustain() {
        let env = envelope(0.001, 0.01, 0.5);
        let mut state = EnvelopeState::default();
        let dt = 1.0 / 1000.0;

        state.advance(&env, dt);
        assert_eq!(state.phase, EnvelopePhase::Decay);

        // 0.5 to lose in steps of 0.05
        let steps = steps_until_leaving(&mut state, &env, EnvelopePhase::Decay, dt);
        assert!((10..=11).contains(&steps), "decay took {} steps", steps);
        assert_eq!(state.phase, EnvelopePhase::Sustain);
        assert_eq!(state.level, 0.5);

        for _ in 0..100 {
            assert_eq!(state.advance(&env, dt), 0.5);
        }
    }

    #[test]
    fn test_full_sustain_skips_decay() {
        let env = envelope(0.001, 0.1, 1.0);
        let mut state = EnvelopeState::default();
        state.advance(&env, 0.001);
        state.advance(&env, 0.001);
        assert_eq!(state.phase, EnvelopePhase::Sustain);
        assert_eq!(state.level, 1.0);
    }

    #[test]
    fn test_zero_attack_is_finite() {
        let env = envelope(0.0, 0.1, 0.5);
        let mut state = EnvelopeState::default();
        let dt = 1.0 / 44100.0;
        assert!(state.advance(&env, dt).is_finite());

        let steps = steps_until_leaving(&mut state, &env, EnvelopePhase::Attack, dt);
        assert!(steps <= 5);
        assert_eq!(state.level, 1.0);
    }
}
