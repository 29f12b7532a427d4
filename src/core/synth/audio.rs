use std::f64::consts::{FRAC_PI_4, TAU};
use rand::Rng;
use crate::core::oscillator::Waveform;
use crate::core::voice::{Voice, VoiceKind};
use super::channel::{ChannelSettings, CHANNEL_COUNT};
use super::params::{DrumSettings, BITCRUSH_BYPASS};

/// Drum decays are floored to this many seconds.
const MIN_DRUM_DECAY: f64 = 0.01;
/// Kick output is boosted by this factor on top of the kick volume.
const KICK_GAIN: f64 = 2.0;
/// Fixed pitch of the snare's tonal body.
const SNARE_BODY_FREQ: f64 = 180.0;
/// Decay rate (1/s) of the snare body.
const SNARE_BODY_DECAY_RATE: f64 = 15.0;
/// Exponent of the polyphony loudness compensation.
const MIX_COMPENSATION: f32 = 0.55;

/// Convert MIDI note number to frequency in Hz
pub fn midi_note_to_freq(note: u8) -> f64 {
    440.0 * 2.0f64.powf((note as f64 - 69.0) / 12.0)
}

/// Constant-power pan law. Returns `(left, right)` gains for `pan` in [-1, 1].
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) as f64 + 1.0) * FRAC_PI_4;
    (angle.cos() as f32, angle.sin() as f32)
}

/// Snaps `sample` onto the grid `k / depth`.
pub fn bitcrush(sample: f32, depth: f32) -> f32 {
    (sample * depth).round() / depth
}

/// Exponential drum envelope for a voice `elapsed` seconds old.
pub fn drum_envelope(elapsed: f64, decay: f64) -> f64 {
    (-elapsed / decay.max(MIN_DRUM_DECAY)).exp()
}

/// Renders `out.len()` samples of a single voice starting at absolute sample `from`.
///
/// Melody voices advance their envelope and record their pulse width as they go,
/// so the caller should keep the mutated voice if it wants continuity across chunks.
pub fn render_voice<R: Rng>(
    voice: &mut Voice,
    channel: &ChannelSettings,
    drums: &DrumSettings,
    sample_rate: u32,
    from: u64,
    out: &mut [f32],
    rng: &mut R,
) {
    let rate = sample_rate as f64;
    let start = voice.start_sample;
    let frequency = voice.frequency;

    match voice.kind {
        VoiceKind::Kick => {
            let gain = drums.kick_volume as f64 * KICK_GAIN;
            for (i, sample) in out.iter_mut().enumerate() {
                let index = from + i as u64;
                let t = index as f64 / rate;
                let elapsed = index.saturating_sub(start) as f64 / rate;
                let carrier = drums.kick_waveform.sample(frequency, t, rng);
                *sample = (carrier * drum_envelope(elapsed, drums.kick_decay as f64) * gain) as f32;
            }
        },
        VoiceKind::Snare => {
            let body_amount = drums.snare_body as f64;
            let volume = drums.snare_volume as f64;
            for (i, sample) in out.iter_mut().enumerate() {
                let index = from + i as u64;
                let t = index as f64 / rate;
                let elapsed = index.saturating_sub(start) as f64 / rate;

                let noise = drums.snare_noise.sample(frequency, t, rng)
                    * drum_envelope(elapsed, drums.snare_decay as f64);
                let body = (TAU * SNARE_BODY_FREQ * t).sin() * (-elapsed * SNARE_BODY_DECAY_RATE).exp();

                let value = noise * (1.0 - body_amount * 0.4) + body * body_amount * 2.0;
                *sample = (value * volume) as f32;
            }
        },
        VoiceKind::Melody => {
            let dt = 1.0 / sample_rate as f32;
            let envelope = &channel.envelope;
            let automation = &channel.pulse_width_automation;
            let static_width = channel.pulse_width as f64;

            // Largest elapsed time in this chunk; stands in for the note length of the width ramp.
            let last = (from + out.len() as u64).saturating_sub(1);
            let span = last.saturating_sub(start) as f64 / rate;

            for (i, sample) in out.iter_mut().enumerate() {
                let index = from + i as u64;
                let t = index as f64 / rate;
                let elapsed = index.saturating_sub(start) as f64 / rate;
                let phase = (t * frequency).fract();

                let width = match channel.waveform {
                    Waveform::Pulse => automation.width_at(static_width, t, elapsed, span),
                    _ => static_width,
                };
                voice.pulse_width = width as f32;

                let level = if !envelope.enabled {
                    1.0
                } else if index >= start {
                    voice.envelope.advance(envelope, dt)
                } else {
                    voice.envelope.level
                };

                *sample = channel.waveform.sample(phase, width) as f32 * channel.volume * level;
            }
        },
    }
}

impl super::Synth {
    /// Renders `frames` stereo frames starting at absolute sample `from`.
    ///
    /// Enforces the polyphony ceiling, renders every voice from a copy of the
    /// voice set, mixes with constant-power panning, compensates loudness for
    /// the number of voices and applies the bitcrusher. The voice lock is only
    /// held while copying the voice set and while storing envelope progress back.
    pub fn generate_chunk(&self, frames: usize, from: u64) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0f32; frames];
        let mut right = vec![0.0f32; frames];
        if frames == 0 {
            return (left, right);
        }

        self.enforce_polyphony();
        let mut voices = self.voice_snapshot();

        let params = self.params.snapshot();
        let channels: [ChannelSettings; CHANNEL_COUNT] =
            std::array::from_fn(|index| self.channels[index].snapshot());

        let mut rng = rand::rng();
        let mut scratch = vec![0.0f32; frames];

        for voice in voices.iter_mut() {
            let settings = &channels[voice.channel as usize % CHANNEL_COUNT];
            render_voice(voice, settings, &params.drums, self.sample_rate, from, &mut scratch, &mut rng);

            let (left_gain, right_gain) = pan_gains(settings.pan);
            let velocity = voice.velocity;
            for ((l, r), sample) in left.iter_mut().zip(right.iter_mut()).zip(&scratch) {
                let value = sample * velocity;
                *l += value * left_gain;
                *r += value * right_gain;
            }
        }

        if !voices.is_empty() {
            let divisor = (voices.len() as f32).powf(MIX_COMPENSATION);
            for sample in left.iter_mut().chain(right.iter_mut()) {
                *sample /= divisor;
            }
        }

        if params.bit_depth < BITCRUSH_BYPASS {
            for sample in left.iter_mut().chain(right.iter_mut()) {
                *sample = bitcrush(*sample, params.bit_depth);
            }
        }

        self.store_voice_progress(&voices);

        (left, right)
    }
}
