use std::sync::atomic::{AtomicBool, Ordering};
use serde::{Serialize, Deserialize};
use crate::core::oscillator::{Envelope, PulseWidthAutomation, Waveform};
use super::params::{AtomicEnum, AtomicF32};

pub const CHANNEL_COUNT: usize = 16;

/// Plain copy of one channel's timbre, used for configuration and as the
/// per-chunk view the renderer works from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelSettings {
    pub waveform: Waveform,
    pub volume: f32,
    pub pan: f32,
    pub pulse_width: f32,
    pub envelope: Envelope,
    pub pulse_width_automation: PulseWidthAutomation,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            waveform: Waveform::Pulse,
            volume: 0.5,
            pan: 0.0,
            pulse_width: 0.5,
            envelope: Envelope::default(),
            pulse_width_automation: PulseWidthAutomation::default(),
        }
    }
}

/// Live timbre slot of one MIDI channel. Each field is written independently.
#[derive(Debug)]
pub struct ChannelTimbre {
    waveform: AtomicEnum<Waveform>,
    volume: AtomicF32,
    pan: AtomicF32,
    pulse_width: AtomicF32,

    envelope_enabled: AtomicBool,
    attack: AtomicF32,
    decay: AtomicF32,
    sustain: AtomicF32,
    release: AtomicF32,

    pwm_enabled: AtomicBool,
    pwm_start: AtomicF32,
    pwm_stop: AtomicF32,
    pwm_bounce: AtomicBool,
    pwm_bounce_period: AtomicF32,
}

impl ChannelTimbre {
    pub fn new(settings: &ChannelSettings) -> Self {
        let env = &settings.envelope;
        let pwm = &settings.pulse_width_automation;
        Self {
            waveform: AtomicEnum::new(settings.waveform),
            volume: AtomicF32::new(settings.volume),
            pan: AtomicF32::new(settings.pan.clamp(-1.0, 1.0)),
            pulse_width: AtomicF32::new(settings.pulse_width),
            envelope_enabled: AtomicBool::new(env.enabled),
            attack: AtomicF32::new(env.attack),
            decay: AtomicF32::new(env.decay),
            sustain: AtomicF32::new(env.sustain),
            release: AtomicF32::new(env.release),
            pwm_enabled: AtomicBool::new(pwm.enabled),
            pwm_start: AtomicF32::new(pwm.start),
            pwm_stop: AtomicF32::new(pwm.stop),
            pwm_bounce: AtomicBool::new(pwm.bounce),
            pwm_bounce_period: AtomicF32::new(pwm.bounce_period),
        }
    }

    /// Builds the fixed table of all channels with default settings.
    pub fn table() -> [ChannelTimbre; CHANNEL_COUNT] {
        let defaults = ChannelSettings::default();
        std::array::from_fn(|_| ChannelTimbre::new(&defaults))
    }

    pub fn set_waveform(&self, waveform: Waveform) {
        self.waveform.store(waveform);
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.max(0.0));
    }

    pub fn set_pan(&self, pan: f32) {
        self.pan.store(pan.clamp(-1.0, 1.0));
    }

    pub fn set_pulse_width(&self, width: f32) {
        self.pulse_width.store(width);
    }

    pub fn set_envelope(&self, envelope: &Envelope) {
        self.envelope_enabled.store(envelope.enabled, Ordering::Relaxed);
        self.attack.store(envelope.attack);
        self.decay.store(envelope.decay);
        self.sustain.store(envelope.sustain.clamp(0.0, 1.0));
        self.release.store(envelope.release);
    }

    pub fn set_pulse_width_automation(&self, pwm: &PulseWidthAutomation) {
        self.pwm_enabled.store(pwm.enabled, Ordering::Relaxed);
        self.pwm_start.store(pwm.start);
        self.pwm_stop.store(pwm.stop);
        self.pwm_bounce.store(pwm.bounce, Ordering::Relaxed);
        self.pwm_bounce_period.store(pwm.bounce_period);
    }

    pub fn apply(&self, settings: &ChannelSettings) {
        self.set_waveform(settings.waveform);
        self.set_volume(settings.volume);
        self.set_pan(settings.pan);
        self.set_pulse_width(settings.pulse_width);
        self.set_envelope(&settings.envelope);
        self.set_pulse_width_automation(&settings.pulse_width_automation);
    }

    pub fn snapshot(&self) -> ChannelSettings {
        ChannelSettings {
            waveform: self.waveform.load(),
            volume: self.volume.load(),
            pan: self.pan.load(),
            pulse_width: self.pulse_width.load(),
            envelope: Envelope {
                enabled: self.envelope_enabled.load(Ordering::Relaxed),
                attack: self.attack.load(),
                decay: self.decay.load(),
                sustain: self.sustain.load(),
                release: self.release.load(),
            },
            pulse_width_automation: PulseWidthAutomation {
                enabled: self.pwm_enabled.load(Ordering::Relaxed),
                start: self.pwm_start.load(),
                stop: self.pwm_stop.load(),
                bounce: self.pwm_bounce.load(Ordering::Relaxed),
                bounce_period: self.pwm_bounce_period.load(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_uses_defaults() {
        let table = ChannelTimbre::table();
        assert_eq!(table.len(), CHANNEL_COUNT);
        for channel in &table {
            assert_eq!(channel.snapshot(), ChannelSettings::default());
        }
    }

    #[test]
    fn test_apply_then_snapshot() {
        let channel = ChannelTimbre::new(&ChannelSettings::default());
        let settings = ChannelSettings {
            waveform: Waveform::Sawtooth,
            volume: 0.9,
            pan: -0.25,
            pulse_width: 0.125,
            envelope: Envelope { enabled: true, attack: 0.2, decay: 0.3, sustain: 0.4, release: 0.5 },
            pulse_width_automation: PulseWidthAutomation {
                enabled: true,
                start: 0.2,
                stop: 0.8,
                bounce: true,
                bounce_period: 0.5,
            },
        };
        channel.apply(&settings);
        assert_eq!(channel.snapshot(), settings);
    }

    #[test]
    fn test_pan_and_sustain_are_clamped() {
        let channel = ChannelTimbre::new(&ChannelSettings::default());
        channel.set_pan(3.0);
        channel.set_envelope(&Envelope { sustain: 1.5, ..Envelope::default() });
        let snapshot = channel.snapshot();
        assert_eq!(snapshot.pan, 1.0);
        assert_eq!(snapshot.envelope.sustain, 1.0);
    }
}
