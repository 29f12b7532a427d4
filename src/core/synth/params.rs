//! Lock-free parameter storage.
//!
//! Every parameter is an independent atomic scalar written with relaxed
//! ordering. A chunk rendered while the configuration is being changed may see
//! some fields updated and others not; the next chunk sees the new values.
//! Nothing here ever blocks the audio thread.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use serde::{Serialize, Deserialize};
use crate::core::oscillator::{KickWaveform, SnareNoise, Waveform};

/// Bit depths at or above this value leave samples untouched.
pub const BITCRUSH_BYPASS: f32 = 128.0;

/// Drum channel index (0-based) used when nothing else is configured, i.e. MIDI channel 10.
pub const DEFAULT_DRUM_CHANNEL: u8 = 9;
pub const DEFAULT_BIT_DEPTH: f32 = 16.0;

/// An `f32` stored as its bit pattern.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Fieldless enums that fit in a byte.
pub trait PackedEnum: Copy {
    fn pack(self) -> u8;
    fn unpack(value: u8) -> Self;
}

/// A `PackedEnum` stored in an `AtomicU8`.
#[derive(Debug)]
pub struct AtomicEnum<T> {
    value: AtomicU8,
    _kind: PhantomData<T>,
}

impl<T: PackedEnum> AtomicEnum<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: AtomicU8::new(value.pack()),
            _kind: PhantomData,
        }
    }

    pub fn load(&self) -> T {
        T::unpack(self.value.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: T) {
        self.value.store(value.pack(), Ordering::Relaxed);
    }
}

impl PackedEnum for Waveform {
    fn pack(self) -> u8 {
        match self {
            Waveform::Pulse => 0,
            Waveform::Triangle => 1,
            Waveform::Sawtooth => 2,
        }
    }

    fn unpack(value: u8) -> Self {
        match value {
            1 => Waveform::Triangle,
            2 => Waveform::Sawtooth,
            _ => Waveform::Pulse,
        }
    }
}

impl PackedEnum for KickWaveform {
    fn pack(self) -> u8 {
        match self {
            KickWaveform::Triangle => 0,
            KickWaveform::Sine => 1,
            KickWaveform::Pulse => 2,
            KickWaveform::Noise => 3,
        }
    }

    fn unpack(value: u8) -> Self {
        match value {
            1 => KickWaveform::Sine,
            2 => KickWaveform::Pulse,
            3 => KickWaveform::Noise,
            _ => KickWaveform::Triangle,
        }
    }
}

impl PackedEnum for SnareNoise {
    fn pack(self) -> u8 {
        match self {
            SnareNoise::WhiteNoise => 0,
            SnareNoise::Digital => 1,
            SnareNoise::Metal => 2,
        }
    }

    fn unpack(value: u8) -> Self {
        match value {
            1 => SnareNoise::Digital,
            2 => SnareNoise::Metal,
            _ => SnareNoise::WhiteNoise,
        }
    }
}

/// Settings shared by every kick and snare voice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DrumSettings {
    pub kick_volume: f32,
    pub kick_decay: f32,
    pub kick_waveform: KickWaveform,
    pub snare_volume: f32,
    pub snare_decay: f32,
    pub snare_body: f32,
    #[serde(rename = "snareNoiseType")]
    pub snare_noise: SnareNoise,
}

impl Default for DrumSettings {
    fn default() -> Self {
        Self {
            kick_volume: 1.0,
            kick_decay: 0.15,
            kick_waveform: KickWaveform::Triangle,
            snare_volume: 0.8,
            snare_decay: 0.2,
            snare_body: 0.5,
            snare_noise: SnareNoise::WhiteNoise,
        }
    }
}

/// Values of the global parameters captured for one chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSnapshot {
    pub bit_depth: f32,
    pub drums: DrumSettings,
}

/// Global synth parameters.
#[derive(Debug)]
pub struct SynthParams {
    drum_channel: AtomicU8,
    bit_depth: AtomicF32,
    kick_volume: AtomicF32,
    kick_decay: AtomicF32,
    kick_waveform: AtomicEnum<KickWaveform>,
    snare_volume: AtomicF32,
    snare_decay: AtomicF32,
    snare_body: AtomicF32,
    snare_noise: AtomicEnum<SnareNoise>,
}

impl SynthParams {
    pub fn new() -> Self {
        let drums = DrumSettings::default();
        Self {
            drum_channel: AtomicU8::new(DEFAULT_DRUM_CHANNEL),
            bit_depth: AtomicF32::new(DEFAULT_BIT_DEPTH),
            kick_volume: AtomicF32::new(drums.kick_volume),
            kick_decay: AtomicF32::new(drums.kick_decay),
            kick_waveform: AtomicEnum::new(drums.kick_waveform),
            snare_volume: AtomicF32::new(drums.snare_volume),
            snare_decay: AtomicF32::new(drums.snare_decay),
            snare_body: AtomicF32::new(drums.snare_body),
            snare_noise: AtomicEnum::new(drums.snare_noise),
        }
    }

    pub fn drum_channel(&self) -> u8 {
        self.drum_channel.load(Ordering::Relaxed)
    }

    /// Sets the drum channel (0-based, clamped to 0..=15).
    pub fn set_drum_channel(&self, channel: u8) {
        self.drum_channel.store(channel.min(15), Ordering::Relaxed);
    }

    pub fn bit_depth(&self) -> f32 {
        self.bit_depth.load()
    }

    pub fn set_bit_depth(&self, depth: f32) {
        self.bit_depth.store(depth.max(1.0));
    }

    pub fn set_drums(&self, drums: &DrumSettings) {
        self.kick_volume.store(drums.kick_volume);
        self.kick_decay.store(drums.kick_decay);
        self.kick_waveform.store(drums.kick_waveform);
        self.snare_volume.store(drums.snare_volume);
        self.snare_decay.store(drums.snare_decay);
        self.set_snare_body(drums.snare_body);
        self.snare_noise.store(drums.snare_noise);
    }

    pub fn set_snare_body(&self, body: f32) {
        self.snare_body.store(body.clamp(0.0, 1.0));
    }

    pub fn drums(&self) -> DrumSettings {
        DrumSettings {
            kick_volume: self.kick_volume.load(),
            kick_decay: self.kick_decay.load(),
            kick_waveform: self.kick_waveform.load(),
            snare_volume: self.snare_volume.load(),
            snare_decay: self.snare_decay.load(),
            snare_body: self.snare_body.load(),
            snare_noise: self.snare_noise.load(),
        }
    }

    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            bit_depth: self.bit_depth(),
            drums: self.drums(),
        }
    }
}

impl Default for SynthParams {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_f32_round_trips_bits() {
        let value = AtomicF32::new(0.15);
        assert_eq!(value.load(), 0.15);
        value.store(-3.5);
        assert_eq!(value.load(), -3.5);
    }

    #[test]
    fn test_packed_enums_unpack_what_they_pack() {
        for waveform in [Waveform::Pulse, Waveform::Triangle, Waveform::Sawtooth] {
            assert_eq!(Waveform::unpack(waveform.pack()), waveform);
        }
        for kick in [KickWaveform::Triangle, KickWaveform::Sine, KickWaveform::Pulse, KickWaveform::Noise] {
            assert_eq!(KickWaveform::unpack(kick.pack()), kick);
        }
        for noise in [SnareNoise::WhiteNoise, SnareNoise::Digital, SnareNoise::Metal] {
            assert_eq!(SnareNoise::unpack(noise.pack()), noise);
        }
    }

    #[test]
    fn test_drum_channel_is_clamped() {
        let params = SynthParams::new();
        assert_eq!(params.drum_channel(), DEFAULT_DRUM_CHANNEL);
        params.set_drum_channel(200);
        assert_eq!(params.drum_channel(), 15);
    }

    #[test]
    fn test_snapshot_reflects_writes() {
        let params = SynthParams::new();
        params.set_drums(&DrumSettings {
            kick_waveform: KickWaveform::Sine,
            snare_noise: SnareNoise::Metal,
            ..DrumSettings::default()
        });
        params.set_snare_body(2.0);
        params.set_bit_depth(8.0);

        let snapshot = params.snapshot();
        assert_eq!(snapshot.drums.kick_waveform, KickWaveform::Sine);
        assert_eq!(snapshot.drums.snare_noise, SnareNoise::Metal);
        assert_eq!(snapshot.drums.snare_body, 1.0);
        assert_eq!(snapshot.bit_depth, 8.0);
        assert_eq!(snapshot.drums.kick_decay, DrumSettings::default().kick_decay);
    }
}
