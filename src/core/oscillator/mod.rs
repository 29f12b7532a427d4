mod envelope;
mod modulation;
mod waveform;

// Re-export key types so they're accessible from core::oscillator
pub use self::envelope::{Envelope, EnvelopePhase, EnvelopeState};
pub use self::modulation::PulseWidthAutomation;
pub use self::waveform::{KickWaveform, SnareNoise, Waveform};
