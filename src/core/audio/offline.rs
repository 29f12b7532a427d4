use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use anyhow::{bail, Context, Result};
use crate::core::midi::MidiEvent;
use crate::core::synth::Synth;
use crate::utils::helpers;

/// Peak level of an exported file.
pub const NORMALIZE_PEAK: f32 = 0.95;

/// Seconds rendered after the last event so releases and drum decays ring out.
const TAIL_SECONDS: u32 = 1;

const PROGRESS_EVERY: usize = 200;

/// A stereo render held in memory.
#[derive(Debug, Clone, Default)]
pub struct RenderedAudio {
    pub sample_rate: u32,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl RenderedAudio {
    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }

    pub fn peak(&self) -> f32 {
        helpers::peak(&[self.left.as_slice(), self.right.as_slice()])
    }

    /// Scales both channels together so the louder one peaks at `NORMALIZE_PEAK`.
    pub fn normalize(&mut self) {
        helpers::normalize_to(&mut [self.left.as_mut_slice(), self.right.as_mut_slice()], NORMALIZE_PEAK);
    }

    /// Writes a 16-bit stereo WAV file. A partially written file is removed.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let result = self.write_samples(path);
        if result.is_err() && path.exists() {
            if let Err(err) = fs::remove_file(path) {
                log::warn!("Failed to remove partial file {}: {}", path.display(), err);
            }
        }
        result
    }

    fn write_samples(&self, path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for (&l, &r) in self.left.iter().zip(&self.right) {
            writer.write_sample(to_pcm16(l))?;
            writer.write_sample(to_pcm16(r))?;
        }
        writer.finalize()
            .with_context(|| format!("Failed to finish {}", path.display()))?;
        Ok(())
    }
}

fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Renders `events` through `synth` as fast as possible.
///
/// Before each event the time since the previous one is rendered, then the
/// event is applied. One second of tail follows the last event. The synth is
/// reset before and after; the live stream must not be running meanwhile.
pub fn render_sequence(synth: &Synth, events: &[MidiEvent]) -> Result<RenderedAudio> {
    if events.is_empty() {
        bail!("Nothing to render: the sequence has no note events");
    }

    let sample_rate = synth.sample_rate();
    let mut audio = RenderedAudio { sample_rate, ..RenderedAudio::default() };
    synth.all_notes_off();

    let mut render = |frames: usize| {
        if frames == 0 {
            return;
        }
        let (left, right) = synth.generate_chunk(frames, synth.current_sample_index());
        synth.advance(frames as u64);
        audio.left.extend_from_slice(&left);
        audio.right.extend_from_slice(&right);
    };

    for (index, event) in events.iter().enumerate() {
        let frames = (event.delta_seconds.max(0.0) * sample_rate as f64).round() as usize;
        render(frames);
        synth.handle_event(event);

        if (index + 1) % PROGRESS_EVERY == 0 {
            log::debug!("Rendered {}/{} events", index + 1, events.len());
        }
    }
    render((sample_rate * TAIL_SECONDS) as usize);

    synth.all_notes_off();
    Ok(audio)
}

/// Renders, normalizes and writes `events` to `path`. Returns the frame count.
pub fn export_wav(synth: &Synth, events: &[MidiEvent], path: &Path) -> Result<usize> {
    log::info!("Exporting {} events to {}", events.len(), path.display());
    let mut audio = render_sequence(synth, events)?;
    log::debug!("Peak before normalizing: {:.3}", audio.peak());
    audio.normalize();
    audio.write_wav(path)?;
    log::info!(
        "Wrote {} ({} frames, {})",
        path.display(),
        audio.frames(),
        helpers::format_time(audio.duration_seconds())
    );
    Ok(audio.frames())
}

/// Runs `export_wav` on a worker thread.
pub fn spawn_export(synth: Arc<Synth>, events: Vec<MidiEvent>, path: PathBuf) -> Result<JoinHandle<Result<usize>>> {
    thread::Builder::new()
        .name("wav-export".into())
        .spawn(move || export_wav(&synth, &events, &path))
        .context("Failed to spawn export thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_wav(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("chipstudio-{}-{}.wav", name, std::process::id()))
    }

    fn two_note_sequence() -> Vec<MidiEvent> {
        vec![
            MidiEvent::note_on(60, 100, 0, 0.0),
            MidiEvent::note_off(60, 0, 0.4),
            MidiEvent::note_on(64, 100, 0, 0.0),
            MidiEvent::note_off(64, 0, 0.2),
        ]
    }

    #[test]
    fn test_render_length_includes_tail() {
        let synth = Synth::new(11025);
        let audio = render_sequence(&synth, &two_note_sequence()).unwrap();
        assert_eq!(audio.frames(), 6615 + 11025);
        assert_eq!(audio.right.len(), audio.frames());
        assert_eq!(synth.voice_count(), 0);
        assert_eq!(synth.current_sample_index(), 0);
    }

    #[test]
    fn test_export_writes_stereo_pcm16() {
        let synth = Synth::new(11025);
        let path = temp_wav("export");
        let frames = export_wav(&synth, &two_note_sequence(), &path).unwrap();
        assert_eq!(frames, 17640);

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_rate, 11025);
        assert_eq!(reader.duration() as usize, frames);

        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
        let expected = (NORMALIZE_PEAK * i16::MAX as f32) as u16;
        assert!(peak.abs_diff(expected) <= 1, "peak {}", peak);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_empty_sequence_is_an_error() {
        let synth = Synth::new(11025);
        let path = temp_wav("empty");
        assert!(export_wav(&synth, &[], &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_normalize_silence_stays_silent() {
        let mut audio = RenderedAudio {
            sample_rate: 11025,
            left: vec![0.0; 8],
            right: vec![0.0; 8],
        };
        audio.normalize();
        assert_eq!(audio.peak(), 0.0);
    }

    #[test]
    fn test_unwritable_path_leaves_no_file() {
        let audio = RenderedAudio { sample_rate: 11025, left: vec![0.5; 4], right: vec![0.5; 4] };
        let path = std::env::temp_dir().join("chipstudio-no-such-dir").join("out.wav");
        assert!(audio.write_wav(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_spawn_export_on_worker() {
        let synth = Arc::new(Synth::new(11025));
        let path = temp_wav("spawned");
        let handle = spawn_export(synth, two_note_sequence(), path.clone()).unwrap();
        let frames = handle.join().unwrap().unwrap();
        assert_eq!(frames, 17640);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_pcm_conversion_clamps() {
        assert_eq!(to_pcm16(2.0), i16::MAX);
        assert_eq!(to_pcm16(-2.0), -i16::MAX);
        assert_eq!(to_pcm16(0.0), 0);
    }
}
