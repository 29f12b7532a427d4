use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream};
use crate::core::synth::Synth;

/// Names of the output devices on the default host
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.output_devices()
        .context("Failed to enumerate output devices")?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

/// Feeds a live output stream from the synth.
pub struct PlaybackDriver {
    synth: Arc<Synth>,
    stream: Option<Stream>,
}

impl PlaybackDriver {
    pub fn new(synth: Arc<Synth>) -> Self {
        Self { synth, stream: None }
    }

    /// Opens the output device and starts pulling audio.
    ///
    /// `device` selects by case-insensitive substring of the device name;
    /// `None` or `"default"` uses the host default.
    pub fn start(&mut self, device: Option<&str>) -> Result<()> {
        self.stop();

        let host = cpal::default_host();
        log::info!("Using audio host: {}", host.id().name());

        let device = select_device(&host, device)?;
        log::info!("Using output device: {}", device.name().unwrap_or_else(|_| "<unnamed>".into()));

        let default_config = device.default_output_config()
            .context("Failed to query output config")?;
        let sample_format = default_config.sample_format();
        let mut config = cpal::StreamConfig::from(default_config);
        config.sample_rate = cpal::SampleRate(self.synth.sample_rate());
        log::debug!("Stream config: {:?} ({:?})", config, sample_format);

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, Arc::clone(&self.synth)),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, Arc::clone(&self.synth)),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, Arc::clone(&self.synth)),
            other => bail!("Unsupported sample format {:?}", other),
        }?;

        stream.play().context("Failed to start output stream")?;
        log::info!("Audio stream started at {} Hz", config.sample_rate.0);
        self.stream = Some(stream);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log::warn!("Failed to pause output stream: {}", err);
            }
            log::info!("Audio stream stopped");
        }
    }
}

impl Drop for PlaybackDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn select_device(host: &cpal::Host, wanted: Option<&str>) -> Result<cpal::Device> {
    match wanted {
        None | Some("default") => host.default_output_device()
            .ok_or_else(|| anyhow!("No output device available")),
        Some(wanted) => {
            let pattern = wanted.to_lowercase();
            host.output_devices()
                .context("Failed to enumerate output devices")?
                .find(|device| {
                    device.name()
                        .map(|name| name.to_lowercase().contains(&pattern))
                        .unwrap_or(false)
                })
                .ok_or_else(|| anyhow!("No output device matches '{}'", wanted))
        },
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    synth: Arc<Synth>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    let err_fn = |err| log::error!("an error occurred on the audio stream: {}", err);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            fill_output(&synth, data, channels);
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Renders one callback buffer from the synth.
pub(crate) fn fill_output<T>(synth: &Synth, data: &mut [T], channels: usize)
where
    T: SizedSample + FromSample<f32>,
{
    fill_with(synth, data, channels, |frames, from| synth.generate_chunk(frames, from));
}

/// Fills `data` from `render`. A panic inside `render` leaves the buffer
/// silent and does not move the sample counter.
fn fill_with<T, F>(synth: &Synth, data: &mut [T], channels: usize, render: F)
where
    T: SizedSample + FromSample<f32>,
    F: FnOnce(usize, u64) -> (Vec<f32>, Vec<f32>),
{
    let channels = channels.max(1);
    let frames = data.len() / channels;
    let from = synth.current_sample_index();

    match catch_unwind(AssertUnwindSafe(|| render(frames, from))) {
        Ok((left, right)) => {
            write_interleaved(data, channels, &left, &right);
            synth.advance(frames as u64);
        },
        Err(_) => {
            log::warn!("render failed, writing silence");
            data.fill(T::EQUILIBRIUM);
        },
    }
}

/// Interleaves a stereo pair into a device buffer. Mono devices get the
/// average; channels past the second are silent.
pub(crate) fn write_interleaved<T>(data: &mut [T], channels: usize, left: &[f32], right: &[f32])
where
    T: SizedSample + FromSample<f32>,
{
    for ((frame, &l), &r) in data.chunks_mut(channels).zip(left).zip(right) {
        match frame {
            [mono] => *mono = T::from_sample((l + r) * 0.5),
            [first, second, rest @ ..] => {
                *first = T::from_sample(l);
                *second = T::from_sample(r);
                rest.fill(T::EQUILIBRIUM);
            },
            [] => {},
        }
    }
}
