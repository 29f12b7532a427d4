use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use anyhow::{bail, ensure, Context, Result};
use serde::{Serialize, Deserialize};
use super::channel::{ChannelSettings, CHANNEL_COUNT};
use super::params::{DrumSettings, BITCRUSH_BYPASS, DEFAULT_BIT_DEPTH, DEFAULT_DRUM_CHANNEL};
use super::{Synth, SUPPORTED_SAMPLE_RATES};

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
const MIN_BIT_DEPTH: f32 = 2.0;

/// Settings for one MIDI channel (1-based, as shown to users).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelPatch {
    pub channel: u8,
    #[serde(flatten)]
    pub settings: ChannelSettings,
}

/// Everything a user can configure, as stored in `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SynthConfig {
    pub sample_rate: u32,
    /// 1-based MIDI channel that plays drums.
    pub drum_channel: u8,
    pub bit_depth: f32,
    pub drums: DrumSettings,
    pub channels: Vec<ChannelPatch>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            drum_channel: DEFAULT_DRUM_CHANNEL + 1,
            bit_depth: DEFAULT_BIT_DEPTH,
            drums: DrumSettings::default(),
            channels: Vec::new(),
        }
    }
}

impl SynthConfig {
    /// Location of the per-user configuration file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chipstudio").join("config.json"))
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .with_context(|| format!("Failed to open config file {}", path.display()))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("Failed to read config file")?;

        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        Ok(config)
    }

    /// Loads `explicit` if given, else the per-user file if it exists, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => {
                log::info!("Loading config from {}", path.display());
                Self::load_from_file(&path)
            },
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate),
            "unsupported sample rate {} (expected one of {:?})",
            self.sample_rate,
            SUPPORTED_SAMPLE_RATES
        );
        ensure!(
            (1..=CHANNEL_COUNT as u8).contains(&self.drum_channel),
            "drum channel {} is outside 1-16",
            self.drum_channel
        );
        ensure!(
            (MIN_BIT_DEPTH..=BITCRUSH_BYPASS).contains(&self.bit_depth),
            "bit depth {} is outside {}-{}",
            self.bit_depth,
            MIN_BIT_DEPTH,
            BITCRUSH_BYPASS
        );

        for patch in &self.channels {
            if !(1..=CHANNEL_COUNT as u8).contains(&patch.channel) {
                bail!("channel {} is outside 1-16", patch.channel);
            }
            validate_channel(&patch.settings)
                .with_context(|| format!("channel {}", patch.channel))?;
        }

        Ok(())
    }

    /// Writes every setting into `synth`. The sample rate is fixed at
    /// construction and is not touched.
    pub fn apply(&self, synth: &Synth) {
        let params = synth.params();
        params.set_drum_channel(self.drum_channel.saturating_sub(1));
        params.set_bit_depth(self.bit_depth);
        params.set_drums(&self.drums);

        for patch in &self.channels {
            if let Some(timbre) = synth.channel(patch.channel.saturating_sub(1) as usize) {
                timbre.apply(&patch.settings);
            }
        }
    }

    pub fn build_synth(&self) -> Synth {
        let synth = Synth::new(self.sample_rate);
        self.apply(&synth);
        synth
    }
}

fn validate_channel(settings: &ChannelSettings) -> Result<()> {
    ensure!(
        settings.pulse_width > 0.0 && settings.pulse_width < 1.0,
        "pulse width {} is outside (0, 1)",
        settings.pulse_width
    );
    ensure!(
        (0.0..=1.0).contains(&settings.envelope.sustain),
        "sustain {} is outside [0, 1]",
        settings.envelope.sustain
    );
    ensure!(
        (-1.0..=1.0).contains(&settings.pan),
        "pan {} is outside [-1, 1]",
        settings.pan
    );
    Ok(())
}
