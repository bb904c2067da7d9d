//! Runtime configuration read from the process environment (after `.env` is loaded).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_PREFIX: &str = "!";
const DEFAULT_QUEUE_CAPACITY: usize = 100;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_RECONNECT_DELAY_MAX: u32 = 5;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Options passed to the ffmpeg process that transcodes a stream for the voice driver.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegOptions {
    pub binary: String,
    /// Upper bound in seconds for ffmpeg's reconnect backoff on dropped streams.
    pub reconnect_delay_max: u32,
}

impl Default for FfmpegOptions {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            reconnect_delay_max: DEFAULT_RECONNECT_DELAY_MAX,
        }
    }
}

impl FfmpegOptions {
    /// Arguments that read `locator` and write 48kHz stereo WAV to stdout.
    pub fn args(&self, locator: &str) -> Vec<String> {
        let mut args: Vec<String> = [
            "-reconnect",
            "1",
            "-reconnect_streamed",
            "1",
            "-reconnect_delay_max",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(self.reconnect_delay_max.to_string());
        args.extend(
            [
                "-i", locator, "-vn", "-loglevel", "error", "-f", "wav", "-ac", "2", "-ar",
                "48000", "pipe:1",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusicConfig {
    pub command_prefix: String,
    pub queue_capacity: usize,
    /// `None` keeps idle sessions connected forever.
    pub idle_timeout: Option<Duration>,
    pub ytdlp_path: String,
    pub ffmpeg: FfmpegOptions,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            command_prefix: DEFAULT_PREFIX.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            idle_timeout: Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg: FfmpegOptions::default(),
        }
    }
}

impl MusicConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup, falling back to defaults
    /// for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let queue_capacity = parse_or(&lookup, "MUSIC_QUEUE_CAPACITY", defaults.queue_capacity)?;
        if queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "MUSIC_QUEUE_CAPACITY",
                reason: "must be greater than zero".to_string(),
            });
        }

        let idle_secs: u64 = parse_or(&lookup, "MUSIC_IDLE_TIMEOUT_SECS", DEFAULT_IDLE_TIMEOUT_SECS)?;
        let idle_timeout = (idle_secs > 0).then(|| Duration::from_secs(idle_secs));

        Ok(Self {
            command_prefix: lookup("COMMAND_PREFIX")
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(defaults.command_prefix),
            queue_capacity,
            idle_timeout,
            ytdlp_path: lookup("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            ffmpeg: FfmpegOptions {
                binary: lookup("FFMPEG_PATH").unwrap_or(defaults.ffmpeg.binary),
                reconnect_delay_max: parse_or(
                    &lookup,
                    "FFMPEG_RECONNECT_DELAY_MAX",
                    defaults.ffmpeg.reconnect_delay_max,
                )?,
            },
        })
    }
}

pub fn discord_token() -> Result<String, ConfigError> {
    env::var("DISCORD_TOKEN").map_err(|_| ConfigError::Missing("DISCORD_TOKEN"))
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
