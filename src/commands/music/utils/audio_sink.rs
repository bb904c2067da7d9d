//! The audio sink: where a session sends tracks to be transcoded and played.
//!
//! A sink reports the end of every track it accepted through a
//! [`CompletionSignal`]. The signal only posts an event back to the owning
//! session; it never touches session state itself.

use serenity::all::GuildId;
use serenity::async_trait;
use serenity::prelude::Mutex as SerenityMutex;
use songbird::input::{ChildContainer, Input};
use songbird::tracks::TrackHandle;
use songbird::{Call, Event, Songbird, TrackEvent};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::event_handlers::TrackEndNotifier;
use super::music_manager::{MusicError, MusicResult};
use crate::commands::music::audio_sources::Track;
use crate::config::FfmpegOptions;

/// Event posted to a session when the track started under `generation` stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEnded {
    pub generation: u64,
    /// `Some` when playback failed instead of running to the end or being stopped.
    pub error: Option<String>,
}

/// Exactly-once completion notification for one started track.
#[derive(Debug)]
pub struct CompletionSignal {
    generation: u64,
    fired: AtomicBool,
    events: mpsc::UnboundedSender<TrackEnded>,
}

impl CompletionSignal {
    pub fn new(generation: u64, events: mpsc::UnboundedSender<TrackEnded>) -> Self {
        Self {
            generation,
            fired: AtomicBool::new(false),
            events,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The track ended normally or was stopped.
    pub fn finished(&self) {
        self.fire(None);
    }

    /// The track errored mid-stream.
    pub fn failed(&self, reason: impl Into<String>) {
        self.fire(Some(reason.into()));
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    fn fire(&self, error: Option<String>) {
        if self.fired.swap(true, Ordering::AcqRel) {
            debug!("Ignoring repeated completion for generation {}", self.generation);
            return;
        }

        let event = TrackEnded {
            generation: self.generation,
            error,
        };
        if self.events.send(event).is_err() {
            debug!("Session for generation {} is already gone", self.generation);
        }
    }
}

/// Something that can play one track at a time for a session.
///
/// After `play` returns `Ok`, the sink must fire `done` exactly once, whether the
/// track ends naturally, is stopped, or errors. If `play` returns `Err` the
/// signal is dropped without firing.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&mut self, track: &Track, done: CompletionSignal) -> MusicResult<()>;

    /// Cancel the active stream. Its completion signal still fires.
    async fn stop(&mut self);

    async fn pause(&mut self) -> MusicResult<()>;

    async fn resume(&mut self) -> MusicResult<()>;

    /// Release the voice connection.
    async fn disconnect(&mut self);
}

/// Plays tracks into a songbird call through an ffmpeg child process.
pub struct SongbirdSink {
    songbird: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<SerenityMutex<Call>>,
    ffmpeg: FfmpegOptions,
    current: Option<TrackHandle>,
}

impl SongbirdSink {
    pub fn new(
        songbird: Arc<Songbird>,
        guild_id: GuildId,
        call: Arc<SerenityMutex<Call>>,
        ffmpeg: FfmpegOptions,
    ) -> Self {
        Self {
            songbird,
            guild_id,
            call,
            ffmpeg,
            current: None,
        }
    }

    fn spawn_ffmpeg(&self, track: &Track) -> MusicResult<Input> {
        let child = Command::new(&self.ffmpeg.binary)
            .args(self.ffmpeg.args(track.stream_locator()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MusicError::PlaybackError(format!("Failed to start ffmpeg: {}", e)))?;

        Ok(ChildContainer::from(child).into())
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn play(&mut self, track: &Track, done: CompletionSignal) -> MusicResult<()> {
        let input = self.spawn_ffmpeg(track)?;

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };
        info!("Streaming '{}' in guild {}", track.title(), self.guild_id);

        let notifier = TrackEndNotifier::new(Arc::new(done));
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
                let _ = handle.stop();
                return Err(MusicError::PlaybackError(format!(
                    "Failed to watch track events: {}",
                    e
                )));
            }
        }

        self.current = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(handle) = self.current.take() {
            if let Err(e) = handle.stop() {
                debug!("Track in guild {} was already finished: {}", self.guild_id, e);
            }
        }
    }

    async fn pause(&mut self) -> MusicResult<()> {
        let handle = self.current.as_ref().ok_or(MusicError::NothingPlaying)?;
        handle
            .pause()
            .map_err(|e| MusicError::PlaybackError(e.to_string()))
    }

    async fn resume(&mut self) -> MusicResult<()> {
        let handle = self.current.as_ref().ok_or(MusicError::NothingPlaying)?;
        handle
            .play()
            .map_err(|e| MusicError::PlaybackError(e.to_string()))
    }

    async fn disconnect(&mut self) {
        self.stop().await;

        if self.songbird.get(self.guild_id).is_none() {
            debug!("Guild {} has no voice call to leave", self.guild_id);
            return;
        }
        if let Err(e) = self.songbird.remove(self.guild_id).await {
            warn!("Failed to leave voice channel in guild {}: {}", self.guild_id, e);
        }
    }
}
