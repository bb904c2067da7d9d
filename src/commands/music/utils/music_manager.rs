use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::announcements::Announcer;
use super::audio_sink::AudioSink;
use super::sequencer::{self, Enqueued, LoopMode, QueueSnapshot, Sequencer};
use super::session::{COMMAND_CHANNEL_CAPACITY, SessionHandle, SessionPhase};
use crate::commands::music::audio_sources::{Track, TrackResolver};
use crate::config::MusicConfig;

/// Errors that can occur during music operations
#[derive(Error, Debug)]
pub enum MusicError {
    #[error("Not in a guild")]
    NotInGuild,

    #[error("Connect to a voice channel first.")]
    UserNotInVoiceChannel,

    #[error("Not connected to a voice channel")]
    NotConnected,

    #[error("Failed to get voice manager")]
    NoVoiceManager,

    #[error("Failed to join voice channel: {0}")]
    JoinError(String),

    #[error("Could not retrieve song: {0}")]
    ResolutionFailure(String),

    #[error("Playback failed: {0}")]
    PlaybackError(String),

    #[error("Invalid argument: {0}")]
    InvalidCommandArgument(String),

    #[error("The queue is full ({0} tracks)")]
    QueueFull(usize),

    #[error("No song is playing")]
    NothingPlaying,

    #[error("The song is already paused")]
    AlreadyPaused,

    #[error("The song is not paused")]
    NotPaused,
}

/// Result type for music operations
pub type MusicResult<T> = Result<T, MusicError>;

/// Owns one playback session per guild.
///
/// Each session runs as its own task; the manager only keeps the handles used to
/// talk to them.
pub struct MusicManager {
    sessions: DashMap<GuildId, SessionHandle>,
    queue_capacity: usize,
    idle_timeout: Option<Duration>,
}

impl MusicManager {
    pub fn new(config: &MusicConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            queue_capacity: config.queue_capacity,
            idle_timeout: config.idle_timeout,
        }
    }

    /// Returns the guild's session, or starts one with the sink and announcer
    /// built by `make`. `make` is not called while a session still holds the
    /// guild, including one that is leaving its voice channel.
    pub fn open_with<F>(&self, guild_id: GuildId, make: F) -> SessionHandle
    where
        F: FnOnce() -> (Box<dyn AudioSink>, Arc<dyn Announcer>),
    {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(entry) if !entry.get().is_ended() => entry.get().clone(),
            entry => {
                let (sink, announcer) = make();
                let handle = self.spawn_session(guild_id, sink, announcer);
                info!("Opened music session for guild {}", guild_id);
                entry.insert(handle.clone());
                handle
            }
        }
    }

    fn spawn_session(
        &self,
        guild_id: GuildId,
        sink: Box<dyn AudioSink>,
        announcer: Arc<dyn Announcer>,
    ) -> SessionHandle {
        let (sequencer, events) = Sequencer::new(guild_id, self.queue_capacity, sink, announcer);
        let (commands, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (phase, phase_receiver) = watch::channel(SessionPhase::Running);
        tokio::spawn(sequencer::run(
            sequencer,
            events,
            receiver,
            phase,
            self.idle_timeout,
        ));
        SessionHandle::new(commands, phase_receiver)
    }

    fn prune(&self, guild_id: GuildId) {
        if self
            .sessions
            .remove_if(&guild_id, |_, current| current.is_ended())
            .is_some()
        {
            debug!("Pruned ended session for guild {}", guild_id);
        }
    }

    fn registered(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|entry| entry.value().clone())
    }

    /// The guild's running session. Sessions that ended on their own are pruned.
    pub fn session(&self, guild_id: GuildId) -> MusicResult<SessionHandle> {
        let handle = self.registered(guild_id).ok_or(MusicError::NotConnected)?;
        match handle.phase() {
            SessionPhase::Running => Ok(handle),
            SessionPhase::Stopping => Err(MusicError::NotConnected),
            SessionPhase::Ended => {
                self.prune(guild_id);
                Err(MusicError::NotConnected)
            }
        }
    }

    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.session(guild_id).is_ok()
    }

    /// Waits for a session that is leaving the guild's voice channel to finish,
    /// so a new connection is not torn down by the old one.
    pub async fn settle(&self, guild_id: GuildId) {
        if let Some(handle) = self.registered(guild_id) {
            if handle.phase() == SessionPhase::Stopping {
                debug!("Waiting for guild {} to leave its voice channel", guild_id);
                handle.closed().await;
            }
        }
        self.prune(guild_id);
    }

    /// Resolves `query` and queues the result for a listener in `listener_channel`.
    /// Nothing is queued when resolution fails.
    pub async fn play(
        &self,
        guild_id: GuildId,
        listener_channel: Option<ChannelId>,
        resolver: &dyn TrackResolver,
        query: &str,
    ) -> MusicResult<Enqueued> {
        listener_channel.ok_or(MusicError::UserNotInVoiceChannel)?;
        let session = self.session(guild_id)?;

        let track = resolver.resolve(query).await.inspect_err(|e| {
            warn!("Failed to resolve `{}` for guild {}: {}", query, guild_id, e);
        })?;

        session.enqueue(track).await
    }

    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<Track> {
        self.session(guild_id)?.skip().await
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<Track> {
        self.session(guild_id)?.pause().await
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<Track> {
        self.session(guild_id)?.resume().await
    }

    pub async fn set_loop(&self, guild_id: GuildId, mode: LoopMode) -> MusicResult<bool> {
        self.session(guild_id)?.set_loop(mode).await
    }

    /// Listing for the guild; empty when no session is open.
    pub async fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        match self.session(guild_id) {
            Ok(session) => session.snapshot().await.unwrap_or_default(),
            Err(_) => QueueSnapshot::default(),
        }
    }

    /// Stops the guild's session and waits until it has left the voice channel.
    /// Returns `false` if there was no running session.
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        let Some(handle) = self.registered(guild_id) else {
            return false;
        };

        let stopped = handle.is_running() && handle.stop().await.is_ok();
        // Kept registered until the connection is released.
        handle.closed().await;
        self.prune(guild_id);

        if stopped {
            info!("Closed music session for guild {}", guild_id);
        } else {
            debug!("Session for guild {} had already ended", guild_id);
        }
        stopped
    }

    /// Stops every session, e.g. on shutdown.
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        info!("Stopping {} music session(s)", guilds.len());
        join_all(guilds.into_iter().map(|guild_id| self.stop(guild_id))).await;
    }
}
