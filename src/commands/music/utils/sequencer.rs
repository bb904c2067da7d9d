//! Per-guild playback sequencer.
//!
//! A [`Sequencer`] owns one guild's queue, its now-playing slot, the loop flag
//! and the audio sink. It is driven by a single task (see [`run`]), which is the
//! only place its state is mutated. Sinks report track ends as [`TrackEnded`]
//! events on a channel that task listens to.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serenity::all::GuildId;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::announcements::{Announcer, Notice};
use super::audio_sink::{AudioSink, CompletionSignal, TrackEnded};
use super::format_duration;
use super::music_manager::{MusicError, MusicResult};
use super::session::{SessionCommand, SessionPhase};
use crate::commands::music::audio_sources::Track;

/// Requested change to the loop flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    On,
    Off,
    Toggle,
}

impl FromStr for LoopMode {
    type Err = MusicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "on" => Ok(LoopMode::On),
            "off" => Ok(LoopMode::Off),
            "" | "toggle" => Ok(LoopMode::Toggle),
            other => Err(MusicError::InvalidCommandArgument(format!(
                "`{}` is not a loop mode. Use `loop on` or `loop off`.",
                other
            ))),
        }
    }
}

/// Where an enqueued track ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// Nothing was playing, so the track started right away.
    Playing(Track),
    /// The track waits in the queue at `position` (1-based).
    Queued { track: Track, position: usize },
}

/// Read-only view of a session for the `queue` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub now_playing: Option<Track>,
    pub paused: bool,
    pub up_next: Vec<Track>,
    pub looping: bool,
}

impl QueueSnapshot {
    pub fn total_queued_duration(&self) -> Duration {
        self.up_next.iter().filter_map(Track::duration).sum()
    }
}

impl fmt::Display for QueueSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.now_playing {
            Some(track) if self.paused => writeln!(f, "Paused: {}", track)?,
            Some(track) => writeln!(f, "Now playing: {}", track)?,
            None => writeln!(f, "No song is playing currently.")?,
        }

        if self.up_next.is_empty() {
            write!(f, "Queue is empty.")?;
        } else {
            write!(f, "Up next:")?;
            for (idx, track) in self.up_next.iter().enumerate() {
                write!(f, "\n{}. {}", idx + 1, track)?;
            }
            let total = self.total_queued_duration();
            if !total.is_zero() {
                write!(f, "\nTotal length: {}", format_duration(total))?;
            }
        }

        if self.looping {
            write!(f, "\nLooping is on.")?;
        }
        Ok(())
    }
}

/// Outcome of one advance: what started, and what was dropped on the way.
#[derive(Debug, Default)]
pub struct Advance {
    pub started: Option<Track>,
    pub failed: Vec<(Track, MusicError)>,
}

#[derive(Debug)]
struct NowPlaying {
    track: Track,
    generation: u64,
    paused: bool,
}

pub struct Sequencer {
    guild_id: GuildId,
    current: Option<NowPlaying>,
    queue: VecDeque<Track>,
    looping: bool,
    capacity: usize,
    generation: u64,
    sink: Box<dyn AudioSink>,
    announcer: Arc<dyn Announcer>,
    events: mpsc::UnboundedSender<TrackEnded>,
}

impl Sequencer {
    /// Creates a sequencer and the receiving end of its completion events.
    pub fn new(
        guild_id: GuildId,
        capacity: usize,
        sink: Box<dyn AudioSink>,
        announcer: Arc<dyn Announcer>,
    ) -> (Self, mpsc::UnboundedReceiver<TrackEnded>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let sequencer = Self {
            guild_id,
            current: None,
            queue: VecDeque::new(),
            looping: false,
            capacity,
            generation: 0,
            sink,
            announcer,
            events,
        };
        (sequencer, receiver)
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref().map(|now| &now.track)
    }

    pub fn queue(&self) -> &VecDeque<Track> {
        &self.queue
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Connected but with nothing playing and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    pub async fn enqueue(&mut self, track: Track) -> MusicResult<Enqueued> {
        if self.queue.len() >= self.capacity {
            return Err(MusicError::QueueFull(self.capacity));
        }

        self.queue.push_back(track.clone());
        info!(
            "Queued '{}' in guild {} ({} waiting)",
            track.title(),
            self.guild_id,
            self.queue.len()
        );

        if self.current.is_some() {
            return Ok(Enqueued::Queued {
                track,
                position: self.queue.len(),
            });
        }

        let mut advance = self.advance().await;
        match advance.started {
            Some(started) => Ok(Enqueued::Playing(started)),
            None => Err(advance
                .failed
                .pop()
                .map(|(_, err)| err)
                .unwrap_or_else(|| MusicError::PlaybackError("Nothing could be played".to_string()))),
        }
    }

    /// Moves the queue forward by one track.
    ///
    /// A finished current track is re-queued at the tail while looping. Tracks the
    /// sink refuses are dropped and the next one is tried.
    pub async fn advance(&mut self) -> Advance {
        if let Some(finished) = self.current.take() {
            if self.looping {
                debug!("Looping '{}' in guild {}", finished.track.title(), self.guild_id);
                self.queue.push_back(finished.track);
            }
        }

        let mut outcome = Advance::default();
        while let Some(track) = self.queue.pop_front() {
            self.generation += 1;
            let signal = CompletionSignal::new(self.generation, self.events.clone());

            match self.sink.play(&track, signal).await {
                Ok(()) => {
                    info!("Now playing '{}' in guild {}", track.title(), self.guild_id);
                    self.current = Some(NowPlaying {
                        track: track.clone(),
                        generation: self.generation,
                        paused: false,
                    });
                    outcome.started = Some(track);
                    return outcome;
                }
                Err(e) => {
                    warn!(
                        "Could not start '{}' in guild {}: {}",
                        track.title(),
                        self.guild_id,
                        e
                    );
                    outcome.failed.push((track, e));
                }
            }
        }

        info!("Queue drained in guild {}", self.guild_id);
        outcome
    }

    /// Handles a completion event. Returns whether the queue advanced.
    ///
    /// Events for anything but the current track's generation are ignored, so a
    /// skip racing a natural end advances only once.
    pub async fn on_track_end(&mut self, ended: TrackEnded) -> bool {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|now| now.generation == ended.generation);
        if !is_current {
            debug!(
                "Ignoring stale completion for generation {} in guild {}",
                ended.generation, self.guild_id
            );
            return false;
        }

        if let Some(reason) = ended.error {
            // Errored tracks are not recycled by loop mode.
            if let Some(failed) = self.current.take() {
                warn!(
                    "Playback of '{}' failed in guild {}: {}",
                    failed.track.title(),
                    self.guild_id,
                    reason
                );
                self.announcer
                    .announce(Notice::PlaybackFailed {
                        track: failed.track,
                        reason,
                    })
                    .await;
            }
        }

        let advance = self.advance().await;
        for (track, err) in advance.failed {
            self.announcer
                .announce(Notice::PlaybackFailed {
                    track,
                    reason: err.to_string(),
                })
                .await;
        }
        if let Some(track) = advance.started {
            self.announcer.announce(Notice::NowPlaying(track)).await;
        }
        true
    }

    /// Stops the current track. The queue advances once its completion arrives.
    pub async fn skip(&mut self) -> MusicResult<Track> {
        let track = self.current().cloned().ok_or(MusicError::NothingPlaying)?;
        info!("Skipping '{}' in guild {}", track.title(), self.guild_id);
        self.sink.stop().await;
        Ok(track)
    }

    pub async fn pause(&mut self) -> MusicResult<Track> {
        let now = self.current.as_mut().ok_or(MusicError::NothingPlaying)?;
        if now.paused {
            return Err(MusicError::AlreadyPaused);
        }
        self.sink.pause().await?;
        now.paused = true;
        Ok(now.track.clone())
    }

    pub async fn resume(&mut self) -> MusicResult<Track> {
        let now = self.current.as_mut().ok_or(MusicError::NothingPlaying)?;
        if !now.paused {
            return Err(MusicError::NotPaused);
        }
        self.sink.resume().await?;
        now.paused = false;
        Ok(now.track.clone())
    }

    /// Applies `mode` and returns the resulting loop flag.
    pub fn set_loop(&mut self, mode: LoopMode) -> bool {
        self.looping = match mode {
            LoopMode::On => true,
            LoopMode::Off => false,
            LoopMode::Toggle => !self.looping,
        };
        info!("Looping in guild {} is now {}", self.guild_id, self.looping);
        self.looping
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            now_playing: self.current().cloned(),
            paused: self.current.as_ref().is_some_and(|now| now.paused),
            up_next: self.queue.iter().cloned().collect(),
            looping: self.looping,
        }
    }

    /// Clears everything and leaves the voice channel.
    pub async fn stop(&mut self) {
        self.queue.clear();
        if self.current.take().is_some() {
            self.sink.stop().await;
        }
        self.sink.disconnect().await;
        info!("Stopped playback in guild {}", self.guild_id);
    }

    async fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Enqueue { track, reply } => {
                let _ = reply.send(self.enqueue(track).await);
            }
            SessionCommand::Skip { reply } => {
                let _ = reply.send(self.skip().await);
            }
            SessionCommand::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            SessionCommand::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            SessionCommand::SetLoop { mode, reply } => {
                let _ = reply.send(self.set_loop(mode));
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionCommand::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
        }
    }
}

async fn idle_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Drives a session until it is stopped, all command senders are dropped, or it
/// stays idle for `idle_timeout`.
///
/// Completion events are polled before commands, so an end-of-track that was
/// delivered first is always applied before a later command sees the state.
/// The idle deadline is set when the session becomes idle and only cleared once
/// something is playing or queued again; commands served meanwhile do not
/// extend it.
pub async fn run(
    mut sequencer: Sequencer,
    mut events: mpsc::UnboundedReceiver<TrackEnded>,
    mut commands: mpsc::Receiver<SessionCommand>,
    phase: watch::Sender<SessionPhase>,
    idle_timeout: Option<Duration>,
) {
    let guild_id = sequencer.guild_id();
    info!("Session started for guild {}", guild_id);

    let mut idle_deadline: Option<Instant> = None;
    let stop_request = loop {
        idle_deadline = match idle_timeout {
            Some(timeout) if sequencer.is_idle() => {
                Some(idle_deadline.unwrap_or_else(|| Instant::now() + timeout))
            }
            _ => None,
        };

        tokio::select! {
            biased;

            Some(ended) = events.recv() => {
                sequencer.on_track_end(ended).await;
            }
            command = commands.recv() => match command {
                Some(command @ SessionCommand::Stop { .. }) => break Some(command),
                Some(command) => sequencer.handle(command).await,
                None => {
                    debug!("All handles to guild {} dropped", guild_id);
                    break None;
                }
            },
            _ = idle_expiry(idle_deadline), if idle_deadline.is_some() => {
                info!("Guild {} idle for too long, disconnecting", guild_id);
                phase.send_replace(SessionPhase::Stopping);
                sequencer.announcer.announce(Notice::IdleDisconnect).await;
                break None;
            }
        }
    };

    phase.send_replace(SessionPhase::Stopping);
    match stop_request {
        Some(command) => sequencer.handle(command).await,
        None => sequencer.stop().await,
    }
    phase.send_replace(SessionPhase::Ended);

    info!("Session ended for guild {}", guild_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::music::utils::announcements::LogAnnouncer;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serenity::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct SinkState {
        played: Vec<String>,
        signals: Vec<Arc<CompletionSignal>>,
        refuse: HashSet<String>,
        stops: usize,
        disconnected: bool,
    }

    /// Sink that records calls; `stop` fires the active signal like songbird does.
    #[derive(Clone, Default)]
    struct FakeSink(Arc<Mutex<SinkState>>);

    impl FakeSink {
        fn refuse(&self, locator: &str) {
            self.0.lock().unwrap().refuse.insert(locator.to_string());
        }

        fn played(&self) -> Vec<String> {
            self.0.lock().unwrap().played.clone()
        }

        fn signal(&self, idx: usize) -> Arc<CompletionSignal> {
            self.0.lock().unwrap().signals[idx].clone()
        }
    }

    #[async_trait]
    impl AudioSink for FakeSink {
        async fn play(&mut self, track: &Track, done: CompletionSignal) -> MusicResult<()> {
            let mut state = self.0.lock().unwrap();
            if state.refuse.contains(track.stream_locator()) {
                return Err(MusicError::PlaybackError("refused".to_string()));
            }
            state.played.push(track.title().to_string());
            state.signals.push(Arc::new(done));
            Ok(())
        }

        async fn stop(&mut self) {
            let mut state = self.0.lock().unwrap();
            state.stops += 1;
            if let Some(signal) = state.signals.last() {
                signal.finished();
            }
        }

        async fn pause(&mut self) -> MusicResult<()> {
            Ok(())
        }

        async fn resume(&mut self) -> MusicResult<()> {
            Ok(())
        }

        async fn disconnect(&mut self) {
            self.0.lock().unwrap().disconnected = true;
        }
    }

    fn track(name: &str) -> Track {
        Track::new(name, format!("https://cdn.example/{}", name))
    }

    fn sequencer(
        capacity: usize,
    ) -> (Sequencer, mpsc::UnboundedReceiver<TrackEnded>, FakeSink) {
        let sink = FakeSink::default();
        let (sequencer, events) = Sequencer::new(
            GuildId::new(1),
            capacity,
            Box::new(sink.clone()),
            Arc::new(LogAnnouncer),
        );
        (sequencer, events, sink)
    }

    fn titles(sequencer: &Sequencer) -> Vec<String> {
        sequencer
            .queue()
            .iter()
            .map(|t| t.title().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_first_enqueue_starts_rest_wait_in_order() {
        let (mut seq, _events, sink) = sequencer(10);

        assert_eq!(seq.enqueue(track("a")).await.unwrap(), Enqueued::Playing(track("a")));
        assert_eq!(
            seq.enqueue(track("b")).await.unwrap(),
            Enqueued::Queued {
                track: track("b"),
                position: 1
            }
        );
        seq.enqueue(track("c")).await.unwrap();

        assert_eq!(seq.current(), Some(&track("a")));
        assert_eq!(titles(&seq), ["b", "c"]);
        assert_eq!(sink.played(), ["a"]);
    }

    #[tokio::test]
    async fn test_completion_advances_to_next() {
        let (mut seq, mut events, sink) = sequencer(10);
        seq.enqueue(track("a")).await.unwrap();
        seq.enqueue(track("b")).await.unwrap();

        sink.signal(0).finished();
        let ended = events.recv().await.unwrap();
        assert!(seq.on_track_end(ended).await);

        assert_eq!(seq.current(), Some(&track("b")));
        assert!(seq.queue().is_empty());
    }

    #[tokio::test]
    async fn test_stale_generation_is_ignored() {
        let (mut seq, _events, _sink) = sequencer(10);
        seq.enqueue(track("a")).await.unwrap();
        seq.enqueue(track("b")).await.unwrap();

        let stale = TrackEnded {
            generation: 99,
            error: None,
        };
        assert!(!seq.on_track_end(stale).await);
        assert_eq!(seq.current(), Some(&track("a")));
    }

    #[tokio::test]
    async fn test_skip_then_natural_end_advances_once() {
        let (mut seq, mut events, sink) = sequencer(10);
        seq.enqueue(track("a")).await.unwrap();
        seq.enqueue(track("b")).await.unwrap();
        seq.enqueue(track("c")).await.unwrap();

        assert_eq!(seq.skip().await.unwrap(), track("a"));
        // The natural end lands while the skip's completion is still in flight.
        sink.signal(0).finished();

        let ended = events.recv().await.unwrap();
        assert!(seq.on_track_end(ended.clone()).await);
        // Even a duplicate delivery of the same event must not advance again.
        assert!(!seq.on_track_end(ended).await);
        assert!(events.try_recv().is_err());

        assert_eq!(seq.current(), Some(&track("b")));
        assert_eq!(titles(&seq), ["c"]);
    }

    #[tokio::test]
    async fn test_loop_single_track_repeats_with_empty_queue() {
        let (mut seq, mut events, sink) = sequencer(10);
        seq.set_loop(LoopMode::On);
        seq.enqueue(track("a")).await.unwrap();

        for round in 0..3 {
            sink.signal(round).finished();
            let ended = events.recv().await.unwrap();
            assert!(seq.on_track_end(ended).await);
            assert_eq!(seq.current(), Some(&track("a")));
            assert!(seq.queue().is_empty());
        }
        assert_eq!(sink.played(), ["a", "a", "a", "a"]);
    }

    #[tokio::test]
    async fn test_loop_requeues_finished_track_at_tail() {
        let (mut seq, mut events, sink) = sequencer(10);
        seq.enqueue(track("a")).await.unwrap();
        seq.enqueue(track("b")).await.unwrap();
        seq.set_loop(LoopMode::On);

        sink.signal(0).finished();
        let ended = events.recv().await.unwrap();
        seq.on_track_end(ended).await;

        assert_eq!(seq.current(), Some(&track("b")));
        assert_eq!(titles(&seq), ["a"]);
    }

    #[tokio::test]
    async fn test_errored_track_is_not_looped() {
        let (mut seq, mut events, sink) = sequencer(10);
        seq.set_loop(LoopMode::On);
        seq.enqueue(track("a")).await.unwrap();
        seq.enqueue(track("b")).await.unwrap();

        sink.signal(0).failed("connection reset");
        let ended = events.recv().await.unwrap();
        seq.on_track_end(ended).await;

        assert_eq!(seq.current(), Some(&track("b")));
        assert!(seq.queue().is_empty());
    }

    #[tokio::test]
    async fn test_refused_tracks_are_skipped() {
        let (mut seq, mut events, sink) = sequencer(10);
        sink.refuse("https://cdn.example/b");
        seq.enqueue(track("a")).await.unwrap();
        seq.enqueue(track("b")).await.unwrap();
        seq.enqueue(track("c")).await.unwrap();

        sink.signal(0).finished();
        let ended = events.recv().await.unwrap();
        seq.on_track_end(ended).await;

        assert_eq!(seq.current(), Some(&track("c")));
        assert_eq!(sink.played(), ["a", "c"]);
    }

    #[tokio::test]
    async fn test_refused_first_track_reports_error_and_stays_empty() {
        let (mut seq, _events, sink) = sequencer(10);
        sink.refuse("https://cdn.example/a");

        assert_matches!(
            seq.enqueue(track("a")).await,
            Err(MusicError::PlaybackError(_))
        );
        assert!(seq.is_idle());
    }

    #[tokio::test]
    async fn test_queue_full_rejects_without_mutation() {
        let (mut seq, _events, _sink) = sequencer(1);
        seq.enqueue(track("a")).await.unwrap();
        seq.enqueue(track("b")).await.unwrap();

        assert_matches!(seq.enqueue(track("c")).await, Err(MusicError::QueueFull(1)));
        assert_eq!(titles(&seq), ["b"]);
    }

    #[tokio::test]
    async fn test_skip_and_pause_require_a_track() {
        let (mut seq, _events, _sink) = sequencer(10);
        assert_matches!(seq.skip().await, Err(MusicError::NothingPlaying));
        assert_matches!(seq.pause().await, Err(MusicError::NothingPlaying));
        assert_matches!(seq.resume().await, Err(MusicError::NothingPlaying));
    }

    #[tokio::test]
    async fn test_pause_resume_state() {
        let (mut seq, _events, _sink) = sequencer(10);
        seq.enqueue(track("a")).await.unwrap();

        assert_matches!(seq.resume().await, Err(MusicError::NotPaused));
        assert_eq!(seq.pause().await.unwrap(), track("a"));
        assert!(seq.snapshot().paused);
        assert_matches!(seq.pause().await, Err(MusicError::AlreadyPaused));
        assert_eq!(seq.resume().await.unwrap(), track("a"));
    }

    #[tokio::test]
    async fn test_stop_clears_and_disconnects() {
        let (mut seq, mut events, sink) = sequencer(10);
        seq.enqueue(track("a")).await.unwrap();
        seq.enqueue(track("b")).await.unwrap();

        seq.stop().await;
        assert!(seq.is_idle());
        assert!(sink.0.lock().unwrap().disconnected);

        // The completion for the stopped track arrives afterwards and is ignored.
        let ended = events.recv().await.unwrap();
        assert!(!seq.on_track_end(ended).await);
        assert!(seq.current().is_none());
    }

    #[test]
    fn test_set_loop_toggles() {
        let (mut seq, _events, _sink) = sequencer(10);
        assert!(seq.set_loop(LoopMode::Toggle));
        assert!(!seq.set_loop(LoopMode::Toggle));
        assert!(seq.set_loop(LoopMode::On));
        assert!(seq.set_loop(LoopMode::On));
        assert!(!seq.set_loop(LoopMode::Off));
    }

    #[test]
    fn test_loop_mode_parsing() {
        assert_eq!("ON".parse::<LoopMode>().unwrap(), LoopMode::On);
        assert_eq!(" off ".parse::<LoopMode>().unwrap(), LoopMode::Off);
        assert_eq!("".parse::<LoopMode>().unwrap(), LoopMode::Toggle);
        assert_matches!(
            "forever".parse::<LoopMode>(),
            Err(MusicError::InvalidCommandArgument(_))
        );
    }

    #[test]
    fn test_snapshot_listing() {
        let snapshot = QueueSnapshot {
            now_playing: Some(track("a")),
            paused: false,
            up_next: vec![
                track("b").with_duration(Duration::from_secs(60)),
                track("c").with_duration(Duration::from_secs(90)),
            ],
            looping: true,
        };

        assert_eq!(
            snapshot.to_string(),
            "Now playing: a\nUp next:\n1. b (1:00)\n2. c (1:30)\nTotal length: 2:30\nLooping is on."
        );
        assert_eq!(
            QueueSnapshot::default().to_string(),
            "No song is playing currently.\nQueue is empty."
        );
    }
}
