//! Mock implementations for the session's external collaborators

use async_trait::async_trait;
use jukebox::commands::music::audio_sources::{Track, TrackResolver};
use jukebox::commands::music::utils::announcements::{Announcer, Notice};
use jukebox::commands::music::utils::audio_sink::{AudioSink, CompletionSignal};
use jukebox::commands::music::utils::music_manager::{MusicError, MusicManager, MusicResult};
use jukebox::commands::music::utils::session::SessionHandle;
use mockall::mock;
use serenity::all::GuildId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

mock! {
    pub Resolver {}

    #[async_trait]
    impl TrackResolver for Resolver {
        async fn candidates(&self, query: &str) -> MusicResult<Vec<Track>>;
    }
}

#[derive(Default)]
pub struct SinkLog {
    pub played: Vec<Track>,
    pub signals: Vec<Arc<CompletionSignal>>,
    pub refused: HashSet<String>,
    pub stops: usize,
    pub pauses: usize,
    pub resumes: usize,
    pub disconnects: usize,
    pub disconnect_gate: Option<Arc<Notify>>,
}

/// Sink that records what it was asked to do.
///
/// Like songbird, stopping the active track fires its completion signal.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
}

impl RecordingSink {
    pub fn played_titles(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .played
            .iter()
            .map(|t| t.title().to_string())
            .collect()
    }

    pub fn refuse(&self, track: &Track) {
        self.log
            .lock()
            .unwrap()
            .refused
            .insert(track.stream_locator().to_string());
    }

    fn last_signal(&self) -> Arc<CompletionSignal> {
        self.log
            .lock()
            .unwrap()
            .signals
            .last()
            .cloned()
            .expect("no track was started")
    }

    /// The active track runs to its natural end.
    pub fn finish_current(&self) {
        self.last_signal().finished();
    }

    /// The `index`-th started track reaches its natural end, whether or not it is
    /// still the active one.
    pub fn finish_started(&self, index: usize) {
        let signal = self.log.lock().unwrap().signals[index].clone();
        signal.finished();
    }

    /// The active track breaks mid-stream.
    pub fn fail_current(&self, reason: &str) {
        self.last_signal().failed(reason);
    }

    /// Makes `disconnect` wait until the returned gate is notified.
    pub fn hold_disconnect(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.log.lock().unwrap().disconnect_gate = Some(gate.clone());
        gate
    }

    pub fn stops(&self) -> usize {
        self.log.lock().unwrap().stops
    }

    pub fn disconnects(&self) -> usize {
        self.log.lock().unwrap().disconnects
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&mut self, track: &Track, done: CompletionSignal) -> MusicResult<()> {
        let mut log = self.log.lock().unwrap();
        if log.refused.contains(track.stream_locator()) {
            return Err(MusicError::PlaybackError("ffmpeg exited".to_string()));
        }
        log.played.push(track.clone());
        log.signals.push(Arc::new(done));
        Ok(())
    }

    async fn stop(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.stops += 1;
        if let Some(signal) = log.signals.last() {
            signal.finished();
        }
    }

    async fn pause(&mut self) -> MusicResult<()> {
        self.log.lock().unwrap().pauses += 1;
        Ok(())
    }

    async fn resume(&mut self) -> MusicResult<()> {
        self.log.lock().unwrap().resumes += 1;
        Ok(())
    }

    async fn disconnect(&mut self) {
        let gate = self.log.lock().unwrap().disconnect_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.log.lock().unwrap().disconnects += 1;
    }
}

/// Announcer that keeps every notice for later inspection
#[derive(Clone, Default)]
pub struct RecordingAnnouncer {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingAnnouncer {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn announce(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// Opens a session for `guild_id` backed by recording collaborators.
pub fn open_session(
    manager: &MusicManager,
    guild_id: GuildId,
) -> (SessionHandle, RecordingSink, RecordingAnnouncer) {
    let sink = RecordingSink::default();
    let announcer = RecordingAnnouncer::default();
    let handle = {
        let sink = sink.clone();
        let announcer = announcer.clone();
        manager.open_with(guild_id, move || {
            (
                Box::new(sink) as Box<dyn AudioSink>,
                Arc::new(announcer) as Arc<dyn Announcer>,
            )
        })
    };
    (handle, sink, announcer)
}
