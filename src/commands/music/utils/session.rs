//! Messages into a running session and the cloneable handle that sends them.

use tokio::sync::{mpsc, oneshot, watch};

use super::music_manager::{MusicError, MusicResult};
use super::sequencer::{Enqueued, LoopMode, QueueSnapshot};
use crate::commands::music::audio_sources::Track;

/// Capacity of a session's command channel.
pub const COMMAND_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug)]
pub enum SessionCommand {
    Enqueue {
        track: Track,
        reply: oneshot::Sender<MusicResult<Enqueued>>,
    },
    Skip {
        reply: oneshot::Sender<MusicResult<Track>>,
    },
    Pause {
        reply: oneshot::Sender<MusicResult<Track>>,
    },
    Resume {
        reply: oneshot::Sender<MusicResult<Track>>,
    },
    SetLoop {
        mode: LoopMode,
        reply: oneshot::Sender<bool>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// Lifecycle of a session task, published to every handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Running,
    /// Leaving the voice channel; no further commands are served.
    Stopping,
    /// The voice connection has been released.
    Ended,
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    phase: watch::Receiver<SessionPhase>,
}

impl SessionHandle {
    pub fn new(
        commands: mpsc::Sender<SessionCommand>,
        phase: watch::Receiver<SessionPhase>,
    ) -> Self {
        Self { commands, phase }
    }

    pub fn phase(&self) -> SessionPhase {
        match *self.phase.borrow() {
            // The task is gone without saying so, e.g. it panicked.
            SessionPhase::Running if self.commands.is_closed() => SessionPhase::Ended,
            phase => phase,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase() == SessionPhase::Running
    }

    pub fn is_ended(&self) -> bool {
        self.phase() == SessionPhase::Ended
    }

    /// Completes once the session has released its voice connection.
    pub async fn closed(&self) {
        let mut phase = self.phase.clone();
        // An error means the task dropped its sender, which only happens on exit.
        let _ = phase.wait_for(|p| *p == SessionPhase::Ended).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> MusicResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| MusicError::NotConnected)?;
        response.await.map_err(|_| MusicError::NotConnected)
    }

    pub async fn enqueue(&self, track: Track) -> MusicResult<Enqueued> {
        self.request(|reply| SessionCommand::Enqueue { track, reply })
            .await?
    }

    pub async fn skip(&self) -> MusicResult<Track> {
        self.request(|reply| SessionCommand::Skip { reply }).await?
    }

    pub async fn pause(&self) -> MusicResult<Track> {
        self.request(|reply| SessionCommand::Pause { reply }).await?
    }

    pub async fn resume(&self) -> MusicResult<Track> {
        self.request(|reply| SessionCommand::Resume { reply }).await?
    }

    pub async fn set_loop(&self, mode: LoopMode) -> MusicResult<bool> {
        self.request(|reply| SessionCommand::SetLoop { mode, reply })
            .await
    }

    pub async fn snapshot(&self) -> MusicResult<QueueSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Stops the session and waits until it has left the voice channel.
    pub async fn stop(&self) -> MusicResult<()> {
        self.request(|reply| SessionCommand::Stop { reply }).await
    }
}
