use std::sync::Arc;

use serenity::async_trait;
use songbird::tracks::PlayMode;
use tracing::{info, warn};

use super::audio_sink::CompletionSignal;

/// Songbird event handler for when a track ends or errors.
///
/// Registered for both `TrackEvent::End` and `TrackEvent::Error`; the shared
/// signal makes sure the session hears about the track only once.
#[derive(Clone)]
pub struct TrackEndNotifier {
    signal: Arc<CompletionSignal>,
}

impl TrackEndNotifier {
    pub fn new(signal: Arc<CompletionSignal>) -> Self {
        Self { signal }
    }
}

#[async_trait]
impl songbird::EventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &songbird::EventContext<'_>) -> Option<songbird::Event> {
        if let songbird::EventContext::Track(states) = ctx {
            let error = states.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(e.to_string()),
                _ => None,
            });

            match error {
                Some(reason) => {
                    warn!(
                        "Track for generation {} errored: {}",
                        self.signal.generation(),
                        reason
                    );
                    self.signal.failed(reason);
                }
                None => {
                    info!("Track for generation {} ended", self.signal.generation());
                    self.signal.finished();
                }
            }
        }
        None
    }
}
