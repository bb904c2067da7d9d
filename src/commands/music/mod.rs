pub mod join;
pub mod pause;
pub mod play;
pub mod queue;
pub mod repeat;
pub mod resume;
pub mod skip;
pub mod stop;

pub mod audio_sources;
pub mod utils;

use crate::{CommandResult, Context};
use utils::music_manager::MusicError;

/// All music commands, in the order they are registered.
pub fn commands() -> Vec<poise::Command<crate::Data, crate::Error>> {
    vec![
        join::join(),
        play::play(),
        skip::skip(),
        stop::stop(),
        queue::queue(),
        repeat::repeat(),
        pause::pause(),
        resume::resume(),
    ]
}
