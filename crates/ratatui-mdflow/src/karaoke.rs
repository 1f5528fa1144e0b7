//! Playback-synced highlight positions.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::session::MarkdownSession;

/// Word index one past the last word already spoken at `current_ms`.
///
/// Words are visited in index order and the scan stops at the first word still in the future, so
/// a timestamp that runs backwards hides every later word.
pub fn highlight_index_at(timestamps: &BTreeMap<usize, u64>, current_ms: u64) -> usize {
    let mut index = 0;
    for (&word, &at) in timestamps {
        if current_ms < at {
            break;
        }
        index = word + 1;
    }
    index
}

/// Drives a session's highlight position from a word timestamp table.
#[derive(Debug)]
pub struct KaraokeClock {
    session: Arc<MarkdownSession>,
    timestamps: BTreeMap<usize, u64>,
    playing: bool,
}

impl KaraokeClock {
    pub fn new(session: Arc<MarkdownSession>, timestamps: BTreeMap<usize, u64>) -> Self {
        Self {
            session,
            timestamps,
            playing: false,
        }
    }

    pub fn set_timestamps(&mut self, timestamps: BTreeMap<usize, u64>) {
        self.timestamps = timestamps;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Writes the position for `current_ms` into the session and returns it.
    pub fn sync(&self, current_ms: u64) -> usize {
        let index = highlight_index_at(&self.timestamps, current_ms);
        self.session.set_highlight_position(index);
        index
    }

    /// Stops playback and clears the highlight.
    pub fn reset(&mut self) {
        self.playing = false;
        self.session.set_highlight_position(0);
    }
}
