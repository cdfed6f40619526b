//! Conversation transcript with in-place fragment merging.

use crate::session::message::Speaker;

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub is_final: bool,
}

/// Ordered transcript of a conversation.
///
/// Streaming transcription arrives as growing fragments; a non-final
/// fragment from the same speaker replaces the trailing non-final entry
/// instead of appending, so the log reads as finished lines plus at most
/// one line in progress per turn.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fragment, merging into the trailing non-final entry when
    /// the speaker matches.
    pub fn push(&mut self, speaker: Speaker, text: &str, is_final: bool) {
        if let Some(last) = self.entries.last_mut()
            && last.speaker == speaker
            && !last.is_final
        {
            last.text = text.to_string();
            last.is_final = is_final;
            return;
        }
        self.entries.push(TranscriptEntry {
            speaker,
            text: text.to_string(),
            is_final,
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
