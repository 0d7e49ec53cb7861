//! Transcript storage.
//!
//! A [`Transcript`] is the ordered, append-only sequence of turns for one
//! conversation. Transcripts live for the process lifetime and are keyed by
//! session id in a [`SessionStore`], so concurrent sessions never share
//! history.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::message::Turn;

/// Append-only record of one conversation.
#[derive(Default, Clone, Debug)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Turn> + '_ {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// In-memory map of session id to transcript.
///
/// Each transcript sits behind its own lock so one session's turn (which may
/// block on the model for seconds) never stalls another session's.
#[derive(Default, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<Mutex<Transcript>>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the transcript for `session_id`, creating an empty one on first
    /// use.
    pub async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<Transcript>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(transcript) = sessions.get(session_id) {
                return Arc::clone(transcript);
            }
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Transcript::new()))),
        )
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
