//! Session-scoped state: transcript, preferences and recently used symbols/queries.
//!
//! Every operation is infallible from the caller's side. Backing failures are
//! logged and the in-memory copy stays authoritative for the rest of the session.

use std::collections::VecDeque;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::db::models::{Message, MessageStatus, Preferences, TimeHorizon};
use crate::db::KeyValueBacking;

pub const TRANSCRIPT_KEY: &str = "transcript";
pub const PREFERENCES_KEY: &str = "preferences";
pub const SELECTED_MODEL_KEY: &str = "selected_model";

pub const DEFAULT_TRANSCRIPT_LIMIT: usize = 50;

/// A single-field change to [`Preferences`].
#[derive(Debug, Clone, PartialEq)]
pub enum PreferenceUpdate {
    SelectedModel(String),
    StreamingEnabled(bool),
    TimeHorizon(TimeHorizon),
}

pub struct SessionStore {
    backing: Box<dyn KeyValueBacking>,
    transcript_limit: usize,
    transcript: Option<VecDeque<Message>>,
    preferences: Option<Preferences>,
}

impl SessionStore {
    pub fn new(backing: Box<dyn KeyValueBacking>) -> Self {
        Self::with_limit(backing, DEFAULT_TRANSCRIPT_LIMIT)
    }

    pub fn with_limit(backing: Box<dyn KeyValueBacking>, transcript_limit: usize) -> Self {
        Self {
            backing,
            transcript_limit,
            transcript: None,
            preferences: None,
        }
    }

    pub fn transcript_limit(&self) -> usize {
        self.transcript_limit
    }

    pub fn load_transcript(&mut self) -> Vec<Message> {
        self.transcript_mut().iter().cloned().collect()
    }

    pub fn load_preferences(&mut self) -> Preferences {
        self.preferences_mut().clone()
    }

    pub fn append_message(&mut self, message: Message) {
        let limit = self.transcript_limit;
        let transcript = self.transcript_mut();
        transcript.push_back(message);
        while transcript.len() > limit {
            transcript.pop_front();
        }
        self.persist_transcript();
    }

    pub fn update_preference(&mut self, update: PreferenceUpdate) {
        let prefs = self.preferences_mut();
        match &update {
            PreferenceUpdate::SelectedModel(model) => prefs.selected_model = model.clone(),
            PreferenceUpdate::StreamingEnabled(enabled) => prefs.streaming_enabled = *enabled,
            PreferenceUpdate::TimeHorizon(horizon) => prefs.time_horizon = *horizon,
        }
        if let PreferenceUpdate::SelectedModel(model) = &update {
            self.write(SELECTED_MODEL_KEY, model);
        }
        self.persist_preferences();
    }

    pub fn record_symbol(&mut self, symbol: &str) {
        if self.preferences_mut().record_symbol(symbol) {
            self.persist_preferences();
        }
    }

    pub fn record_query(&mut self, text: &str) {
        if self.preferences_mut().record_query(text) {
            self.persist_preferences();
        }
    }

    /// Drop the transcript only; preferences survive.
    pub fn clear_transcript(&mut self) {
        self.transcript = Some(VecDeque::new());
        self.remove(TRANSCRIPT_KEY);
    }

    /// Remove all persisted state; later loads return defaults.
    pub fn clear(&mut self) {
        self.transcript = Some(VecDeque::new());
        self.preferences = Some(Preferences::default());
        for key in [TRANSCRIPT_KEY, PREFERENCES_KEY, SELECTED_MODEL_KEY] {
            self.remove(key);
        }
    }

    fn transcript_mut(&mut self) -> &mut VecDeque<Message> {
        if self.transcript.is_none() {
            let mut loaded: VecDeque<Message> =
                self.read::<Vec<Message>>(TRANSCRIPT_KEY).unwrap_or_default().into();
            while loaded.len() > self.transcript_limit {
                loaded.pop_front();
            }
            for message in loaded.iter_mut() {
                message.status = MessageStatus::Final;
            }
            self.transcript = Some(loaded);
        }
        self.transcript.get_or_insert_with(VecDeque::new)
    }

    fn preferences_mut(&mut self) -> &mut Preferences {
        if self.preferences.is_none() {
            let mut prefs = self.read::<Preferences>(PREFERENCES_KEY).unwrap_or_default();
            if let Some(model) = self.read::<String>(SELECTED_MODEL_KEY) {
                prefs.selected_model = model;
            }
            self.preferences = Some(prefs);
        }
        self.preferences.get_or_insert_with(Preferences::default)
    }

    fn persist_transcript(&self) {
        if let Some(transcript) = &self.transcript {
            self.write(TRANSCRIPT_KEY, transcript);
        }
    }

    fn persist_preferences(&self) {
        if let Some(prefs) = &self.preferences {
            self.write(PREFERENCES_KEY, prefs);
        }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backing.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "session read failed; using defaults");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "discarding malformed session record");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "failed to encode session record");
                return;
            }
        };
        match self.backing.set(key, &raw) {
            Ok(()) => debug!(key, bytes = raw.len(), "session record saved"),
            Err(e) => warn!(key, error = %e, "session write failed; keeping in-memory state"),
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.backing.remove(key) {
            warn!(key, error = %e, "session remove failed");
        }
    }
}
