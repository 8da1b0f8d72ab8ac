//! Conversation orchestrator: the single write path for transcript and
//! preference changes.
//!
//! The orchestrator runs on one thread with cooperative scheduling. State sits
//! behind `RefCell`/`Cell`, every method takes `&self`, and no borrow is held
//! across an `.await`, so a front-end can inspect state or issue commands while
//! a turn is suspended on the network.

pub mod chat;
pub mod settings;
pub mod transcript;

use std::cell::{Cell, RefCell};

use futures::future::AbortHandle;
use tracing::warn;
use uuid::Uuid;

use crate::completion::{CompletionClient, CompletionOptions, ProviderError};
use crate::db::models::{Message, MessageId};
use crate::llm::{find_model, DEFAULT_MODEL};
use crate::session::{PreferenceUpdate, SessionStore};
use transcript::Transcript;

pub const CANCELLED_NOTE: &str = "Response cancelled.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Submitting,
    Classifying,
    Dispatching,
    Streaming,
    Finalizing,
    Failed,
}

/// What a call to [`Orchestrator::submit`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input; nothing changed.
    Ignored,
    /// Another turn is still running; nothing changed.
    Busy,
    OutOfScope,
    Completed,
    Failed(ProviderError),
    Cancelled,
}

/// Notifications for a rendering front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    Appended(Message),
    Delta { id: MessageId, text: String },
    Finalized(Message),
    Cleared,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("unknown model: {0}")]
    UnknownModel(String),
}

type Listener = Box<dyn Fn(&ConversationEvent)>;

pub struct Orchestrator {
    session_id: Uuid,
    client: CompletionClient,
    options: CompletionOptions,
    store: RefCell<SessionStore>,
    transcript: RefCell<Transcript>,
    phase: Cell<TurnPhase>,
    abort: RefCell<Option<AbortHandle>>,
    listeners: RefCell<Vec<Listener>>,
}

impl Orchestrator {
    pub fn new(client: CompletionClient, mut store: SessionStore) -> Self {
        let prefs = store.load_preferences();
        if find_model(&prefs.selected_model).is_none() {
            warn!(
                model = %prefs.selected_model,
                "stored model is not in the catalog; falling back to default"
            );
            store.update_preference(PreferenceUpdate::SelectedModel(DEFAULT_MODEL.to_string()));
        }
        let transcript = Transcript::restore(store.load_transcript(), store.transcript_limit());

        Self {
            session_id: Uuid::new_v4(),
            client,
            options: CompletionOptions::default(),
            store: RefCell::new(store),
            transcript: RefCell::new(transcript),
            phase: Cell::new(TurnPhase::Idle),
            abort: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn subscribe(&self, listener: impl Fn(&ConversationEvent) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase.get()
    }

    pub fn is_busy(&self) -> bool {
        self.phase.get() != TurnPhase::Idle
    }

    pub fn is_streaming(&self) -> bool {
        self.phase.get() == TurnPhase::Streaming
    }

    /// Read-only copy of the current transcript, including any in-flight message.
    pub fn transcript(&self) -> Vec<Message> {
        self.transcript.borrow().snapshot()
    }

    fn set_phase(&self, phase: TurnPhase) {
        self.phase.set(phase);
    }

    fn emit(&self, event: ConversationEvent) {
        for listener in self.listeners.borrow().iter() {
            listener(&event);
        }
    }
}

/// Puts the orchestrator back to `Idle` if a turn's future is dropped mid-flight.
struct TurnGuard<'a> {
    orchestrator: &'a Orchestrator,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if self.orchestrator.is_busy() {
            self.orchestrator.abandon_turn();
        }
    }
}
