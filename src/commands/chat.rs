use futures::future::{AbortHandle, AbortRegistration, Abortable};
use tracing::{debug, info, info_span, warn, Instrument};

use super::{
    ConversationEvent, Orchestrator, SubmitOutcome, TurnGuard, TurnPhase, CANCELLED_NOTE,
};
use crate::classifier::{classify, Classification};
use crate::db::models::{Message, MessageId};
use crate::prompt::{build_augmented_prompt, out_of_scope_reply};

impl Orchestrator {
    /// Run one user turn to completion.
    ///
    /// Blank input and input arriving while another turn is running are
    /// no-ops. Provider failures end up in the transcript as assistant
    /// messages rather than as errors. The text is stored and recorded exactly as given.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        if text.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }
        if self.is_busy() {
            debug!(phase = ?self.phase(), "turn already running; ignoring submit");
            return SubmitOutcome::Busy;
        }

        self.set_phase(TurnPhase::Submitting);
        let _guard = TurnGuard { orchestrator: self };
        let user_message = self.append_final(|id| Message::user(id, text));

        let span = info_span!("turn", session = %self.session_id, message = %user_message.id);
        let outcome = self.run_turn(text).instrument(span).await;

        self.abort.borrow_mut().take();
        self.set_phase(TurnPhase::Idle);
        outcome
    }

    /// Abort the in-flight dispatch, keeping whatever text has arrived.
    /// Returns `false` when no request is running.
    pub fn cancel_turn(&self) -> bool {
        match self.abort.borrow().as_ref() {
            Some(handle) => {
                info!("cancelling in-flight completion");
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Empty the transcript, in memory and persisted. Preferences are untouched.
    pub fn clear_conversation(&self) {
        self.transcript.borrow_mut().clear();
        self.store.borrow_mut().clear_transcript();
        info!(session = %self.session_id, "conversation cleared");
        self.emit(ConversationEvent::Cleared);
    }

    /// Forget everything stored for this session, preferences included.
    pub fn clear_session(&self) {
        self.transcript.borrow_mut().clear();
        self.store.borrow_mut().clear();
        info!(session = %self.session_id, "session state reset");
        self.emit(ConversationEvent::Cleared);
    }

    async fn run_turn(&self, text: &str) -> SubmitOutcome {
        self.set_phase(TurnPhase::Classifying);
        let classification = classify(text);
        if !classification.in_domain {
            info!("query outside the equities domain; answering locally");
            let reply = out_of_scope_reply();
            self.append_final(move |id| {
                Message::assistant(id, reply.content, None, reply.related_questions)
            });
            return SubmitOutcome::OutOfScope;
        }

        self.set_phase(TurnPhase::Dispatching);
        let prefs = self.store.borrow_mut().load_preferences();
        let prompt = build_augmented_prompt(text, Some(prefs.time_horizon));
        debug!(
            symbols = ?classification.symbols,
            intent = ?classification.intent,
            model = %prefs.selected_model,
            streaming = prefs.streaming_enabled,
            "dispatching turn"
        );

        let (handle, registration) = AbortHandle::new_pair();
        *self.abort.borrow_mut() = Some(handle);

        let outcome = if prefs.streaming_enabled {
            self.dispatch_streaming(&prompt, &prefs.selected_model, registration)
                .await
        } else {
            self.dispatch_single(&prompt, &prefs.selected_model, registration)
                .await
        };

        if outcome == SubmitOutcome::Completed {
            self.record_turn(text, &classification);
        }
        outcome
    }

    async fn dispatch_streaming(
        &self,
        prompt: &str,
        model: &str,
        registration: AbortRegistration,
    ) -> SubmitOutcome {
        let placeholder = {
            let mut transcript = self.transcript.borrow_mut();
            let placeholder = Message::placeholder(transcript.allocate_id(), model);
            transcript.begin(placeholder.clone());
            placeholder
        };
        let id = placeholder.id;
        self.emit(ConversationEvent::Appended(placeholder));

        let mut on_delta = |delta: &str| {
            self.set_phase(TurnPhase::Streaming);
            let applied = self.transcript.borrow_mut().apply_delta(delta);
            if applied {
                self.emit(ConversationEvent::Delta {
                    id,
                    text: delta.to_string(),
                });
            }
        };
        let result = Abortable::new(
            self.client
                .complete_streaming(prompt, model, &self.options, &mut on_delta),
            registration,
        )
        .await;
        self.set_phase(TurnPhase::Finalizing);

        let (outcome, suggestions, note) = match result {
            Ok(result) => match result.error {
                None => (SubmitOutcome::Completed, result.related_questions, None),
                Some(error) => {
                    self.set_phase(TurnPhase::Failed);
                    let note = error.to_string();
                    (SubmitOutcome::Failed(error), Vec::new(), Some(note))
                }
            },
            Err(_) => (
                SubmitOutcome::Cancelled,
                Vec::new(),
                Some(CANCELLED_NOTE.to_string()),
            ),
        };

        let finalized = self
            .transcript
            .borrow_mut()
            .finalize(suggestions, note.as_deref());
        match finalized {
            Some(message) => self.persist_finalized(message),
            None => debug!(message = %id, "in-flight message was cleared; discarding result"),
        }
        outcome
    }

    async fn dispatch_single(
        &self,
        prompt: &str,
        model: &str,
        registration: AbortRegistration,
    ) -> SubmitOutcome {
        let result = Abortable::new(
            self.client.complete(prompt, model, &self.options),
            registration,
        )
        .await;
        self.set_phase(TurnPhase::Finalizing);

        let (outcome, text, suggestions) = match result {
            Ok(result) => match result.error {
                None => (
                    SubmitOutcome::Completed,
                    result.content,
                    result.related_questions,
                ),
                Some(error) => {
                    self.set_phase(TurnPhase::Failed);
                    let text = error.to_string();
                    (SubmitOutcome::Failed(error), text, Vec::new())
                }
            },
            Err(_) => (
                SubmitOutcome::Cancelled,
                CANCELLED_NOTE.to_string(),
                Vec::new(),
            ),
        };

        let model = model.to_string();
        self.append_final(move |id| Message::assistant(id, text, Some(model), suggestions));
        outcome
    }

    /// Allocate an id, append a finished message and write it through.
    fn append_final(&self, make: impl FnOnce(MessageId) -> Message) -> Message {
        let message = {
            let mut transcript = self.transcript.borrow_mut();
            let message = make(transcript.allocate_id());
            transcript.push(message.clone());
            message
        };
        self.store.borrow_mut().append_message(message.clone());
        self.emit(ConversationEvent::Appended(message.clone()));
        message
    }

    fn persist_finalized(&self, message: Message) {
        self.store.borrow_mut().append_message(message.clone());
        self.emit(ConversationEvent::Finalized(message));
    }

    fn record_turn(&self, text: &str, classification: &Classification) {
        let mut store = self.store.borrow_mut();
        for symbol in &classification.symbols {
            store.record_symbol(symbol);
        }
        store.record_query(text);
    }

    /// Called when a turn's future is dropped before it finished.
    pub(super) fn abandon_turn(&self) {
        warn!(phase = ?self.phase(), "turn abandoned before completion");
        self.abort.borrow_mut().take();
        let finalized = self
            .transcript
            .borrow_mut()
            .finalize(Vec::new(), Some(CANCELLED_NOTE));
        if let Some(message) = finalized {
            self.persist_finalized(message);
        }
        self.set_phase(TurnPhase::Idle);
    }
}
