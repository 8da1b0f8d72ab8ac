use std::collections::VecDeque;

use crate::db::models::{Message, MessageId, MessageStatus};

/// Working copy of the conversation: one arena of messages plus a pointer to
/// the single message that may still change.
#[derive(Debug)]
pub struct Transcript {
    messages: VecDeque<Message>,
    in_flight: Option<MessageId>,
    limit: usize,
    next_id: MessageId,
}

impl Transcript {
    pub fn restore(messages: Vec<Message>, limit: usize) -> Self {
        let next_id = messages
            .iter()
            .map(|m| m.id)
            .max()
            .map(MessageId::next)
            .unwrap_or(MessageId(1));
        let mut transcript = Self {
            messages: VecDeque::with_capacity(limit.min(64)),
            in_flight: None,
            limit,
            next_id,
        };
        for message in messages {
            transcript.push(message);
        }
        transcript
    }

    pub fn allocate_id(&mut self) -> MessageId {
        let id = self.next_id;
        self.next_id = id.next();
        id
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.limit {
            if let Some(evicted) = self.messages.pop_front() {
                if self.in_flight == Some(evicted.id) {
                    self.in_flight = None;
                }
            }
        }
    }

    /// Append an empty `Pending` message and make it the in-flight target.
    pub fn begin(&mut self, placeholder: Message) {
        debug_assert!(self.in_flight.is_none(), "a message is already in flight");
        self.in_flight = Some(placeholder.id);
        self.push(placeholder);
    }

    pub fn in_flight(&self) -> Option<&Message> {
        let id = self.in_flight?;
        self.messages.iter().rev().find(|m| m.id == id)
    }

    fn in_flight_mut(&mut self) -> Option<&mut Message> {
        let id = self.in_flight?;
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }

    /// Returns `false` when nothing is in flight (e.g. the transcript was cleared mid-turn).
    pub fn apply_delta(&mut self, delta: &str) -> bool {
        match self.in_flight_mut() {
            Some(message) => {
                message.status = MessageStatus::Streaming;
                message.text.push_str(delta);
                true
            }
            None => false,
        }
    }

    /// Freeze the in-flight message. A `note` replaces empty text or is appended
    /// after partial text.
    pub fn finalize(&mut self, suggestions: Vec<String>, note: Option<&str>) -> Option<Message> {
        let message = self.in_flight_mut()?;
        if let Some(note) = note {
            if message.text.trim().is_empty() {
                message.text = note.to_string();
            } else {
                message.text.push_str("\n\n");
                message.text.push_str(note);
            }
        }
        message.suggestions = suggestions;
        message.status = MessageStatus::Final;
        let finalized = message.clone();
        self.in_flight = None;
        Some(finalized)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.in_flight = None;
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
