use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_RECENT_SYMBOLS: usize = 10;
pub const MAX_RECENT_QUERIES: usize = 5;

/// Creation-ordered message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl MessageId {
    pub fn next(self) -> Self {
        MessageId(self.0 + 1)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
    System,
}

impl Author {
    pub fn as_str(&self) -> &'static str {
        match self {
            Author::User => "user",
            Author::Assistant => "assistant",
            Author::System => "system",
        }
    }
}

/// Lifecycle of a message: only a `Pending` or `Streaming` message may change text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Streaming,
    #[default]
    Final,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            author: Author::User,
            created_at: Utc::now(),
            model_id: None,
            suggestions: Vec::new(),
            status: MessageStatus::Final,
        }
    }

    pub fn assistant(
        id: MessageId,
        text: impl Into<String>,
        model_id: Option<String>,
        suggestions: Vec<String>,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            author: Author::Assistant,
            created_at: Utc::now(),
            model_id,
            suggestions,
            status: MessageStatus::Final,
        }
    }

    /// Empty assistant message that streamed deltas are written into.
    pub fn placeholder(id: MessageId, model_id: &str) -> Self {
        Self {
            status: MessageStatus::Pending,
            ..Self::assistant(id, String::new(), Some(model_id.to_string()), Vec::new())
        }
    }

    pub fn is_final(&self) -> bool {
        self.status == MessageStatus::Final
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    ShortTerm,
    #[default]
    MediumTerm,
    LongTerm,
}

impl TimeHorizon {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeHorizon::ShortTerm => "short_term",
            TimeHorizon::MediumTerm => "medium_term",
            TimeHorizon::LongTerm => "long_term",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TimeHorizon::ShortTerm => "short term (days to weeks)",
            TimeHorizon::MediumTerm => "medium term (3 to 12 months)",
            TimeHorizon::LongTerm => "long term (1 year or more)",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "short" | "short_term" => Some(TimeHorizon::ShortTerm),
            "medium" | "medium_term" => Some(TimeHorizon::MediumTerm),
            "long" | "long_term" => Some(TimeHorizon::LongTerm),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Preferences {
    pub selected_model: String,
    pub streaming_enabled: bool,
    pub time_horizon: TimeHorizon,
    pub recent_symbols: Vec<String>,
    pub recent_queries: Vec<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            selected_model: crate::llm::DEFAULT_MODEL.to_string(),
            streaming_enabled: true,
            time_horizon: TimeHorizon::default(),
            recent_symbols: Vec::new(),
            recent_queries: Vec::new(),
        }
    }
}

impl Preferences {
    pub fn record_symbol(&mut self, symbol: &str) -> bool {
        push_bounded(&mut self.recent_symbols, symbol, MAX_RECENT_SYMBOLS)
    }

    pub fn record_query(&mut self, query: &str) -> bool {
        push_bounded(&mut self.recent_queries, query, MAX_RECENT_QUERIES)
    }
}

/// Add-if-absent with oldest-first eviction. Returns whether the list changed.
fn push_bounded(list: &mut Vec<String>, item: &str, cap: usize) -> bool {
    if list.iter().any(|existing| existing == item) {
        return false;
    }
    list.push(item.to_string());
    if list.len() > cap {
        let overflow = list.len() - cap;
        list.drain(..overflow);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbols_bounded_fifo() {
        let mut prefs = Preferences::default();
        for i in 0..15 {
            prefs.record_symbol(&format!("SYM{i}"));
        }
        assert_eq!(prefs.recent_symbols.len(), MAX_RECENT_SYMBOLS);
        assert_eq!(prefs.recent_symbols.first().map(String::as_str), Some("SYM5"));
        assert_eq!(prefs.recent_symbols.last().map(String::as_str), Some("SYM14"));
    }

    #[test]
    fn test_queries_deduplicated() {
        let mut prefs = Preferences::default();
        assert!(prefs.record_query("Should I buy TCS?"));
        assert!(!prefs.record_query("Should I buy TCS?"));
        assert!(prefs.record_query("should i buy tcs?"));
        assert_eq!(prefs.recent_queries.len(), 2);
        for i in 0..10 {
            prefs.record_query(&format!("q{i}"));
        }
        assert_eq!(prefs.recent_queries, vec!["q5", "q6", "q7", "q8", "q9"]);
    }

    #[test]
    fn test_preferences_tolerate_missing_fields() {
        let prefs: Preferences = serde_json::from_str(r#"{"streaming_enabled":false}"#).unwrap();
        assert!(!prefs.streaming_enabled);
        assert_eq!(prefs.selected_model, crate::llm::DEFAULT_MODEL);
        assert_eq!(prefs.time_horizon, TimeHorizon::MediumTerm);
    }

    #[test]
    fn test_time_horizon_parse() {
        assert_eq!(TimeHorizon::parse("short"), Some(TimeHorizon::ShortTerm));
        assert_eq!(TimeHorizon::parse("Long-Term"), Some(TimeHorizon::LongTerm));
        assert_eq!(TimeHorizon::parse("forever"), None);
    }
}
