use crate::classifier::{classify_intent, extract_symbols};
use crate::completion::CompletionResult;
use crate::db::models::TimeHorizon;

const SYSTEM_PROMPT: &str = "\
You are an equity research assistant for retail investors in the Indian stock market (NSE and BSE).

Scope:
- Answer only questions about listed Indian companies, stocks, sectors, indices, mutual funds and market events.
- Politely decline anything outside investing and markets.
- Prefer recent, verifiable information from reputable financial sources and mention when data may be stale.

Every answer must contain:
1. Recommendation: a clear Buy, Hold or Sell view (or \"no clear view\") with the key reasons.
2. Time horizon: the period the view applies to (short, medium or long term).
3. Where to look next: which metrics, filings or pages the user should check to verify the view.
4. Risk disclaimer: a one-line reminder that this is not personalised financial advice and markets carry risk.

Keep answers concise, use INR for prices, and use bullet points for lists.";

const MARKET_SCOPE_INSTRUCTION: &str =
    "Please focus on the Indian stock market (NSE/BSE) context and answer in the required format.";

pub const OUT_OF_SCOPE_MESSAGE: &str = "I can only help with questions about stocks and the Indian stock market. \
Try asking about a company, a sector, or an investment decision.";

pub const OUT_OF_SCOPE_SUGGESTIONS: &[&str] = &[
    "Should I buy RELIANCE now?",
    "What is the technical outlook for NIFTY this week?",
    "Compare the fundamentals of TCS and INFY",
    "Which banking stocks pay good dividends?",
];

pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Append extracted context as explicit hint lines after the user's text.
pub fn build_augmented_prompt(text: &str, horizon: Option<TimeHorizon>) -> String {
    let mut prompt = text.trim().to_string();
    prompt.push('\n');

    let symbols = extract_symbols(text);
    if !symbols.is_empty() {
        prompt.push_str(&format!("\nStocks mentioned: {}", symbols.join(", ")));
    }
    if let Some(intent) = classify_intent(text) {
        prompt.push_str(&format!("\nQuery type: {intent}"));
    }
    if let Some(horizon) = horizon {
        prompt.push_str(&format!("\nPreferred time horizon: {}", horizon.describe()));
    }
    prompt.push('\n');
    prompt.push_str(MARKET_SCOPE_INSTRUCTION);
    prompt
}

/// Canned reply for queries outside the equities domain. Never touches the network.
pub fn out_of_scope_reply() -> CompletionResult {
    CompletionResult::success(
        OUT_OF_SCOPE_MESSAGE,
        OUT_OF_SCOPE_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_augmented_prompt_hints() {
        let prompt = build_augmented_prompt("Should I buy RELIANCE now?", None);
        assert_eq!(
            prompt,
            format!(
                "Should I buy RELIANCE now?\n\nStocks mentioned: RELIANCE\nQuery type: recommendation\n{MARKET_SCOPE_INSTRUCTION}"
            )
        );
    }

    #[test]
    fn test_augmented_prompt_without_hints() {
        let prompt = build_augmented_prompt("How is the market today", None);
        assert!(!prompt.contains("Stocks mentioned"));
        assert!(!prompt.contains("Query type"));
        assert!(prompt.ends_with(MARKET_SCOPE_INSTRUCTION));
    }

    #[test]
    fn test_augmented_prompt_horizon_and_determinism() {
        let a = build_augmented_prompt("TCS RSI levels", Some(TimeHorizon::ShortTerm));
        let b = build_augmented_prompt("TCS RSI levels", Some(TimeHorizon::ShortTerm));
        assert_eq!(a, b);
        assert!(a.contains("Preferred time horizon: short term"));
        assert!(a.contains("Query type: technical_analysis"));
    }

    #[test]
    fn test_system_prompt_shape() {
        let prompt = system_prompt();
        for section in ["Recommendation", "Time horizon", "Where to look next", "Risk disclaimer"] {
            assert!(prompt.contains(section), "missing {section}");
        }
    }

    #[test]
    fn test_out_of_scope_reply_is_fixed() {
        let reply = out_of_scope_reply();
        assert!(reply.is_success());
        assert_eq!(reply.content, OUT_OF_SCOPE_MESSAGE);
        assert_eq!(reply.related_questions.len(), OUT_OF_SCOPE_SUGGESTIONS.len());
        assert_eq!(reply, out_of_scope_reply());
    }
}
