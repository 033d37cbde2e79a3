//! Recent-window selection for model input.

use switchyard_core::message::MessageRecord;

use super::token::{TokenCounter, message_tokens};

/// Default budget for the window handed to the executor.
pub const DEFAULT_TOKEN_BUDGET: usize = 20_000;

/// Take messages newest to oldest until the next one would exceed
/// `token_budget`, then return them oldest first.
///
/// The newest message is always included, even when it alone is over budget.
pub fn select_recent<'a>(
    records: &'a [MessageRecord],
    counter: &dyn TokenCounter,
    token_budget: usize,
) -> Vec<&'a MessageRecord> {
    let mut selected = Vec::new();
    let mut total = 0usize;

    for record in records.iter().rev() {
        let tokens = message_tokens(counter, record.role.as_str(), &record.content);
        if !selected.is_empty() && total + tokens > token_budget {
            break;
        }
        selected.push(record);
        total += tokens;
    }

    selected.reverse();
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token::HeuristicCounter;
    use chrono::{TimeZone, Utc};
    use switchyard_core::message::Role;

    fn record(id: &str, role: Role, content: &str) -> MessageRecord {
        MessageRecord {
            id: id.into(),
            agent_id: "a1".into(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            role,
            content: content.into(),
            metadata: Default::default(),
        }
    }

    fn ids(selected: &[&MessageRecord]) -> Vec<String> {
        selected.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn small_log_fits_entirely_in_order() {
        let log = vec![
            record("1", Role::User, "hi"),
            record("2", Role::Assistant, "hello there"),
            record("3", Role::User, "how are you?"),
        ];
        let selected = select_recent(&log, &HeuristicCounter, DEFAULT_TOKEN_BUDGET);
        assert_eq!(ids(&selected), ["1", "2", "3"]);
    }

    #[test]
    fn selection_is_idempotent_when_log_fits() {
        let log = vec![record("1", Role::User, "a"), record("2", Role::Assistant, "b")];
        let first = ids(&select_recent(&log, &HeuristicCounter, 1_000));
        let second = ids(&select_recent(&log, &HeuristicCounter, 1_000));
        assert_eq!(first, second);
    }

    #[test]
    fn oversized_single_message_still_selected() {
        let huge = "x".repeat(200_000);
        let log = vec![record("1", Role::User, &huge)];
        let selected = select_recent(&log, &HeuristicCounter, DEFAULT_TOKEN_BUDGET);
        assert_eq!(ids(&selected), ["1"]);
    }

    #[test]
    fn stops_before_message_that_would_overflow() {
        // Each message: 4 overhead + 1 ("user") + 10 (40 chars) = 15 tokens
        let text = "y".repeat(40);
        let log: Vec<_> = (1..=5)
            .map(|i| record(&i.to_string(), Role::User, &text))
            .collect();
        let selected = select_recent(&log, &HeuristicCounter, 45);
        assert_eq!(ids(&selected), ["3", "4", "5"]);

        let selected = select_recent(&log, &HeuristicCounter, 44);
        assert_eq!(ids(&selected), ["4", "5"]);
    }

    #[test]
    fn older_small_message_not_taken_after_break() {
        let log = vec![
            record("1", Role::User, "tiny"),
            record("2", Role::User, &"z".repeat(400)),
            record("3", Role::User, "last"),
        ];
        // "3" costs 6, "2" costs 105: the walk stops at "2" and never sees "1"
        let selected = select_recent(&log, &HeuristicCounter, 50);
        assert_eq!(ids(&selected), ["3"]);
    }

    #[test]
    fn empty_log_selects_nothing() {
        assert!(select_recent(&[], &HeuristicCounter, 100).is_empty());
    }
}
