//! Log compaction.
//!
//! When an agent's message log grows past `threshold_tokens`, the oldest
//! messages are archived into a single memory record and deleted from the
//! log, aiming for `target_tokens_after`. The newest `keep_recent_tokens`
//! worth of messages (the protected tail) is never removed, even if that
//! means missing the target.

use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use serde_json::json;
use switchyard_core::error::CompactionError;
use switchyard_core::memory::MemoryUpsert;
use switchyard_core::message::{MessageRecord, now_seconds};
use switchyard_core::store::Store;
use tracing::{debug, info};

use super::token::{TokenCounter, message_tokens};

/// Thresholds that control when and how far a log is compacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionSettings {
    pub threshold_tokens: usize,
    pub target_tokens_after: usize,
    pub keep_recent_tokens: usize,
    pub memory_strength: u8,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            threshold_tokens: 100_000,
            target_tokens_after: 80_000,
            keep_recent_tokens: 20_000,
            memory_strength: 4,
        }
    }
}

impl CompactionSettings {
    pub fn validate(&self) -> Result<(), CompactionError> {
        if self.threshold_tokens == 0 || self.target_tokens_after == 0 || self.keep_recent_tokens == 0
        {
            return Err(CompactionError::NonPositiveThreshold);
        }
        if self.target_tokens_after > self.threshold_tokens {
            return Err(CompactionError::TargetAboveThreshold {
                target: self.target_tokens_after,
                threshold: self.threshold_tokens,
            });
        }
        Ok(())
    }
}

impl From<&switchyard_config::ContextConfig> for CompactionSettings {
    fn from(config: &switchyard_config::ContextConfig) -> Self {
        Self {
            threshold_tokens: config.threshold_tokens,
            target_tokens_after: config.target_tokens_after,
            keep_recent_tokens: config.keep_recent_tokens,
            memory_strength: config.memory_strength,
        }
    }
}

/// Outcome of one compaction check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionResult {
    pub triggered: bool,
    pub total_tokens_before: usize,
    pub total_tokens_after: usize,
    pub compacted_messages: usize,
    pub compacted_tokens: usize,
    pub kept_recent_messages: usize,
    pub kept_recent_tokens: usize,
    pub memory_name: Option<String>,
}

/// Where the protected tail begins and what it costs.
///
/// Scans from the newest message backwards and stops at the first message
/// that would push the tail over `keep_recent_tokens`. The newest message
/// always belongs to the tail.
pub fn find_recent_tail_start(costs: &[usize], keep_recent_tokens: usize) -> (usize, usize) {
    let mut tail_tokens = 0;
    let mut tail_start = costs.len();

    for index in (0..costs.len()).rev() {
        let next_total = tail_tokens + costs[index];
        if tail_start < costs.len() && next_total > keep_recent_tokens {
            break;
        }
        tail_tokens = next_total;
        tail_start = index;
    }
    (tail_start, tail_tokens)
}

/// Number of leading messages to archive.
///
/// Accumulates from the front until `total - target` tokens are covered,
/// never crossing `tail_start`.
pub fn plan_removal(costs: &[usize], tail_start: usize, target_tokens_after: usize) -> (usize, usize) {
    let total: usize = costs.iter().sum();
    let tokens_to_remove = total.saturating_sub(target_tokens_after);

    let mut remove_end = 0;
    let mut removed = 0;
    while remove_end < tail_start && removed < tokens_to_remove {
        removed += costs[remove_end];
        remove_end += 1;
    }
    (remove_end, removed)
}

pub struct ContextCompactor {
    counter: Arc<dyn TokenCounter>,
    settings: CompactionSettings,
}

impl ContextCompactor {
    pub fn new(
        counter: Arc<dyn TokenCounter>,
        settings: CompactionSettings,
    ) -> Result<Self, CompactionError> {
        settings.validate()?;
        Ok(Self { counter, settings })
    }

    pub fn settings(&self) -> &CompactionSettings {
        &self.settings
    }

    fn costs(&self, records: &[MessageRecord]) -> Vec<usize> {
        records
            .iter()
            .map(|r| message_tokens(self.counter.as_ref(), r.role.as_str(), &r.content))
            .collect()
    }

    /// Archive and delete the oldest messages if the log is over threshold.
    pub async fn compact_if_needed(
        &self,
        store: &dyn Store,
        agent_id: &str,
    ) -> Result<CompactionResult, CompactionError> {
        let records = store.list_messages_ordered(agent_id).await?;
        if records.is_empty() {
            return Ok(CompactionResult::default());
        }

        let costs = self.costs(&records);
        let total_before: usize = costs.iter().sum();
        let (tail_start, tail_tokens) =
            find_recent_tail_start(&costs, self.settings.keep_recent_tokens);

        if total_before < self.settings.threshold_tokens {
            return Ok(CompactionResult {
                triggered: false,
                total_tokens_before: total_before,
                total_tokens_after: total_before,
                kept_recent_messages: records.len() - tail_start,
                kept_recent_tokens: tail_tokens,
                ..Default::default()
            });
        }

        let (remove_end, compacted_tokens) =
            plan_removal(&costs, tail_start, self.settings.target_tokens_after);
        let total_after = total_before - compacted_tokens;
        let kept_tokens: usize = costs[remove_end..].iter().sum();

        if remove_end == 0 {
            debug!(agent_id = %agent_id, total_before, "Over threshold but nothing outside the protected tail");
            return Ok(CompactionResult {
                triggered: false,
                total_tokens_before: total_before,
                total_tokens_after: total_after,
                kept_recent_messages: records.len(),
                kept_recent_tokens: kept_tokens,
                ..Default::default()
            });
        }

        let compacted = &records[..remove_end];
        let archive = self.build_archive(agent_id, compacted, compacted_tokens, total_before, total_after);
        let memory_name = archive.name.clone();
        store.upsert_memory(agent_id, &archive).await?;

        let ids: Vec<String> = compacted.iter().map(|r| r.id.clone()).collect();
        store.delete_messages(agent_id, &ids).await?;

        info!(
            agent_id = %agent_id,
            compacted_messages = remove_end,
            compacted_tokens,
            total_before,
            total_after,
            memory = %memory_name,
            "Compacted conversation log"
        );

        Ok(CompactionResult {
            triggered: true,
            total_tokens_before: total_before,
            total_tokens_after: total_after,
            compacted_messages: remove_end,
            compacted_tokens,
            kept_recent_messages: records.len() - remove_end,
            kept_recent_tokens: kept_tokens,
            memory_name: Some(memory_name),
        })
    }

    fn build_archive(
        &self,
        agent_id: &str,
        compacted: &[MessageRecord],
        compacted_tokens: usize,
        total_before: usize,
        total_after: usize,
    ) -> MemoryUpsert {
        let created_at = now_seconds();
        let created_unix = created_at.timestamp();

        // Non-empty: callers only archive when at least one message is removed.
        let first = &compacted[0];
        let last = &compacted[compacted.len() - 1];
        let id_prefix: String = first.id.chars().take(8).collect();
        let name = format!("conversation_compaction_{created_unix}_{id_prefix}");

        let summary_line = format!(
            "Auto-compacted {} old messages (~{} tokens) to keep active context focused on recent turns.",
            compacted.len(),
            compacted_tokens
        );

        let payload = json!({
            "type": "conversation_compaction",
            "agent_id": agent_id,
            "created_at": created_unix,
            "token_model": self.counter.model(),
            "stats": {
                "compacted_messages": compacted.len(),
                "compacted_tokens": compacted_tokens,
                "total_tokens_before": total_before,
                "total_tokens_after": total_after,
                "recent_context_target_tokens": self.settings.keep_recent_tokens,
            },
            "range": {
                "first_message_id": first.id,
                "last_message_id": last.id,
                "first_timestamp": first.timestamp.timestamp(),
                "last_timestamp": last.timestamp.timestamp(),
            },
            "messages": compacted
                .iter()
                .map(|r| json!({
                    "id": r.id,
                    "timestamp": r.timestamp.timestamp(),
                    "role": r.role.as_str(),
                    "content": r.content,
                }))
                .collect::<Vec<_>>(),
        });

        MemoryUpsert {
            name,
            summary: format!(
                "Conversation history compacted at {}.",
                created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ),
            content: format!("{summary_line}\n\n{payload}"),
            strength: self.settings.memory_strength,
            updated_at: created_at,
        }
    }
}
