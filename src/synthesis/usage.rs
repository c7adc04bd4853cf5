//! Per-request accumulation of model-call token usage and latency.
//!
//! The tracker is an owned value scoped to one synthesis invocation. Map-phase
//! tasks return their own [`CallUsage`] records and aggregation happens after
//! the join barrier on a single task, so concurrent requests stay isolated.

use std::time::Duration;

use crate::completion::TokenUsage;

/// Usage recorded for one completed model call.
#[derive(Debug, Clone, Copy)]
pub struct CallUsage {
    /// Token counts reported by the provider for the call.
    pub tokens: TokenUsage,
    /// Wall-clock latency of the call.
    pub latency: Duration,
}

/// Running totals for one synthesis run.
#[derive(Debug, Default)]
pub struct UsageTracker {
    prompt_tokens: u64,
    completion_tokens: u64,
    calls: u64,
    call_time: Duration,
}

impl UsageTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed call.
    pub fn record(&mut self, usage: CallUsage) {
        self.prompt_tokens += usage.tokens.prompt_tokens;
        self.completion_tokens += usage.tokens.completion_tokens;
        self.calls += 1;
        self.call_time += usage.latency;
    }

    /// Fold a batch of call records into the totals.
    pub fn record_all<I: IntoIterator<Item = CallUsage>>(&mut self, records: I) {
        for record in records {
            self.record(record);
        }
    }

    /// Snapshot the accumulated totals.
    pub fn totals(&self) -> UsageTotals {
        UsageTotals {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.prompt_tokens + self.completion_tokens,
            calls: self.calls,
            call_time: self.call_time,
        }
    }
}

/// Immutable view of a run's accumulated usage.
#[derive(Debug, Clone, Copy)]
pub struct UsageTotals {
    /// Prompt tokens consumed across all calls.
    pub prompt_tokens: u64,
    /// Completion tokens produced across all calls.
    pub completion_tokens: u64,
    /// Sum of prompt and completion tokens.
    pub total_tokens: u64,
    /// Number of model calls issued.
    pub calls: u64,
    /// Cumulative call latency (not wall-clock time; calls may overlap).
    pub call_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u64, completion: u64, millis: u64) -> CallUsage {
        CallUsage {
            tokens: TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
            },
            latency: Duration::from_millis(millis),
        }
    }

    #[test]
    fn totals_accumulate_across_calls() {
        let mut tracker = UsageTracker::new();
        tracker.record(usage(100, 40, 20));
        tracker.record(usage(50, 10, 30));

        let totals = tracker.totals();
        assert_eq!(totals.prompt_tokens, 150);
        assert_eq!(totals.completion_tokens, 50);
        assert_eq!(totals.total_tokens, 200);
        assert_eq!(totals.calls, 2);
        assert_eq!(totals.call_time, Duration::from_millis(50));
    }

    #[test]
    fn record_all_folds_batches() {
        let mut tracker = UsageTracker::new();
        tracker.record_all(vec![usage(10, 5, 1), usage(20, 5, 1), usage(30, 5, 1)]);
        assert_eq!(tracker.totals().total_tokens, 75);
        assert_eq!(tracker.totals().calls, 3);
    }

    #[test]
    fn empty_tracker_reports_zeros() {
        let totals = UsageTracker::new().totals();
        assert_eq!(totals.total_tokens, 0);
        assert_eq!(totals.calls, 0);
    }
}
