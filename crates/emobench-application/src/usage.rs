//! Token-usage accounting.
//!
//! A ledger implements the core's call-accounting hook: agents report
//! every completion (messages, output, model) and the ledger accumulates
//! approximate token counts and a per-million-token cost. No global
//! counters; callers own their ledgers and aggregate as they see fit.

use std::sync::atomic::{AtomicU64, Ordering};

use emobench_core::{ChatTurn, UsageObserver};

/// Accumulating usage ledger with per-million-token pricing.
#[derive(Debug)]
pub struct UsageLedger {
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    input_price_per_million: f64,
    output_price_per_million: f64,
}

impl UsageLedger {
    pub fn new(input_price_per_million: f64, output_price_per_million: f64) -> Self {
        Self {
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            input_price_per_million,
            output_price_per_million,
        }
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens.load(Ordering::Relaxed)
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens.load(Ordering::Relaxed)
    }

    /// Accumulated cost at this ledger's pricing.
    pub fn cost(&self) -> f64 {
        self.input_tokens() as f64 * self.input_price_per_million / 1_000_000.0
            + self.output_tokens() as f64 * self.output_price_per_million / 1_000_000.0
    }
}

impl UsageObserver for UsageLedger {
    fn record(&self, messages: &[ChatTurn], output: &str, _model: &str) {
        let input: u64 = messages
            .iter()
            .map(|turn| approx_token_count(&turn.content))
            .sum();
        self.input_tokens.fetch_add(input, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(approx_token_count(output), Ordering::Relaxed);
    }
}

/// Rough token estimate (about four characters per token). Close enough
/// for cost reporting; exact tokenizer counts are not worth a tokenizer
/// dependency here.
fn approx_token_count(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
