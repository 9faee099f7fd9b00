//! Cost estimation for LLM calls.
//!
//! Prices are USD per million tokens. A built-in table covers the models the
//! service ships with; entries from configuration take precedence.

use crate::types::DEFAULT_MODEL;
use serde::{Deserialize, Serialize};

/// Price of one model, USD per million tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model: String,
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
}

impl ModelPricing {
    fn new(model: &str, input_cost_per_million: f64, output_cost_per_million: f64) -> Self {
        Self {
            model: model.to_string(),
            input_cost_per_million,
            output_cost_per_million,
        }
    }

    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.input_cost_per_million
            + output_tokens as f64 * self.output_cost_per_million)
            / 1_000_000.0
    }
}

/// Lookup table from model name to pricing
#[derive(Debug, Clone)]
pub struct PricingTable {
    entries: Vec<ModelPricing>,
}

impl PricingTable {
    /// Built-in prices plus `overrides`, which win on an exact model match.
    pub fn with_overrides(overrides: &[ModelPricing]) -> Self {
        let mut entries = overrides.to_vec();
        entries.extend(default_pricing());
        Self { entries }
    }

    /// Pricing for `model`; unknown models are billed at the default model's rate.
    pub fn lookup(&self, model: &str) -> ModelPricing {
        self.entries
            .iter()
            .find(|p| p.model == model)
            .or_else(|| self.entries.iter().find(|p| p.model == DEFAULT_MODEL))
            .cloned()
            .unwrap_or_else(|| ModelPricing::new(model, 0.0, 0.0))
    }

    pub fn estimate(&self, model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
        self.lookup(model).cost(input_tokens, output_tokens)
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_overrides(&[])
    }
}

fn default_pricing() -> Vec<ModelPricing> {
    vec![
        ModelPricing::new("kimi-k2p5", 0.30, 1.20),
        ModelPricing::new("kimi-k2-instruct-0905", 0.30, 1.20),
    ]
}
