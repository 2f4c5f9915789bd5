//! Token cost estimation.

use serde::{Deserialize, Serialize};

/// Price list used for cost estimates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Pricing {
    /// USD per 1000 input tokens
    pub input_per_1k_usd: f64,
    /// USD per 1000 output tokens
    pub output_per_1k_usd: f64,
    /// KRW per USD
    pub krw_per_usd: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self { input_per_1k_usd: 0.0005, output_per_1k_usd: 0.001, krw_per_usd: 1300.0 }
    }
}

/// Estimated cost of a token pair in USD and KRW.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct CostEstimate {
    pub input_cost_usd: f64,
    pub output_cost_usd: f64,
    pub total_cost_usd: f64,
    pub input_cost_krw: f64,
    pub output_cost_krw: f64,
    pub total_cost_krw: f64,
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

impl Pricing {
    /// USD amounts rounded to 6 places, KRW to 2.
    pub fn estimate(&self, input_tokens: u64, output_tokens: u64) -> CostEstimate {
        let input = input_tokens as f64 / 1000.0 * self.input_per_1k_usd;
        let output = output_tokens as f64 / 1000.0 * self.output_per_1k_usd;
        let total = input + output;
        CostEstimate {
            input_cost_usd: round_to(input, 6),
            output_cost_usd: round_to(output, 6),
            total_cost_usd: round_to(total, 6),
            input_cost_krw: round_to(input * self.krw_per_usd, 2),
            output_cost_krw: round_to(output * self.krw_per_usd, 2),
            total_cost_krw: round_to(total * self.krw_per_usd, 2),
        }
    }
}
