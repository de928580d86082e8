//! Deterministic cost accounting.
//!
//! Converts token usage into USD micros. Unknown models degrade to a flat
//! fallback rate; a cost lookup must never fail a request.

use crate::pricing::PricingTable;

/// Flat rate applied to total tokens when a model has no pricing entry:
/// $0.50 per one million tokens.
pub const FALLBACK_USD_MICROS_PER_MTOK: u64 = 500_000;

/// Fixed characters-per-token ratio for the pre-flight estimate.
pub const ESTIMATE_CHARS_PER_TOKEN: u64 = 4;

/// The requested maximum output is capped at this multiple of the estimated
/// input size, with a floor so short prompts keep a usable cap.
pub const ESTIMATE_OUTPUT_CAP_FACTOR: u64 = 4;
pub const ESTIMATE_OUTPUT_CAP_FLOOR_TOKENS: u64 = 256;

/// Request dimensions available before the upstream call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestShape {
    pub prompt_chars: u64,
    pub max_output_tokens: Option<u64>,
}

impl RequestShape {
    pub fn from_messages<'a>(
        texts: impl IntoIterator<Item = &'a str>,
        max_output_tokens: Option<u64>,
    ) -> Self {
        let prompt_chars = texts
            .into_iter()
            .map(|text| text.chars().count() as u64)
            .fold(0u64, u64::saturating_add);
        Self {
            prompt_chars,
            max_output_tokens,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CostCalculator {
    pricing: PricingTable,
}

impl CostCalculator {
    pub fn new(pricing: PricingTable) -> Self {
        Self { pricing }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Cost of actual reported usage, in USD micros.
    pub fn cost_from_usage(&self, model: &str, input_tokens: u64, output_tokens: u64) -> u64 {
        match self.pricing.model_pricing(model) {
            Some(pricing) => cost_per_mtok(input_tokens, pricing.input_usd_micros_per_mtok)
                .saturating_add(cost_per_mtok(
                    output_tokens,
                    pricing.output_usd_micros_per_mtok,
                )),
            None => {
                tracing::debug!(model, "no pricing entry for model, using fallback rate");
                cost_per_mtok(
                    input_tokens.saturating_add(output_tokens),
                    FALLBACK_USD_MICROS_PER_MTOK,
                )
            }
        }
    }

    /// Pre-flight estimate from request shape. Only used when the upstream
    /// response reports no usage; accrual always prefers actual token counts.
    pub fn estimate_from_request(&self, model: &str, shape: &RequestShape) -> u64 {
        let input_tokens = shape.prompt_chars.div_ceil(ESTIMATE_CHARS_PER_TOKEN);
        let output_cap = input_tokens
            .saturating_mul(ESTIMATE_OUTPUT_CAP_FACTOR)
            .max(ESTIMATE_OUTPUT_CAP_FLOOR_TOKENS);
        let output_tokens = shape.max_output_tokens.unwrap_or(output_cap).min(output_cap);
        self.cost_from_usage(model, input_tokens, output_tokens)
    }
}

fn cost_per_mtok(tokens: u64, usd_micros_per_mtok: u64) -> u64 {
    let micros = u128::from(tokens) * u128::from(usd_micros_per_mtok) / 1_000_000;
    u64::try_from(micros).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::ModelPricing;

    fn calculator() -> CostCalculator {
        let mut pricing = PricingTable::default();
        pricing.insert(
            "known-model",
            ModelPricing {
                input_usd_micros_per_mtok: 150_000,
                output_usd_micros_per_mtok: 600_000,
            },
        );
        CostCalculator::new(pricing)
    }

    #[test]
    fn one_million_tokens_costs_exactly_the_per_million_rates() {
        let calc = calculator();
        let cost = calc.cost_from_usage("known-model", 1_000_000, 1_000_000);
        assert_eq!(cost, 150_000 + 600_000);
    }

    #[test]
    fn unknown_model_uses_fallback_rate_not_zero() {
        let calc = calculator();
        let cost = calc.cost_from_usage("no-such-model", 2000, 0);
        assert_eq!(cost, 2000 * FALLBACK_USD_MICROS_PER_MTOK / 1_000_000);
        assert!(cost > 0);
    }

    #[test]
    fn estimate_caps_requested_output_by_input_multiple() {
        let calc = calculator();
        let shape = RequestShape {
            prompt_chars: 4000, // ~1000 input tokens, cap 4000 output tokens
            max_output_tokens: Some(1_000_000),
        };
        let estimate = calc.estimate_from_request("known-model", &shape);
        let expected = calc.cost_from_usage("known-model", 1000, 4000);
        assert_eq!(estimate, expected);
    }

    #[test]
    fn estimate_without_requested_maximum_uses_the_cap() {
        let calc = calculator();
        let shape = RequestShape {
            prompt_chars: 10,
            max_output_tokens: None,
        };
        let estimate = calc.estimate_from_request("known-model", &shape);
        let expected = calc.cost_from_usage("known-model", 3, ESTIMATE_OUTPUT_CAP_FLOOR_TOKENS);
        assert_eq!(estimate, expected);
    }

    #[test]
    fn huge_usage_saturates_instead_of_overflowing() {
        let mut pricing = PricingTable::default();
        pricing.insert(
            "pricey",
            ModelPricing {
                input_usd_micros_per_mtok: 2_000_000,
                output_usd_micros_per_mtok: 2_000_000,
            },
        );
        let calc = CostCalculator::new(pricing);
        let cost = calc.cost_from_usage("pricey", u64::MAX, u64::MAX);
        assert_eq!(cost, u64::MAX);
    }
}
