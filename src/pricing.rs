//! Static model pricing.
//!
//! Rates are stored as USD micros per one million tokens, so per-token rates
//! well below one micro (e.g. $0.15 per million tokens) survive intact.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Clone, Debug, Default)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelPricing {
    pub input_usd_micros_per_mtok: u64,
    pub output_usd_micros_per_mtok: u64,
}

#[derive(Debug, Error)]
pub enum PricingTableError {
    #[error("invalid pricing json: expected object at root")]
    InvalidRoot,
    #[error("invalid pricing entry for model {model}: expected object")]
    InvalidModelEntry { model: String },
    #[error("invalid pricing entry for model {model}: missing both input/output cost")]
    MissingCosts { model: String },
    #[error("invalid pricing entry for model {model}: invalid cost value for {field}")]
    InvalidCostValue { model: String, field: &'static str },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PricingTable {
    pub fn insert(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.models.insert(model.into(), pricing);
    }

    pub fn model_pricing(&self, model: &str) -> Option<&ModelPricing> {
        self.models.get(model)
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Loads a LiteLLM-style pricing map: each model carries
    /// `input_cost_per_token`/`output_cost_per_token` (or the `_per_1k_tokens`
    /// variants) in USD.
    pub fn from_litellm_json_str(raw: &str) -> Result<Self, PricingTableError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        Self::from_litellm_json_value(&value)
    }

    pub fn from_litellm_json_value(value: &serde_json::Value) -> Result<Self, PricingTableError> {
        let Some(root) = value.as_object() else {
            return Err(PricingTableError::InvalidRoot);
        };

        let mut models = HashMap::new();
        for (model, entry) in root {
            let Some(obj) = entry.as_object() else {
                return Err(PricingTableError::InvalidModelEntry {
                    model: model.clone(),
                });
            };

            let input = parse_cost_usd_per_token(obj, "input_cost_per_token")
                .or_else(|| parse_cost_usd_per_1k_tokens(obj, "input_cost_per_1k_tokens"))
                .map(|usd| usd_per_token_to_micros_per_mtok(usd, model, "input_cost"))
                .transpose()?;

            let output = parse_cost_usd_per_token(obj, "output_cost_per_token")
                .or_else(|| parse_cost_usd_per_1k_tokens(obj, "output_cost_per_1k_tokens"))
                .map(|usd| usd_per_token_to_micros_per_mtok(usd, model, "output_cost"))
                .transpose()?;

            if input.is_none() && output.is_none() {
                return Err(PricingTableError::MissingCosts {
                    model: model.clone(),
                });
            }

            models.insert(
                model.clone(),
                ModelPricing {
                    input_usd_micros_per_mtok: input.unwrap_or(0),
                    output_usd_micros_per_mtok: output.unwrap_or(0),
                },
            );
        }

        Ok(Self { models })
    }
}

fn parse_cost_usd_per_token(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &'static str,
) -> Option<f64> {
    obj.get(key).and_then(|value| value.as_f64())
}

fn parse_cost_usd_per_1k_tokens(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &'static str,
) -> Option<f64> {
    let per_1k = obj.get(key).and_then(|value| value.as_f64())?;
    Some(per_1k / 1000.0)
}

fn usd_per_token_to_micros_per_mtok(
    usd_per_token: f64,
    model: &str,
    field: &'static str,
) -> Result<u64, PricingTableError> {
    if !usd_per_token.is_finite() || usd_per_token < 0.0 {
        return Err(PricingTableError::InvalidCostValue {
            model: model.to_string(),
            field,
        });
    }
    // usd/token -> usd/mtok (x1e6) -> micros/mtok (x1e6).
    let micros = (usd_per_token * 1e12).round();
    if !micros.is_finite() || micros < 0.0 {
        return Err(PricingTableError::InvalidCostValue {
            model: model.to_string(),
            field,
        });
    }
    let micros = if micros > u64::MAX as f64 {
        u64::MAX
    } else {
        micros as u64
    };
    Ok(micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_litellm_pricing_json() {
        let raw = r#"{
          "gpt-4o-mini": {"input_cost_per_token": 0.00000015, "output_cost_per_token": 0.0000006},
          "o1": {"input_cost_per_1k_tokens": 0.015, "output_cost_per_1k_tokens": 0.06}
        }"#;
        let table = PricingTable::from_litellm_json_str(raw).expect("pricing");

        let mini = table.model_pricing("gpt-4o-mini").expect("gpt-4o-mini");
        assert_eq!(mini.input_usd_micros_per_mtok, 150_000);
        assert_eq!(mini.output_usd_micros_per_mtok, 600_000);

        let o1 = table.model_pricing("o1").expect("o1");
        assert_eq!(o1.input_usd_micros_per_mtok, 15_000_000);
        assert_eq!(o1.output_usd_micros_per_mtok, 60_000_000);
    }

    #[test]
    fn output_only_entry_defaults_input_to_zero() {
        let raw = r#"{"tts-1": {"output_cost_per_token": 0.000015}}"#;
        let table = PricingTable::from_litellm_json_str(raw).expect("pricing");
        let pricing = table.model_pricing("tts-1").expect("tts-1");
        assert_eq!(pricing.input_usd_micros_per_mtok, 0);
        assert_eq!(pricing.output_usd_micros_per_mtok, 15_000_000);
    }

    #[test]
    fn entry_without_costs_is_rejected() {
        let raw = r#"{"mystery": {"max_tokens": 4096}}"#;
        let err = PricingTable::from_litellm_json_str(raw).expect_err("must fail");
        assert!(matches!(err, PricingTableError::MissingCosts { model } if model == "mystery"));
    }

    #[test]
    fn negative_cost_is_rejected() {
        let raw = r#"{"bad": {"input_cost_per_token": -1.0}}"#;
        let err = PricingTable::from_litellm_json_str(raw).expect_err("must fail");
        assert!(matches!(err, PricingTableError::InvalidCostValue { .. }));
    }
}
