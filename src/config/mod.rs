//! Run configuration: credentials, instance files and model lists.
//!
//! Environment variables are read at the CLI boundary (clap `env`) and passed
//! in here as plain options so resolution stays testable.

pub mod credentials;
pub mod instance;

pub use credentials::{get_api_key, get_base_url, parse_key_text, resolve_api_key};
pub use instance::{load_instance, SweInstance};

use crate::llm::{candidates_from_ids, default_candidates, parse_model_list, ModelCandidate};

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Candidate list for a single run.
///
/// An explicit single model wins, then a comma-separated list, then the
/// built-in defaults.
pub fn resolve_candidates(single: Option<&str>, list: Option<&str>) -> Vec<ModelCandidate> {
    if let Some(model) = non_blank(single) {
        return candidates_from_ids([model]);
    }
    if let Some(csv) = non_blank(list) {
        let parsed = parse_model_list(csv);
        if !parsed.is_empty() {
            return parsed;
        }
    }
    default_candidates()
}

/// Models for a batch of runs, one run per entry.
///
/// A comma-separated list wins over a single model. An empty result means one
/// run with automatic selection.
pub fn batch_models(list: Option<&str>, single: Option<&str>) -> Vec<String> {
    if let Some(csv) = non_blank(list) {
        let models: Vec<String> = csv
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from)
            .collect();
        if !models.is_empty() {
            return models;
        }
    }
    non_blank(single).map(|m| vec![m.to_string()]).unwrap_or_default()
}
