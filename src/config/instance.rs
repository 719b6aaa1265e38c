//! Validation instance files.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ValidateError;

/// One repository to validate, as loaded from a JSON or YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweInstance {
    pub id: String,
    pub repo_url: String,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    pub pytest_k: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInstance {
    id: Option<String>,
    repo_url: Option<String>,
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    pytest_k: Option<String>,
    notes: Option<String>,
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "yaml" | "yml"))
        .unwrap_or(false)
}

/// Load and validate an instance file.
///
/// `.yaml`/`.yml` files are read as YAML, everything else as JSON. `id`,
/// `repo_url` and `pytest_k` must be non-blank; values are trimmed and a blank
/// `ref` becomes `None`.
pub fn load_instance(path: impl AsRef<Path>) -> Result<SweInstance, ValidateError> {
    let path = path.as_ref();
    let invalid = |reason: String| ValidateError::InvalidInstance {
        path: path.display().to_string(),
        reason,
    };

    let text = std::fs::read_to_string(path).map_err(|e| invalid(format!("cannot read file: {}", e)))?;

    let raw: RawInstance = if is_yaml(path) {
        serde_yaml::from_str(&text).map_err(|e| invalid(format!("malformed YAML: {}", e)))?
    } else {
        serde_json::from_str(&text).map_err(|e| invalid(format!("malformed JSON: {}", e)))?
    };

    let required = |field: &str, value: Option<String>| -> Result<String, ValidateError> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| invalid(format!("missing or empty field '{}'", field)))
    };

    let instance = SweInstance {
        id: required("id", raw.id)?,
        repo_url: required("repo_url", raw.repo_url)?,
        pytest_k: required("pytest_k", raw.pytest_k)?,
        git_ref: raw.git_ref.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
        notes: raw.notes,
    };

    tracing::debug!(id = %instance.id, path = %path.display(), "Loaded instance");
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_json_instance() {
        let file = write_file(
            ".json",
            r#"{"id": " psf-requests ", "repo_url": "https://github.com/psf/requests", "ref": "v2.31.0", "pytest_k": "test_basic"}"#,
        );
        let inst = load_instance(file.path()).unwrap();
        assert_eq!(inst.id, "psf-requests");
        assert_eq!(inst.git_ref.as_deref(), Some("v2.31.0"));
        assert_eq!(inst.pytest_k, "test_basic");
        assert!(inst.notes.is_none());
    }

    #[test]
    fn test_load_yaml_instance_without_ref() {
        let file = write_file(
            ".yaml",
            "id: attrs\nrepo_url: https://github.com/python-attrs/attrs\npytest_k: \"not slow\"\nnotes: smoke\n",
        );
        let inst = load_instance(file.path()).unwrap();
        assert_eq!(inst.id, "attrs");
        assert!(inst.git_ref.is_none());
        assert_eq!(inst.notes.as_deref(), Some("smoke"));
    }

    #[test]
    fn test_blank_ref_is_none() {
        let file = write_file(".json", r#"{"id": "a", "repo_url": "u", "ref": "  ", "pytest_k": "k"}"#);
        assert!(load_instance(file.path()).unwrap().git_ref.is_none());
    }

    #[test]
    fn test_missing_required_field() {
        let file = write_file(".json", r#"{"id": "a", "repo_url": "u", "pytest_k": "   "}"#);
        let err = load_instance(file.path()).unwrap_err();
        match err {
            ValidateError::InvalidInstance { reason, .. } => assert!(reason.contains("pytest_k")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_and_missing_file() {
        let file = write_file(".json", "{not json");
        assert!(matches!(
            load_instance(file.path()),
            Err(ValidateError::InvalidInstance { .. })
        ));
        assert!(matches!(
            load_instance("/nonexistent/instance.json"),
            Err(ValidateError::InvalidInstance { .. })
        ));
    }
}
