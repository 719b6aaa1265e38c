//! Chutes API credentials.
//!
//! The key comes from `CHUTES_API_KEY` or, failing that, from a small key file
//! (`CHUTES_KEY_FILE`, default `chutes_key.txt`) in one of several lenient
//! formats.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ValidateError;

pub const API_KEY_ENV: &str = "CHUTES_API_KEY";
pub const KEY_FILE_ENV: &str = "CHUTES_KEY_FILE";
pub const BASE_URL_ENV: &str = "CHUTES_BASE_URL";
pub const DEFAULT_KEY_FILE: &str = "chutes_key.txt";
pub const DEFAULT_BASE_URL: &str = "https://llm.chutes.ai/v1";

/// API key from the environment or the key file.
pub fn get_api_key() -> Result<String, ValidateError> {
    let key_file = std::env::var(KEY_FILE_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_FILE));
    resolve_api_key(std::env::var(API_KEY_ENV).ok(), &key_file)
}

/// Base URL of the OpenAI-compatible endpoint.
pub fn get_base_url() -> String {
    std::env::var(BASE_URL_ENV)
        .ok()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Prefer a non-blank `env_key`; otherwise parse `key_file`.
pub fn resolve_api_key(env_key: Option<String>, key_file: &Path) -> Result<String, ValidateError> {
    if let Some(key) = env_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
        return Ok(key);
    }

    let raw = std::fs::read_to_string(key_file).map_err(|e| {
        ValidateError::MissingCredential(format!(
            "{} not set and key file {} is unreadable: {}",
            API_KEY_ENV,
            key_file.display(),
            e
        ))
    })?;

    let key = parse_key_text(&raw).ok_or_else(|| {
        ValidateError::MissingCredential(format!(
            "{} not set and key file {} holds no key",
            API_KEY_ENV,
            key_file.display()
        ))
    })?;

    tracing::debug!(key_file = %key_file.display(), "Loaded API key from file");
    Ok(key)
}

fn cpk_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"cpk_[A-Za-z0-9._-]+").ok()).as_ref()
}

fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '"' || c == '\'')
}

/// Extract a key from file text.
///
/// Accepts JSON (`api_key`, `key` or `token`), `name = value` lines, a bare
/// `cpk_...` token inside a line, or a raw, optionally quoted token. Blank
/// lines and `#` comments are skipped; only the first remaining line counts.
pub fn parse_key_text(text: &str) -> Option<String> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(s) {
        for field in ["api_key", "key", "token"] {
            if let Some(v) = obj.get(field).and_then(|v| v.as_str()) {
                let v = strip_quotes(v);
                if !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }

    let line = s
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))?;

    let key = if let Some((_, value)) = line.split_once('=') {
        strip_quotes(value)
    } else if let Some(m) = cpk_regex().and_then(|re| re.find(line)) {
        m.as_str()
    } else {
        strip_quotes(line)
    };

    (!key.is_empty()).then(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_raw_and_quoted() {
        assert_eq!(parse_key_text("cpk_abc.123\n").as_deref(), Some("cpk_abc.123"));
        assert_eq!(parse_key_text("  'secret-token'  ").as_deref(), Some("secret-token"));
    }

    #[test]
    fn test_parse_json() {
        assert_eq!(parse_key_text(r#"{"api_key": "cpk_json"}"#).as_deref(), Some("cpk_json"));
        assert_eq!(parse_key_text(r#"{"token": "\"tok\""}"#).as_deref(), Some("tok"));
    }

    #[test]
    fn test_parse_key_value_and_comments() {
        let text = "# chutes credentials\n\napi_key = \"cpk_kv\"\nother=1\n";
        assert_eq!(parse_key_text(text).as_deref(), Some("cpk_kv"));
    }

    #[test]
    fn test_parse_embedded_cpk_token() {
        assert_eq!(parse_key_text("my key: cpk_xyz-9 (prod)").as_deref(), Some("cpk_xyz-9"));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_key_text("").is_none());
        assert!(parse_key_text("# only a comment\n\n").is_none());
        assert!(parse_key_text("api_key = ''").is_none());
    }

    #[test]
    fn test_resolve_prefers_env() {
        let key = resolve_api_key(Some("cpk_env".into()), Path::new("/nonexistent/key.txt")).unwrap();
        assert_eq!(key, "cpk_env");
    }

    #[test]
    fn test_resolve_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "CHUTES_API_KEY=cpk_file").unwrap();

        let key = resolve_api_key(Some("  ".into()), file.path()).unwrap();
        assert_eq!(key, "cpk_file");
    }

    #[test]
    fn test_resolve_missing_everything() {
        let err = resolve_api_key(None, Path::new("/nonexistent/key.txt")).unwrap_err();
        assert!(matches!(err, ValidateError::MissingCredential(_)));

        let empty = tempfile::NamedTempFile::new().unwrap();
        let err = resolve_api_key(None, empty.path()).unwrap_err();
        assert!(err.to_string().contains("holds no key"));
    }
}
