//! Structured outcome records for validation runs.
//!
//! Every run, successful or not, appends exactly one [`ValidationOutcome`] as
//! a JSON line to the results log (`sandbox/results.jsonl` by default).

pub mod summary;

pub use summary::{render_summary, SummaryFilter, DEFAULT_TEAM_LABEL, NO_RESULTS};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::conversation::ValidationTarget;
use crate::llm::UsageTotals;

/// Default location of the results log.
pub const DEFAULT_RESULTS_PATH: &str = "sandbox/results.jsonl";

/// Test verdict derived from the final tail line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pass,
    Fail,
    Unknown,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Pass => write!(f, "pass"),
            OutcomeStatus::Fail => write!(f, "fail"),
            OutcomeStatus::Unknown => write!(f, "unknown"),
        }
    }
}

fn passed_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+\s+passed\b").ok()).as_ref()
}

/// Classify a pytest tail line.
///
/// `pass` needs an `<N> passed` count and no `failed`/`error` token anywhere
/// in the line (case-insensitive). Any `failed`/`error` token means `fail`.
/// Anything else, including an empty tail, is `unknown`.
pub fn infer_status(tail: &str) -> OutcomeStatus {
    let t = tail.to_lowercase();
    let has_failure = t.contains("failed") || t.contains("error");
    let has_passed = passed_regex().map(|re| re.is_match(&t)).unwrap_or(false);

    if has_passed && !has_failure {
        OutcomeStatus::Pass
    } else if has_failure {
        OutcomeStatus::Fail
    } else {
        OutcomeStatus::Unknown
    }
}

fn round_millis(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

/// One run's record in the results log. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub instance_id: Option<String>,
    pub repo_url: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub pytest_k: String,
    pub model: String,
    /// Absent for one-agent runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub elapsed_sec: f64,
    pub messages: usize,
    pub final_pytest_tail: Option<String>,
    pub status: OutcomeStatus,
    pub tokens: UsageTotals,
}

impl ValidationOutcome {
    /// Start an outcome for `target` served by `model`, stamped now.
    pub fn begin(target: &ValidationTarget, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            instance_id: target.instance_id.clone(),
            repo_url: target.repo_url.clone(),
            git_ref: target.git_ref.clone(),
            pytest_k: target.pytest_k.clone(),
            model: model.into(),
            team: None,
            start_ts: now,
            end_ts: now,
            elapsed_sec: 0.0,
            messages: 0,
            final_pytest_tail: None,
            status: OutcomeStatus::Unknown,
            tokens: UsageTotals::default(),
        }
    }

    pub fn with_team(mut self, team: Option<impl Into<String>>) -> Self {
        self.team = team.map(Into::into);
        self
    }

    pub fn with_start_ts(mut self, start_ts: DateTime<Utc>) -> Self {
        self.start_ts = start_ts;
        self
    }

    /// Close the outcome at `end_ts`, deriving elapsed time and status.
    pub fn finish_at(
        mut self,
        end_ts: DateTime<Utc>,
        messages: usize,
        final_tail: Option<&str>,
        tokens: UsageTotals,
    ) -> Self {
        let elapsed = (end_ts - self.start_ts).num_milliseconds().max(0) as f64 / 1000.0;
        self.end_ts = end_ts;
        self.elapsed_sec = round_millis(elapsed);
        self.messages = messages;
        self.final_pytest_tail = final_tail.map(String::from);
        self.status = infer_status(final_tail.unwrap_or_default());
        self.tokens = tokens;
        self
    }

    /// Close the outcome now.
    pub fn finish(self, messages: usize, final_tail: Option<&str>, tokens: UsageTotals) -> Self {
        self.finish_at(Utc::now(), messages, final_tail, tokens)
    }
}

/// Appends outcomes to a JSONL log.
#[derive(Debug, Clone)]
pub struct ResultRecorder {
    path: PathBuf,
}

impl Default for ResultRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_RESULTS_PATH)
    }
}

impl ResultRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one outcome. Write failures are logged, never returned.
    pub async fn record(&self, outcome: &ValidationOutcome) {
        match self.append(outcome).await {
            Ok(()) => tracing::info!(
                path = %self.path.display(),
                status = %outcome.status,
                model = %outcome.model,
                "Recorded validation outcome"
            ),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to record validation outcome"
            ),
        }
    }

    async fn append(&self, outcome: &ValidationOutcome) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(outcome)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

/// Raw records from a results log, skipping blank and malformed lines.
///
/// A missing file yields no records.
pub fn read_records(path: impl AsRef<Path>) -> std::io::Result<Vec<Value>> {
    let text = match std::fs::read_to_string(path.as_ref()) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

/// Typed outcomes from a results log; records that do not fit are skipped.
pub fn read_outcomes(path: impl AsRef<Path>) -> std::io::Result<Vec<ValidationOutcome>> {
    Ok(read_records(path)?
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ValidationTarget {
        let mut t = ValidationTarget::new("https://github.com/psf/requests")
            .with_ref("v2.31.0")
            .with_filter("test_basic");
        t.instance_id = Some("psf-requests".into());
        t
    }

    fn tokens() -> UsageTotals {
        UsageTotals {
            prompt: 120,
            completion: 30,
            total: 150,
        }
    }

    #[test]
    fn test_infer_status() {
        assert_eq!(infer_status("12 passed in 0.34s"), OutcomeStatus::Pass);
        assert_eq!(infer_status("3 failed, 1 error"), OutcomeStatus::Fail);
        assert_eq!(infer_status(""), OutcomeStatus::Unknown);
        assert_eq!(infer_status("5 passed, 2 failed"), OutcomeStatus::Fail);
        assert_eq!(infer_status("1 PASSED in 2.0s"), OutcomeStatus::Pass);
        assert_eq!(infer_status("no tests ran in 0.01s"), OutcomeStatus::Unknown);
        assert_eq!(infer_status("ERROR: file not found"), OutcomeStatus::Fail);
    }

    #[test]
    fn test_finish_derives_fields() {
        let start = Utc::now();
        let end = start + chrono::Duration::milliseconds(2345);
        let outcome = ValidationOutcome::begin(&target(), "org/model")
            .with_team(Some("planner-coder-tester"))
            .with_start_ts(start)
            .finish_at(end, 4, Some("12 passed in 0.34s"), tokens());

        assert_eq!(outcome.elapsed_sec, 2.345);
        assert_eq!(outcome.status, OutcomeStatus::Pass);
        assert_eq!(outcome.messages, 4);
        assert_eq!(outcome.git_ref, "v2.31.0");
        assert_eq!(outcome.team.as_deref(), Some("planner-coder-tester"));
    }

    #[test]
    fn test_missing_tail_is_unknown_and_null() {
        let outcome = ValidationOutcome::begin(&target(), "m")
            .with_team(None::<String>)
            .finish(1, None, UsageTotals::default());
        assert_eq!(outcome.status, OutcomeStatus::Unknown);

        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json["final_pytest_tail"].is_null());
        assert!(json.get("team").is_none());
        assert_eq!(json["ref"], "v2.31.0");
        assert_eq!(json["status"], "unknown");
        assert_eq!(json["tokens"]["total"], 0);
    }

    #[tokio::test]
    async fn test_record_appends_one_line_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = ResultRecorder::new(dir.path().join("nested").join("results.jsonl"));

        for tail in ["12 passed in 0.34s", "3 failed, 1 error", ""] {
            let outcome = ValidationOutcome::begin(&target(), "m").finish(3, Some(tail), tokens());
            recorder.record(&outcome).await;
        }

        let text = std::fs::read_to_string(recorder.path()).unwrap();
        assert_eq!(text.lines().count(), 3);

        let outcomes = read_outcomes(recorder.path()).unwrap();
        let statuses: Vec<_> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![OutcomeStatus::Pass, OutcomeStatus::Fail, OutcomeStatus::Unknown]
        );
    }

    #[tokio::test]
    async fn test_reparsed_outcome_matches() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = ResultRecorder::new(dir.path().join("results.jsonl"));
        let outcome =
            ValidationOutcome::begin(&target(), "m").finish(5, Some("7 passed in 1.00s"), tokens());
        recorder.record(&outcome).await;

        let parsed = read_outcomes(recorder.path()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].instance_id.as_deref(), Some("psf-requests"));
        assert_eq!(parsed[0].status, OutcomeStatus::Pass);
        assert_eq!(parsed[0].tokens, tokens());
    }

    #[tokio::test]
    async fn test_record_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in place of the log file makes the open fail.
        let recorder = ResultRecorder::new(dir.path());
        let outcome = ValidationOutcome::begin(&target(), "m").finish(1, None, tokens());
        recorder.record(&outcome).await;
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_read_records_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        std::fs::write(&path, "{\"status\": \"pass\"}\nnot json\n\n{\"status\": \"fail\"}\n").unwrap();

        assert_eq!(read_records(&path).unwrap().len(), 2);
        // Neither line is a complete outcome.
        assert!(read_outcomes(&path).unwrap().is_empty());
        assert!(read_records(dir.path().join("missing.jsonl")).unwrap().is_empty());
    }
}
