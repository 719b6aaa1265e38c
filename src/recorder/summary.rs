//! Tab-separated summary of the results log.

use serde_json::Value;

/// Team label shown for records without a `team` field.
pub const DEFAULT_TEAM_LABEL: &str = "one-agent";

/// Printed instead of a table when the log holds no records.
pub const NO_RESULTS: &str = "(no results)";

/// Cell text for a field recorded as `null`.
const NULL_CELL: &str = "None";

const COLUMNS: &[&str] = &[
    "end_ts",
    "instance_id",
    "team",
    "model",
    "status",
    "elapsed_sec",
    "messages",
    "tokens_total",
];

/// Exact-match filters; `None` keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryFilter {
    pub instance: Option<String>,
    pub model: Option<String>,
    pub team: Option<String>,
}

impl SummaryFilter {
    /// Blank values are treated as unset.
    pub fn new(instance: Option<String>, model: Option<String>, team: Option<String>) -> Self {
        let clean = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            instance: clean(instance),
            model: clean(model),
            team: clean(team),
        }
    }

    pub fn keeps(&self, record: &Value) -> bool {
        let matches = |want: &Option<String>, got: String| want.as_ref().map_or(true, |w| *w == got);
        matches(&self.instance, field(record, "instance_id"))
            && matches(&self.model, field(record, "model"))
            && matches(&self.team, team_label(record))
    }
}

/// Cell text for `key`. A missing key is blank; an explicit `null` reads
/// `None` so that `--instance None` selects rows recorded without an id.
fn field(record: &Value, key: &str) -> String {
    match record.get(key) {
        None => String::new(),
        Some(Value::Null) => NULL_CELL.to_string(),
        Some(Value::Bool(true)) => "True".to_string(),
        Some(Value::Bool(false)) => "False".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn team_label(record: &Value) -> String {
    match record.get("team") {
        None => DEFAULT_TEAM_LABEL.to_string(),
        Some(_) => field(record, "team"),
    }
}

fn tokens_total(record: &Value) -> String {
    match record.get("tokens") {
        Some(Value::Object(tokens)) => {
            let total = tokens
                .get("total")
                .and_then(|t| t.as_f64())
                .unwrap_or(0.0);
            format!("{}", total as i64)
        }
        _ => "-".to_string(),
    }
}

/// Render `records` as a TSV table after applying `filter`.
///
/// An empty log renders as [`NO_RESULTS`]; a filter that matches nothing
/// renders the header alone.
pub fn render_summary(records: &[Value], filter: &SummaryFilter) -> String {
    if records.is_empty() {
        return NO_RESULTS.to_string();
    }

    let mut lines = vec![COLUMNS.join("\t")];
    lines.extend(records.iter().filter(|r| filter.keeps(r)).map(|r| {
        [
            field(r, "end_ts"),
            field(r, "instance_id"),
            team_label(r),
            field(r, "model"),
            field(r, "status"),
            field(r, "elapsed_sec"),
            field(r, "messages"),
            tokens_total(r),
        ]
        .join("\t")
    }));
    lines.join("\n")
}
