//! Text tool-call extraction for models without native function calling.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::tools::ToolCall;

/// Trait for parsing tool calls from LLM responses.
pub trait ToolCallParser: Send + Sync {
    /// Extract the first call to one of `tools` from `response`.
    fn parse(&self, response: &str, tools: &[&str]) -> Option<ToolCall>;
}

/// Default parser. Recognises, in order:
///
/// 1. a JSON object with `tool`/`arguments` (or `name`/`parameters`/`args`),
/// 2. a call expression `swe_clone({...})` or `swe_clone(repo_url="...")`,
/// 3. a fenced ```` ```json ```` block holding form 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonToolCallParser;

impl ToolCallParser for JsonToolCallParser {
    fn parse(&self, response: &str, tools: &[&str]) -> Option<ToolCall> {
        if tools.is_empty() {
            return None;
        }
        self.parse_json_format(response, tools)
            .or_else(|| self.parse_function_format(response, tools))
            .or_else(|| self.parse_code_block_format(response, tools))
    }
}

impl JsonToolCallParser {
    /// Scan balanced top-level `{...}` spans for a tool call object.
    ///
    /// Braces inside JSON strings do not count toward the balance.
    fn parse_json_format(&self, response: &str, tools: &[&str]) -> Option<ToolCall> {
        let mut depth = 0usize;
        let mut start = None;
        let mut in_string = false;
        let mut escaped = false;

        for (i, c) in response.char_indices() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }
            match c {
                // Quotes in surrounding prose are not JSON strings.
                '"' if depth > 0 => in_string = true,
                '{' => {
                    if depth == 0 {
                        start = Some(i);
                    }
                    depth += 1;
                }
                '}' if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            if let Ok(value) = serde_json::from_str::<Value>(&response[s..=i]) {
                                if let Some(call) = call_from_object(&value, tools) {
                                    return Some(call);
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Parse `tool_name(...)` with JSON or keyword arguments.
    fn parse_function_format(&self, response: &str, tools: &[&str]) -> Option<ToolCall> {
        let mut best: Option<(usize, ToolCall)> = None;

        for tool_name in tools {
            let pattern = format!("{}(", tool_name);
            let Some(start) = response.find(&pattern) else {
                continue;
            };
            if best.as_ref().is_some_and(|(pos, _)| *pos < start) {
                continue;
            }
            let remaining = &response[start + pattern.len()..];
            let Some(end) = matching_paren(remaining) else {
                continue;
            };
            let args_str = remaining[..end].trim();

            let arguments = if args_str.is_empty() {
                Some(Value::Object(Map::new()))
            } else if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(args_str) {
                Some(value)
            } else {
                parse_keyword_args(args_str)
            };

            if let Some(arguments) = arguments {
                best = Some((start, ToolCall::new(*tool_name, arguments)));
            }
        }

        best.map(|(_, call)| call)
    }

    /// Parse tool calls from fenced json blocks.
    fn parse_code_block_format(&self, response: &str, tools: &[&str]) -> Option<ToolCall> {
        let json_block_start = "```json";
        let block_end = "```";

        let start = response.find(json_block_start)?;
        let remaining = &response[start + json_block_start.len()..];
        let end = remaining.find(block_end)?;
        let value = serde_json::from_str::<Value>(remaining[..end].trim()).ok()?;
        call_from_object(&value, tools)
    }
}

fn call_from_object(value: &Value, tools: &[&str]) -> Option<ToolCall> {
    let (name, arguments) = if let Some(name) = value.get("tool").and_then(|v| v.as_str()) {
        (name, value.get("arguments"))
    } else {
        let name = value.get("name").and_then(|v| v.as_str())?;
        (
            name,
            value
                .get("parameters")
                .or_else(|| value.get("arguments"))
                .or_else(|| value.get("args")),
        )
    };

    if !tools.contains(&name) {
        return None;
    }

    let arguments = match arguments {
        // Some models double-encode the arguments object.
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or(Value::String(s.clone())),
        Some(v) => v.clone(),
        None => Value::Object(Map::new()),
    };
    Some(ToolCall::new(name, arguments))
}

/// Index of the `)` closing an already opened paren, skipping quoted text.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn keyword_arg_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(\w+)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)')"#).ok()
    })
    .as_ref()
}

/// `repo_url="x", ref='y'` → `{"repo_url": "x", "ref": "y"}`.
fn parse_keyword_args(s: &str) -> Option<Value> {
    let mut args = Map::new();
    for caps in keyword_arg_regex()?.captures_iter(s) {
        let key = caps.get(1)?.as_str().to_string();
        let raw = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()).unwrap_or("");
        args.insert(key, Value::String(raw.replace("\\\"", "\"").replace("\\'", "'")));
    }
    (!args.is_empty()).then_some(Value::Object(args))
}
