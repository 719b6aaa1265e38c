//! Shell quoting and argument screening for sandbox command composition.

/// Quote a string for safe embedding in a POSIX shell command line.
///
/// Strings made only of `[A-Za-z0-9@%+=:,./_-]` pass through unchanged; the
/// empty string becomes `''`; anything else is wrapped in single quotes with
/// embedded single quotes rendered as `'"'"'`.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(is_safe_char) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

fn is_safe_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '_' | '-')
}

/// Reject a git argument that would be parsed as an option.
///
/// Quoting does not stop `git clone -uevil` style flag injection, so refs and
/// repository URLs starting with `-` are refused before they reach a command.
pub fn validate_git_arg(kind: &str, value: &str) -> Result<(), anyhow::Error> {
    if value.trim_start().starts_with('-') {
        anyhow::bail!(
            "{} '{}' must not start with '-' (could be interpreted as a flag)",
            kind,
            value
        );
    }
    if value.contains('\0') {
        anyhow::bail!("{} contains a NUL byte", kind);
    }
    Ok(())
}
