//! Environment variable interpolation for config files.
//!
//! Supported syntax:
//! - `$VAR` / `${VAR}` - substitute, error if unset
//! - `${VAR:-default}` - default when unset or empty
//! - `${VAR-default}` - default only when unset
//! - `$$` - literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        |
        \$\{ ([A-Za-z_][A-Za-z0-9_]*) (?: (:?-) ([^}]*) )? \}
        |
        \$ ([A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("hardcoded pattern is valid")
});

/// Interpolate environment variables in `input`.
///
/// All missing variables are accumulated so the user sees the full list in
/// one pass rather than fixing them one at a time.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    let mut errors = Vec::new();

    let text = VAR_PATTERN.replace_all(input, |caps: &Captures| {
        expand(caps, &mut errors)
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(errors)
    }
}

fn expand(caps: &Captures, errors: &mut Vec<String>) -> String {
    let matched = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
    if matched == "$$" {
        return "$".to_string();
    }

    let name = caps
        .get(1)
        .or_else(|| caps.get(4))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let empty_takes_default = caps.get(2).is_some_and(|m| m.as_str() == ":-");
    let default = caps.get(3).map(|m| m.as_str());

    match env::var(name) {
        Ok(value) if value.is_empty() && empty_takes_default => {
            default.unwrap_or_default().to_string()
        }
        Ok(value) => value,
        Err(_) => match default {
            Some(fallback) => fallback.to_string(),
            None => {
                errors.push(format!("environment variable '{name}' is not set"));
                matched.to_string()
            }
        },
    }
}
