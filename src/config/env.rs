//! Environment variable templating for config files
//!
//! `{{ .NAME }}` is replaced with the value of the environment variable
//! `NAME`. Unset variables are collected and reported together.

use std::env;
use std::sync::OnceLock;

use regex::Regex;

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder pattern")
    })
}

/// Templating errors
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("environment variables not set: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("malformed template action at byte {0}")]
    Malformed(usize),
}

/// Render `{{ .NAME }}` placeholders from the process environment
pub fn render_env(input: &str) -> Result<String, TemplateError> {
    render_with(input, |name| env::var(name).ok())
}

/// Render placeholders using `lookup` to resolve names
pub fn render_with<F>(input: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing = Vec::new();

    let rendered = placeholder().replace_all(input, |caps: &regex::Captures| {
        let name = &caps[1];
        match lookup(name) {
            Some(value) => value,
            None => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(TemplateError::Missing(missing));
    }

    if let Some(pos) = stray_action(input) {
        return Err(TemplateError::Malformed(pos));
    }

    Ok(rendered.into_owned())
}

/// Offset of a `{{` in `input` that is not part of a placeholder.
///
/// Only the template is scanned; substituted values may contain anything.
fn stray_action(input: &str) -> Option<usize> {
    let mut start = 0;
    for m in placeholder().find_iter(input) {
        if let Some(pos) = input[start..m.start()].find("{{") {
            return Some(start + pos);
        }
        start = m.end();
    }
    input[start..].find("{{").map(|pos| start + pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_render() {
        let lookup = lookup_from(&[
            ("TEST_RENDER_ENV_HOST", "db.example.com"),
            ("TEST_RENDER_ENV_PORT", "1234"),
        ]);
        let out = render_with(
            "host: {{ .TEST_RENDER_ENV_HOST }}\nport: {{.TEST_RENDER_ENV_PORT}}",
            lookup,
        )
        .unwrap();
        assert_eq!(out, "host: db.example.com\nport: 1234");
    }

    #[test]
    fn test_no_placeholders() {
        let out = render_with("plain: text", lookup_from(&[])).unwrap();
        assert_eq!(out, "plain: text");
    }

    #[test]
    fn test_missing_reported_together() {
        let err = render_with("{{ .A }} {{ .B }} {{ .A }}", lookup_from(&[])).unwrap_err();
        match err {
            TemplateError::Missing(names) => assert_eq!(names, vec!["A", "B"]),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_broken_template() {
        let err = render_with("{{ broken template!!", lookup_from(&[])).unwrap_err();
        assert!(matches!(err, TemplateError::Malformed(0)));
    }

    #[test]
    fn test_value_with_braces_is_not_reparsed() {
        let lookup = lookup_from(&[("PW", "a{{b}}c")]);
        let out = render_with("password: {{ .PW }}", lookup).unwrap();
        assert_eq!(out, "password: a{{b}}c");
    }

    #[test]
    fn test_stray_action_after_placeholder() {
        let lookup = lookup_from(&[("HOST", "db")]);
        let err = render_with("host: {{ .HOST }} port: {{ .PORT", lookup).unwrap_err();
        assert!(matches!(err, TemplateError::Malformed(24)));
    }

    #[test]
    fn test_render_env_from_process() {
        std::env::set_var("SQLPULSE_TEST_RENDER_ENV", "from-env");
        let out = render_env("value: {{ .SQLPULSE_TEST_RENDER_ENV }}").unwrap();
        std::env::remove_var("SQLPULSE_TEST_RENDER_ENV");
        assert_eq!(out, "value: from-env");
    }
}
