//! Redaction applied to error messages and context values before they
//! leave the crate.
//!
//! URLs are reduced to scheme + host + port, filesystem paths become
//! `[PATH]`, IPv4 addresses become `[IP]`, email addresses become
//! `[EMAIL]`, and the result is capped at [`MAX_MESSAGE_LEN`] characters.

use std::sync::OnceLock;

use regex::Regex;

/// Hard cap on redacted message length, in characters.
pub const MAX_MESSAGE_LEN: usize = 512;

fn ipv4_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("ipv4 pattern compiles"))
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("email pattern compiles")
    })
}

/// Redact a free-form message.
pub fn redact_text(input: &str) -> String {
    let redacted = input
        .split(' ')
        .map(redact_token)
        .collect::<Vec<_>>()
        .join(" ");
    truncate(&redacted)
}

/// Redact every string inside a JSON value, recursively.
pub fn redact_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(text) => serde_json::Value::String(redact_text(text)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(redact_value).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), redact_value(item)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn redact_token(token: &str) -> String {
    if token.contains("://") {
        let reduced = reduce_url(token);
        return ipv4_pattern().replace_all(&reduced, "[IP]").into_owned();
    }
    if email_pattern().is_match(token) {
        return email_pattern().replace_all(token, "[EMAIL]").into_owned();
    }
    if looks_like_path(token) {
        return "[PATH]".to_string();
    }
    ipv4_pattern().replace_all(token, "[IP]").into_owned()
}

fn reduce_url(token: &str) -> String {
    let trimmed = token.trim_matches(|c: char| matches!(c, '"' | '\'' | ',' | ';' | '(' | ')'));
    match reqwest::Url::parse(trimmed) {
        Ok(url) => {
            let host = url.host_str().unwrap_or_default();
            match url.port_or_known_default() {
                Some(port) => format!("{}://{host}:{port}", url.scheme()),
                None => format!("{}://{host}", url.scheme()),
            }
        }
        Err(_) => "[URL]".to_string(),
    }
}

fn looks_like_path(token: &str) -> bool {
    let trimmed = token.trim_matches(|c: char| matches!(c, '"' | '\'' | ',' | ';' | '(' | ')'));
    if trimmed.len() < 2 {
        return false;
    }
    trimmed.starts_with('/')
        || trimmed.starts_with("~/")
        || trimmed.starts_with("./")
        || (trimmed.as_bytes()[0].is_ascii_alphabetic() && trimmed[1..].starts_with(":\\"))
}

fn truncate(input: &str) -> String {
    if input.chars().count() <= MAX_MESSAGE_LEN {
        return input.to_string();
    }
    let mut out: String = input.chars().take(MAX_MESSAGE_LEN).collect();
    out.push('…');
    out
}
