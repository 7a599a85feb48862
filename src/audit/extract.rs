use axum::http::{HeaderMap, Method, header};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::SiteConfig;

// per message, in chars
pub const MAX_MESSAGE_CHARS: usize = 500;

pub const ENTRY_DELIMITER: &str = "\n";

pub const GREETING_TOKEN: &str = "hi";

pub fn should_audit(sub_path: &str, method: &Method, site: &SiteConfig) -> bool {
    *method == Method::POST && sub_path == site.audit_path
}

// role:content lines; non-string contents are dropped
pub fn extract_audit_text(body: &Value, parameter: &str) -> String {
    let Some(messages) = body.get(parameter).and_then(Value::as_array) else {
        return String::new();
    };

    messages
        .iter()
        .filter_map(|entry| {
            let content = entry.get("content")?.as_str()?;
            let role = entry.get("role").and_then(Value::as_str).unwrap_or("");
            let content: String = normalize_whitespace(content)
                .chars()
                .take(MAX_MESSAGE_CHARS)
                .collect();
            Some(format!("{}:{}", role, content))
        })
        .collect::<Vec<_>>()
        .join(ENTRY_DELIMITER)
}

// any run of whitespace or control characters becomes one space
pub fn normalize_whitespace(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_greeting(body: &Value, parameter: &str) -> bool {
    let Some([only]) = body.get(parameter).and_then(Value::as_array).map(Vec::as_slice) else {
        return false;
    };
    only.get("role").and_then(Value::as_str) == Some("user")
        && only.get("content").and_then(Value::as_str) == Some(GREETING_TOKEN)
}

pub fn wants_stream(body: &Value) -> bool {
    body.get("stream").and_then(Value::as_bool).unwrap_or(false)
}

pub fn model_name(body: &Value) -> Option<&str> {
    body.get("model").and_then(Value::as_str)
}

pub fn credential(headers: &HeaderMap) -> String {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return String::new();
    };

    let value = value.trim();
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim().to_string(),
        _ => value.to_string(),
    }
}

// Short stable tag for logs, never the credential itself
pub fn credential_fingerprint(credential: &str) -> String {
    if credential.is_empty() {
        return "anonymous".to_string();
    }
    let digest = Sha256::digest(credential.as_bytes());
    format!("{:x}", digest)[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn site() -> SiteConfig {
        SiteConfig::for_origin("https://api.example.com")
    }

    #[test]
    fn test_should_audit() {
        assert!(should_audit("/v1/chat/completions", &Method::POST, &site()));
        assert!(!should_audit("/v1/chat/completions", &Method::GET, &site()));
        assert!(!should_audit("/v1/chat/completions/", &Method::POST, &site()));
        assert!(!should_audit("/v1/models", &Method::POST, &site()));
    }

    #[test]
    fn test_extract_formats_entries() {
        let body = json!({"messages": [
            {"role": "system", "content": "be  nice\n\n"},
            {"role": "user", "content": "hello\tworld"}
        ]});
        assert_eq!(
            extract_audit_text(&body, "messages"),
            "system:be nice\nuser:hello world"
        );
    }

    #[test]
    fn test_extract_drops_non_text_content() {
        let body = json!({"messages": [
            {"role": "user", "content": [{"type": "image_url", "image_url": {"url": "x"}}]},
            {"role": "user", "content": "ok"},
            {"role": "assistant", "content": null},
            "garbage"
        ]});
        assert_eq!(extract_audit_text(&body, "messages"), "user:ok");
    }

    #[test]
    fn test_extract_truncates_each_message() {
        let long = "é".repeat(800);
        let body = json!({"messages": [{"role": "user", "content": long}]});
        let text = extract_audit_text(&body, "messages");
        assert_eq!(text.chars().count(), "user:".len() + MAX_MESSAGE_CHARS);
    }

    #[test]
    fn test_extract_missing_or_malformed_field() {
        assert_eq!(extract_audit_text(&json!({}), "messages"), "");
        assert_eq!(extract_audit_text(&json!({"messages": "hi"}), "messages"), "");
        assert_eq!(extract_audit_text(&json!({"messages": {"a": 1}}), "messages"), "");
        assert_eq!(extract_audit_text(&json!([1, 2]), "messages"), "");
    }

    #[test]
    fn test_extract_custom_parameter() {
        let body = json!({"input": [{"role": "user", "content": "x"}]});
        assert_eq!(extract_audit_text(&body, "input"), "user:x");
        assert_eq!(extract_audit_text(&body, "messages"), "");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \u{0007}\r\n b  "), "a b");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_greeting_detection() {
        assert!(is_greeting(&json!({"messages": [{"role": "user", "content": "hi"}]}), "messages"));
        assert!(!is_greeting(&json!({"messages": [{"role": "user", "content": "hi "}]}), "messages"));
        assert!(!is_greeting(&json!({"messages": [{"role": "system", "content": "hi"}]}), "messages"));
        assert!(!is_greeting(
            &json!({"messages": [
                {"role": "user", "content": "hi"},
                {"role": "user", "content": "hi"}
            ]}),
            "messages"
        ));
        assert!(!is_greeting(&json!({}), "messages"));
    }

    #[test]
    fn test_credential_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(credential(&headers), "");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sk-123"));
        assert_eq!(credential(&headers), "sk-123");

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("raw-key"));
        assert_eq!(credential(&headers), "raw-key");
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = credential_fingerprint("sk-123");
        assert_eq!(a.len(), 12);
        assert_eq!(a, credential_fingerprint("sk-123"));
        assert_ne!(a, credential_fingerprint("sk-124"));
        assert_eq!(credential_fingerprint(""), "anonymous");
    }
}
