use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("external user id is empty")]
    Empty,
    #[error("external user id looks like a URL")]
    LooksLikeUrl,
    #[error("external user id equals the hosted origin")]
    HostedOrigin,
}

/// Coerce a raw `externalUserId` payload into a string. Strings are trimmed,
/// numbers render in decimal, everything else becomes empty.
pub fn normalize_external_id(raw: &Value) -> String {
    match raw {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    }
}

/// Reject values that are probably a navigation URL echoed back instead of an
/// identity.
pub fn validate_external_id(value: &str, hosted_origin: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    if trimmed.trim_end_matches('/') == hosted_origin.trim_end_matches('/') {
        return Err(ValidationError::HostedOrigin);
    }

    if let Ok(url) = Url::parse(trimmed) {
        if matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::LooksLikeUrl);
        }
    }

    Ok(trimmed.to_string())
}
