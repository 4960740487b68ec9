//! Provider error classification
//!
//! Maps a Graph response document (or its absence) to the recovery action the
//! fetcher should take. Two error shapes are recognized:
//!
//! - `{"error": {"code": 4, "message": "..."}}`
//! - `{"error_code": 4, "error_msg": "..."}` (legacy REST style)
//!
//! Codes may arrive as numbers or as numeric strings.

use serde_json::Value;

/// Message reported when the transport produced no document at all
pub const NO_RESPONSE_MESSAGE: &str = "no response from provider";

/// Recovery class of a fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Usable response
    Ok,
    /// Retry after a delay, bounded
    Transient,
    /// Request volume over the provider's ceiling; retry after a longer delay
    Throttled,
    /// Page too large; halve the limit and retry immediately
    OversizedPage,
    /// Unrecoverable; abandon the sweep
    Fatal,
}

impl ErrorKind {
    /// Returns the kind as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Transient => "transient",
            Self::Throttled => "throttled",
            Self::OversizedPage => "oversized_page",
            Self::Fatal => "fatal",
        }
    }

    /// Classifies a provider error code
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) | Some(2) => Self::OversizedPage,
            Some(4) | Some(17) | Some(32) | Some(613) => Self::Throttled,
            Some(10) | Some(190) | Some(200..=299) | Some(602) => Self::Fatal,
            _ => Self::Transient,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The outcome of classifying one response
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub code: Option<i64>,
    pub message: String,
}

impl Classification {
    fn ok() -> Self {
        Self {
            kind: ErrorKind::Ok,
            code: None,
            message: String::new(),
        }
    }
}

/// Classifies a response document
///
/// `None` means the transport failed and is treated as [`ErrorKind::Transient`]
/// with [`NO_RESPONSE_MESSAGE`]. Documents that are not JSON objects are
/// passed through as [`ErrorKind::Ok`].
pub fn classify(document: Option<&Value>) -> Classification {
    let Some(document) = document else {
        return Classification {
            kind: ErrorKind::Transient,
            code: None,
            message: NO_RESPONSE_MESSAGE.to_string(),
        };
    };

    let Some(object) = document.as_object() else {
        return Classification::ok();
    };

    let (code, message) = if let Some(error) = object.get("error") {
        (
            error.get("code").and_then(parse_code),
            error.get("message").and_then(Value::as_str),
        )
    } else if let Some(message) = object.get("error_msg") {
        (
            object.get("error_code").and_then(parse_code),
            message.as_str(),
        )
    } else {
        return Classification::ok();
    };

    Classification {
        kind: ErrorKind::from_code(code),
        code,
        message: message.unwrap_or_default().to_string(),
    }
}

fn parse_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kind_of(document: Value) -> ErrorKind {
        classify(Some(&document)).kind
    }

    #[test]
    fn test_missing_response_is_transient() {
        let classification = classify(None);
        assert_eq!(classification.kind, ErrorKind::Transient);
        assert_eq!(classification.message, NO_RESPONSE_MESSAGE);
    }

    #[test]
    fn test_data_document_is_ok() {
        assert_eq!(kind_of(json!({"data": []})), ErrorKind::Ok);
        assert_eq!(kind_of(json!([1, 2, 3])), ErrorKind::Ok);
    }

    #[test]
    fn test_graph_error_codes() {
        assert_eq!(
            kind_of(json!({"error": {"code": 1, "message": "Please reduce the amount of data"}})),
            ErrorKind::OversizedPage
        );
        assert_eq!(
            kind_of(json!({"error": {"code": 4, "message": "Application request limit reached"}})),
            ErrorKind::Throttled
        );
        assert_eq!(
            kind_of(json!({"error": {"code": 190, "message": "Session has expired"}})),
            ErrorKind::Fatal
        );
        assert_eq!(
            kind_of(json!({"error": {"code": 230, "message": "Permission denied"}})),
            ErrorKind::Fatal
        );
        assert_eq!(
            kind_of(json!({"error": {"code": 100, "message": "Unknown path"}})),
            ErrorKind::Transient
        );
    }

    #[test]
    fn test_error_without_code_is_transient() {
        let classification = classify(Some(&json!({"error": {"message": "boom"}})));
        assert_eq!(classification.kind, ErrorKind::Transient);
        assert_eq!(classification.code, None);
        assert_eq!(classification.message, "boom");
    }

    #[test]
    fn test_legacy_error_shape_with_string_code() {
        let classification = classify(Some(&json!({
            "error_code": "602",
            "error_msg": "bad field"
        })));
        assert_eq!(classification.kind, ErrorKind::Fatal);
        assert_eq!(classification.code, Some(602));
        assert_eq!(classification.message, "bad field");
    }
}
