//! HTTP status-code taxonomy

use http::StatusCode;

/// Broad class of an HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// 1xx
    Informational,
    /// 2xx
    Success,
    /// 3xx
    Redirection,
    /// 4xx
    ClientError,
    /// 5xx
    ServerError,
    /// Anything outside 100..=599
    Unknown,
}

impl StatusClass {
    /// Classify a status code
    pub fn of(status: StatusCode) -> Self {
        match status.as_u16() {
            100..=199 => StatusClass::Informational,
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirection,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Unknown,
        }
    }

    /// Lower-case label used in status descriptions
    pub fn label(self) -> &'static str {
        match self {
            StatusClass::Informational => "informational",
            StatusClass::Success => "success",
            StatusClass::Redirection => "redirection",
            StatusClass::ClientError => "client error",
            StatusClass::ServerError => "server error",
            StatusClass::Unknown => "unknown",
        }
    }
}

impl From<StatusCode> for StatusClass {
    fn from(status: StatusCode) -> Self {
        Self::of(status)
    }
}

/// Human-readable description such as `"Not Found (client error)"`
pub fn describe_status(status: StatusCode) -> String {
    let reason = status.canonical_reason().unwrap_or("Unrecognized status");
    format!("{} ({})", reason, StatusClass::of(status).label())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(StatusClass::of(StatusCode::CONTINUE), StatusClass::Informational);
        assert_eq!(StatusClass::of(StatusCode::NO_CONTENT), StatusClass::Success);
        assert_eq!(StatusClass::of(StatusCode::MOVED_PERMANENTLY), StatusClass::Redirection);
        assert_eq!(StatusClass::of(StatusCode::IM_A_TEAPOT), StatusClass::ClientError);
        assert_eq!(StatusClass::of(StatusCode::BAD_GATEWAY), StatusClass::ServerError);
    }

    #[test]
    fn test_unregistered_codes() {
        let status = StatusCode::from_u16(799).unwrap();
        assert_eq!(StatusClass::from(status), StatusClass::Unknown);
        assert_eq!(describe_status(status), "Unrecognized status (unknown)");
    }

    #[test]
    fn test_describe() {
        assert_eq!(
            describe_status(StatusCode::SERVICE_UNAVAILABLE),
            "Service Unavailable (server error)"
        );
    }
}
