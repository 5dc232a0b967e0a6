//! Default authorization for REST clients

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::HeaderValue;

use crate::{Error, Result};

/// Authorization sent with every request of a [`crate::RestClient`].
///
/// ```rust
/// use tasklane::Auth;
///
/// assert_eq!(Auth::basic("user", "pass").to_header_value(), "Basic dXNlcjpwYXNz");
/// assert_eq!(Auth::bearer("token123").to_header_value(), "Bearer token123");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    /// `Authorization: Basic <base64(username:password)>`
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },
    /// `Authorization: Bearer <token>`
    Bearer {
        /// Bearer token
        token: String,
    },
    /// `Authorization: <scheme> <credentials>`
    Custom {
        /// Authentication scheme (e.g. "ApiKey")
        scheme: String,
        /// Credentials for the scheme
        credentials: String,
    },
}

impl Auth {
    /// HTTP Basic authentication
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Bearer token authentication
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Authentication with a custom scheme
    pub fn custom(scheme: impl Into<String>, credentials: impl Into<String>) -> Self {
        Self::Custom {
            scheme: scheme.into(),
            credentials: credentials.into(),
        }
    }

    /// Value of the `Authorization` header
    pub fn to_header_value(&self) -> String {
        match self {
            Auth::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{}:{}", username, password));
                format!("Basic {}", encoded)
            }
            Auth::Bearer { token } => format!("Bearer {}", token),
            Auth::Custom {
                scheme,
                credentials,
            } => format!("{} {}", scheme, credentials),
        }
    }

    /// Header value marked sensitive so it is redacted from debug output
    pub(crate) fn header(&self) -> Result<HeaderValue> {
        let mut value =
            HeaderValue::from_str(&self.to_header_value()).map_err(|_| Error::InvalidHeader)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Auth({})", self)
    }
}

impl fmt::Display for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { username, .. } => write!(f, "Basic authentication for user: {}", username),
            Auth::Bearer { .. } => write!(f, "Bearer token authentication"),
            Auth::Custom { scheme, .. } => write!(f, "Custom {} authentication", scheme),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth() {
        let auth = Auth::basic("user", "pass");
        assert_eq!(auth.to_header_value(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_custom_auth() {
        let auth = Auth::custom("ApiKey", "secret123");
        assert_eq!(auth.to_header_value(), "ApiKey secret123");
    }

    #[test]
    fn test_header_is_sensitive() {
        let header = Auth::bearer("token123").header().unwrap();
        assert!(header.is_sensitive());
        assert_eq!(header.to_str().unwrap(), "Bearer token123");
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", Auth::basic("john", "hunter2"));
        assert!(rendered.contains("john"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_newline_in_token_is_invalid_header() {
        assert!(matches!(
            Auth::bearer("bad\ntoken").header(),
            Err(Error::InvalidHeader)
        ));
    }
}
