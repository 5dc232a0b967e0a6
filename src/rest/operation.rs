//! Named resource operations and their HTTP methods

use std::fmt;

use http::Method;

/// Operation on a REST resource.
///
/// Each operation maps to exactly one HTTP method; the helpers on
/// [`crate::rest::Resource`] never pick a method on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read the resource (`GET`)
    Fetch,
    /// Create a new resource (`POST`)
    Create,
    /// Replace the resource (`PUT`)
    Replace,
    /// Partially update the resource (`PATCH`)
    Update,
    /// Delete the resource (`DELETE`)
    Remove,
}

impl Operation {
    /// HTTP method issued for this operation
    pub fn method(self) -> Method {
        match self {
            Operation::Fetch => Method::GET,
            Operation::Create => Method::POST,
            Operation::Replace => Method::PUT,
            Operation::Update => Method::PATCH,
            Operation::Remove => Method::DELETE,
        }
    }

    /// Whether the operation sends a payload
    pub fn carries_payload(self) -> bool {
        matches!(self, Operation::Create | Operation::Replace | Operation::Update)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Fetch => "fetch",
            Operation::Create => "create",
            Operation::Replace => "replace",
            Operation::Update => "update",
            Operation::Remove => "remove",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_methods() {
        assert_eq!(Operation::Fetch.method(), Method::GET);
        assert_eq!(Operation::Create.method(), Method::POST);
        assert_eq!(Operation::Replace.method(), Method::PUT);
        assert_eq!(Operation::Update.method(), Method::PATCH);
        assert_eq!(Operation::Remove.method(), Method::DELETE);
    }

    #[test]
    fn test_payload_operations() {
        assert!(!Operation::Fetch.carries_payload());
        assert!(Operation::Update.carries_payload());
        assert!(!Operation::Remove.carries_payload());
    }
}
