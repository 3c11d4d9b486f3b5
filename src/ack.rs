// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The request/reply vocabulary: which shadow operation was requested, and
//! the outcome delivered back to its caller.

use serde_json::Value;

/// Which shadow operation an in-flight entry is waiting on a reply for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// `update(reported)` — publish reported state.
    Update,
    /// `get()` — fetch the full shadow document.
    Get,
    /// `delete()` — delete the shadow document.
    Delete,
}

impl Action {
    /// The topic verb this action publishes on (`update`, `get`, `delete`).
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Action::Update => "update",
            Action::Get => "get",
            Action::Delete => "delete",
        }
    }
}

/// The outcome of a single shadow request, delivered to its callback exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    /// The cloud accepted the request; carries the full response document.
    Accepted(Value),
    /// The cloud rejected the request; carries a machine code and human message.
    Rejected {
        /// Machine-readable rejection code, e.g. `"E_NOT_FOUND"`.
        code: String,
        /// Human-readable rejection message.
        message: String,
    },
    /// No reply arrived before the request's deadline.
    Timeout,
}

impl Ack {
    /// Constructs an accepted ack from a parsed response document.
    #[must_use]
    pub fn accepted(document: Value) -> Self {
        Ack::Accepted(document)
    }

    /// Constructs a rejected ack from a code/message pair.
    #[must_use]
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Ack::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// True if this ack is `Accepted`.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Ack::Accepted(_))
    }

    /// True if this ack is `Rejected`.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Ack::Rejected { .. })
    }

    /// True if this ack is `Timeout`.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Ack::Timeout)
    }
}

/// A user error returned by a delta handler, to be propagated to the cloud
/// on `delta/rejected` (SPEC_FULL.md §4.3/§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaError {
    /// Machine-readable rejection code.
    pub code: String,
    /// Human-readable rejection message.
    pub message: String,
}

impl DeltaError {
    /// Constructs a delta rejection.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_verb() {
        assert_eq!(Action::Update.verb(), "update");
        assert_eq!(Action::Get.verb(), "get");
        assert_eq!(Action::Delete.verb(), "delete");
    }

    #[test]
    fn ack_predicates() {
        let accepted = Ack::accepted(json!({"power": "on"}));
        assert!(accepted.is_accepted());
        assert!(!accepted.is_rejected());

        let rejected = Ack::rejected("E_NOT_FOUND", "no shadow");
        assert!(rejected.is_rejected());
        assert!(!rejected.is_timeout());

        assert!(Ack::Timeout.is_timeout());
    }

    #[test]
    fn delta_error_constructor() {
        let err = DeltaError::new("E_RANGE", "out of range");
        assert_eq!(err.code, "E_RANGE");
        assert_eq!(err.message, "out of range");
    }
}
