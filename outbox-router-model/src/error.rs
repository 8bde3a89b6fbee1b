/*
    Copyright 2025 MydriaTech AB

    Licensed under the Apache License 2.0 with Free world makers exception
    1.0.0 (the "License"); you may not use this file except in compliance with
    the License. You should have obtained a copy of the License with the source
    or binary distribution in file named

        LICENSE-Apache-2.0-with-FWM-Exception-1.0.0

    Unless required by applicable law or agreed to in writing, software
    distributed under the License is distributed on an "AS IS" BASIS,
    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
    See the License for the specific language governing permissions and
    limitations under the License.
*/

//! Reliable event router errors.

use std::error::Error;
use std::fmt;

/// Cause of a [RouterError].
#[derive(Debug)]
pub enum RouterErrorKind {
    /// A subject was registered more than once in a [crate::guarantee::Guarantee]-bearing registry.
    DuplicateRegistration,
    /// `delay_on_exc` was not strictly positive at registration time.
    InvalidDelay,
    /// `record_completion_with_guarantee` was called for an `event_id` already present in the handled log.
    DuplicateCompletion,
    /// An entity's outbox was non-empty after it was cleared inside a scheduling scope.
    OutboxLeak,
    /// A registered handler returned an error while processing a message.
    HandlerFailure,
    /// Failure reported by the persistent store (outbox/inbox) implementation.
    Store,
    /// Failure reported by the message broker adapter implementation.
    Broker,
}

impl fmt::Display for RouterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl RouterErrorKind {
    /// Create a new instance with an error message.
    pub fn error_with_msg<S: AsRef<str>>(self, msg: S) -> RouterError {
        RouterError {
            kind: self,
            msg: Some(msg.as_ref().to_string()),
            source: None,
        }
    }

    /// Create a new instance without an error message.
    pub fn error(self) -> RouterError {
        RouterError {
            kind: self,
            msg: None,
            source: None,
        }
    }

    /// Create a new instance wrapping the failure reported by a collaborator.
    pub fn error_with_source(
        self,
        source: Box<dyn Error + Send + Sync + 'static>,
    ) -> RouterError {
        RouterError {
            kind: self,
            msg: None,
            source: Some(source),
        }
    }
}

/** Reliable event router error.

Create a new instance via [RouterErrorKind]. No other exception type is
expected to cross the router's public boundary.
*/
#[derive(Debug)]
pub struct RouterError {
    kind: RouterErrorKind,
    msg: Option<String>,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl RouterError {
    /// Return the kind of error.
    pub fn kind(&self) -> &RouterErrorKind {
        &self.kind
    }
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(msg) = &self.msg {
            write!(f, "{} {}", self.kind, msg)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl Error for RouterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message_when_present() {
        let err = RouterErrorKind::InvalidDelay.error_with_msg("delay must be > 0");
        assert_eq!(err.to_string(), "InvalidDelay delay must be > 0");
    }

    #[test]
    fn display_omits_message_when_absent() {
        let err = RouterErrorKind::OutboxLeak.error();
        assert_eq!(err.to_string(), "OutboxLeak");
    }
}
