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

//! The delivery semantic a handler is registered under.

use serde::Deserialize;
use serde::Serialize;

/// Delivery guarantee under which a handler is invoked.
///
/// See the ordering table in the router's component design for the exact
/// relationship between handler invocation, recording completion and
/// acknowledging the broker message for each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Guarantee {
    /// Handler runs, then completion is recorded, then the message is acknowledged.
    AtLeastOnce,
    /// Completion is recorded and acknowledged inside the same work unit as the handler.
    ExactlyOnce,
    /// Completion is recorded and acknowledged before the handler runs.
    NoMoreThanOnce,
}

impl std::fmt::Display for Guarantee {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            Guarantee::AtLeastOnce => "AT_LEAST_ONCE",
            Guarantee::ExactlyOnce => "EXACTLY_ONCE",
            Guarantee::NoMoreThanOnce => "NO_MORE_THAN_ONCE",
        };
        write!(f, "{s}")
    }
}
