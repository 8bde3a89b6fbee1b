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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! In-memory [outbox_router_core::Store] and [outbox_router_core::MessageBroker]
//! fakes for exercising `outbox_router_core` without a real database or
//! broker connection.

mod memory_broker;
mod memory_store;

pub use self::memory_broker::InMemoryBroker;
pub use self::memory_broker::InMemoryMessage;
pub use self::memory_store::InMemoryStore;
pub use self::memory_store::InMemoryWorkUnit;
