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

//! Reliable event router: schedules outbound events through a claim-based
//! outbox and dispatches inbound broker messages under a chosen delivery
//! guarantee, deduplicated against a persistent integrity log.
//!
//! This crate defines the engine. Concrete storage and broker transport are
//! supplied by implementing [store::Store] and [message::MessageBroker];
//! `outbox_router_testkit` has in-memory implementations suitable for tests.

pub mod conf;
pub mod guard;
pub mod lifespan;
pub mod message;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod task_group;

pub use self::conf::RouterConfig;
pub use self::lifespan::Lifespan;
pub use self::message::Message;
pub use self::message::MessageBroker;
pub use self::registry::HandlerRegistry;
pub use self::registry::HandlerSpecification;
pub use self::registry::MessageHandler;
pub use self::router::Router;
pub use self::scheduler::Scheduler;
pub use self::store::Store;
pub use self::task_group::TaskGroup;
