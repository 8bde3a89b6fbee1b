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

//! Envelope, entity outbox, work unit and error primitives shared by the
//! reliable event router.
//!
//! This crate has no opinion about brokers or persistence backends: it only
//! defines the data that crosses those boundaries and the scoped-transaction
//! abstraction ([`work_unit::WorkUnit`]) that `outbox_router_core` composes.

pub mod entity;
pub mod error;
pub mod event;
pub mod guarantee;
pub mod work_unit;

pub use self::entity::Entity;
pub use self::error::RouterError;
pub use self::error::RouterErrorKind;
pub use self::event::DomainEvent;
pub use self::event::EventPayload;
pub use self::guarantee::Guarantee;
pub use self::work_unit::WorkUnit;
