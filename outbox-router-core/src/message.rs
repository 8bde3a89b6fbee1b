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

//! Abstract contract a concrete broker transport adapts to.
//!
//! The source expresses the payload/confirmation streams as `anyio` memory
//! object streams. [tokio::sync::mpsc] channels are this crate's analog: a
//! bounded channel gives the same explicit-close, natural-backpressure
//! behavior.

use async_trait::async_trait;
use outbox_router_model::EventPayload;
use outbox_router_model::RouterError;
use tokio::sync::mpsc;

/// A broker-delivered envelope carrying one [EventPayload] plus an
/// idempotent acknowledgement capability.
#[async_trait]
pub trait Message: Send + Sync {
    /// The payload this delivery carries.
    fn event_payload(&self) -> &EventPayload;

    /// Acknowledge this delivery to the broker. Idempotent: calling this more
    /// than once has no additional effect.
    async fn acknowledge(&self);
}

/// Adapter contract between the scheduler/router and a concrete broker
/// transport.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Concrete [Message] type this adapter hands out on delivery.
    type Msg: Message + 'static;

    /// Drain `payload_recv` until it closes, publish each payload, and for
    /// each publisher confirmation send the same payload on
    /// `confirmation_send`. Must close `confirmation_send` when
    /// `payload_recv` closes, so that [crate::scheduler::Scheduler] observes
    /// EOF.
    async fn send_event_payload_stream(
        &self,
        payload_recv: mpsc::Receiver<EventPayload>,
        confirmation_send: mpsc::Sender<EventPayload>,
    ) -> Result<(), RouterError>;

    /// The broker's inbound delivery stream. The broker is trusted for its
    /// own at-least-once delivery; end-to-end exactly-once is composed from
    /// this plus the integrity guard.
    async fn message_receive_stream(&self) -> mpsc::Receiver<Self::Msg>;
}
