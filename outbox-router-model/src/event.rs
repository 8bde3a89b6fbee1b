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

//! The immutable envelope that crosses the broker boundary.

use crate::error::RouterError;
use crate::error::RouterErrorKind;
use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use uuid::Uuid;

/// Key under which the subject is round-tripped inside [EventPayload::body],
/// so that a payload reconstructed from a bare JSON document still carries
/// its routing key.
pub const SUBJECT_KEY: &str = "_subject";

/// A domain event that can be turned into an [EventPayload].
///
/// Implementors are expected to be simple, serializable data: the router
/// does not call back into the event after publishing it.
pub trait DomainEvent: Serialize {
    /// Globally unique identifier of this event instance.
    fn event_id(&self) -> Uuid;

    /// UTC instant at which the event occurred.
    fn occurred_on(&self) -> DateTime<Utc>;
}

/// Convert a type name (as returned by [std::any::type_name]) into the
/// kebab-case subject used as the routing key.
///
/// Only the last path segment is used, so `my_crate::events::OrderShipped`
/// becomes `order-shipped`.
pub fn kebab_subject_for<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let last = full.rsplit("::").next().unwrap_or(full);
    kebab_from_pascal(last)
}

fn kebab_from_pascal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && c.is_uppercase() {
            out.push('-');
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Immutable event payload exchanged with the broker.
///
/// Two payloads with the same `id` must be byte-equal in `subject` and
/// `occurred_on`; `body` is the authoritative representation and round-trips
/// through JSON untouched.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct EventPayload {
    /// Globally unique identifier, stable across redelivery.
    pub id: Uuid,
    /// UTC instant at which the underlying domain event occurred.
    pub occurred_on: DateTime<Utc>,
    /// Kebab-case routing key, derived from the domain event's type name.
    pub subject: String,
    /// Arbitrary event fields, including a duplicated `_subject` entry for
    /// transport idempotency (see [SUBJECT_KEY]).
    pub body: Map<String, Value>,
}

impl EventPayload {
    /// Build a payload from a domain event.
    pub fn from_event<E: DomainEvent>(event: &E) -> Result<Self, RouterError> {
        let id = event.event_id();
        let occurred_on = event.occurred_on();
        let subject = kebab_subject_for::<E>();
        let mut body = match serde_json::to_value(event)
            .map_err(|e| RouterErrorKind::Store.error_with_source(Box::new(e)))?
        {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        body.insert("id".to_string(), Value::String(id.to_string()));
        body.insert(
            "occurred_on".to_string(),
            Value::String(occurred_on.to_rfc3339()),
        );
        body.insert(SUBJECT_KEY.to_string(), Value::String(subject.clone()));
        Ok(Self {
            id,
            occurred_on,
            subject,
            body,
        })
    }

    /// Reconstruct a payload from a previously encoded body, e.g. after
    /// receiving it from the broker.
    ///
    /// Requires `id`, `occurred_on` and [SUBJECT_KEY] to be present in the
    /// map; this is the inverse of [EventPayload::from_event] with respect to
    /// `{id, occurred_on, subject}`.
    pub fn from_event_body(body: Map<String, Value>) -> Result<Self, RouterError> {
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| RouterErrorKind::Store.error_with_msg("body missing a valid 'id'"))?;
        let occurred_on = body
            .get("occurred_on")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                RouterErrorKind::Store.error_with_msg("body missing a valid 'occurred_on'")
            })?;
        let subject = body
            .get(SUBJECT_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                RouterErrorKind::Store.error_with_msg(format!("body missing '{SUBJECT_KEY}'"))
            })?;
        Ok(Self {
            id,
            occurred_on,
            subject,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct OrderShipped {
        id: Uuid,
        occurred_on: DateTime<Utc>,
        order_id: String,
    }

    impl DomainEvent for OrderShipped {
        fn event_id(&self) -> Uuid {
            self.id
        }

        fn occurred_on(&self) -> DateTime<Utc> {
            self.occurred_on
        }
    }

    #[test]
    fn subject_is_kebab_case_of_type_name() {
        assert_eq!(kebab_subject_for::<OrderShipped>(), "order-shipped");
    }

    #[test]
    fn round_trip_preserves_id_occurred_on_and_subject() {
        let event = OrderShipped {
            id: Uuid::new_v4(),
            occurred_on: Utc::now(),
            order_id: "o-1".to_string(),
        };
        let payload = EventPayload::from_event(&event).unwrap();
        let json = serde_json::to_string(&payload.body).unwrap();
        let body: Map<String, Value> = serde_json::from_str(&json).unwrap();
        let round_tripped = EventPayload::from_event_body(body).unwrap();
        assert_eq!(round_tripped.id, payload.id);
        assert_eq!(round_tripped.occurred_on, payload.occurred_on);
        assert_eq!(round_tripped.subject, payload.subject);
    }

    #[test]
    fn from_event_body_rejects_missing_subject() {
        let mut body = Map::new();
        body.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        body.insert(
            "occurred_on".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        assert!(EventPayload::from_event_body(body).is_err());
    }
}
