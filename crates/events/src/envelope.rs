use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use serde_json::value::RawValue;

use warden_auth::Claims;
use warden_core::{EventId, RequestId, SessionId, TenantId};

use crate::EventType;

/// Free-form event payload.
pub type Payload = serde_json::Map<String, JsonValue>;

/// Payload fields kept as the exact JSON text they were captured as.
pub type RawFields = BTreeMap<String, RawJson>;

/// Validated JSON text, serialized verbatim.
#[derive(Debug, Clone)]
pub struct RawJson(Box<RawValue>);

impl RawJson {
    /// `None` when `bytes` is not a single valid JSON document.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        RawValue::from_string(text.to_string()).ok().map(Self)
    }

    pub fn get(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for RawJson {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

/// Structured and raw fields, written out as one JSON object. A raw field
/// shadows a structured field of the same name.
#[derive(Debug, Clone, Default, PartialEq)]
struct EventPayload {
    fields: Payload,
    raw: RawFields,
}

impl Serialize for EventPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let structured = self
            .fields
            .iter()
            .filter(|(k, _)| !self.raw.contains_key(k.as_str()));
        let mut map = serializer.serialize_map(None)?;
        for (k, v) in structured {
            map.serialize_entry(k, v)?;
        }
        for (k, v) in &self.raw {
            map.serialize_entry(k, &v.0)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EventPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Payload::deserialize(deserializer).map(|fields| Self {
            fields,
            raw: RawFields::new(),
        })
    }
}

/// Envelope for a security, audit or usage event.
///
/// Wire shape:
/// `{id, request_id, session_id, tenant_id, event_type, event_source, timestamp, message?, payload}`.
///
/// - `tenant_id` is `null` when the tenant could not be resolved, which keeps
///   "unknown tenant" distinct from a tenant whose UUID happens to be nil.
/// - `timestamp` is RFC3339 UTC.
/// - Immutable once built; handed to a producer and forgotten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    request_id: RequestId,
    session_id: SessionId,
    tenant_id: Option<TenantId>,
    event_type: EventType,
    event_source: String,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    payload: EventPayload,
}

impl Event {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: EventId,
        request_id: RequestId,
        session_id: SessionId,
        tenant_id: Option<TenantId>,
        event_type: EventType,
        event_source: impl Into<String>,
        timestamp: DateTime<Utc>,
        message: Option<String>,
        payload: Payload,
    ) -> Self {
        Self {
            id,
            request_id,
            session_id,
            tenant_id,
            event_type,
            event_source: event_source.into(),
            timestamp,
            message,
            payload: EventPayload {
                fields: payload,
                raw: RawFields::new(),
            },
        }
    }

    /// Attach fields whose JSON text must reach consumers unchanged.
    pub fn with_raw_fields(mut self, raw: RawFields) -> Self {
        self.payload.raw.extend(raw);
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn event_source(&self) -> &str {
        &self.event_source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Structured payload fields. Raw fields are not included; see [`Event::raw_field`].
    pub fn payload(&self) -> &Payload {
        &self.payload.fields
    }

    /// Exact JSON text of a raw payload field.
    pub fn raw_field(&self, key: &str) -> Option<&str> {
        self.payload.raw.get(key).map(RawJson::get)
    }
}

/// Where a request came from; supplies the fixed payload fields of every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    pub path: String,
    pub user_agent: String,
    pub remote_addr: String,
}

/// Stage-side description of an event, before the emitter stamps IDs,
/// tenant, source and time onto it.
#[derive(Debug, Clone)]
pub struct EventDraft<'a> {
    pub(crate) event_type: EventType,
    pub(crate) claims: Option<&'a Claims>,
    pub(crate) origin: RequestOrigin,
    pub(crate) message: Option<String>,
    pub(crate) fields: Payload,
    pub(crate) raw: RawFields,
}

impl<'a> EventDraft<'a> {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            claims: None,
            origin: RequestOrigin::default(),
            message: None,
            fields: Payload::new(),
            raw: RawFields::new(),
        }
    }

    pub fn claims(mut self, claims: Option<&'a Claims>) -> Self {
        self.claims = claims;
        self
    }

    pub fn origin(mut self, origin: RequestOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    /// Stage-specific payload field. Overrides a fixed field of the same name.
    pub fn field(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.raw.remove(key);
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Payload field written byte-for-byte as captured (key order, number
    /// formatting). Replaces any earlier field of the same name.
    pub fn raw_field(mut self, key: &str, value: RawJson) -> Self {
        self.fields.remove(key);
        self.raw.insert(key.to_string(), value);
        self
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(tenant_id: Option<TenantId>, message: Option<String>) -> Event {
        let mut payload = Payload::new();
        payload.insert("subject".to_string(), "user@example.com".into());

        Event::new(
            EventId::new(),
            RequestId::new(),
            SessionId::new(),
            tenant_id,
            EventType::AuditLog,
            "platform.security.orders.v2",
            Utc::now(),
            message,
            payload,
        )
    }

    #[test]
    fn wire_shape_has_expected_keys() {
        let json = serde_json::to_value(event(Some(TenantId::new()), Some("hi".into()))).unwrap();
        let obj = json.as_object().unwrap();

        for key in [
            "id",
            "request_id",
            "session_id",
            "tenant_id",
            "event_type",
            "event_source",
            "timestamp",
            "message",
            "payload",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(obj["event_type"], "audit.log");
        assert_eq!(obj["payload"]["subject"], "user@example.com");
    }

    #[test]
    fn timestamp_is_rfc3339_utc() {
        let json = serde_json::to_value(event(None, None)).unwrap();
        let raw = json["timestamp"].as_str().unwrap();

        let parsed = DateTime::parse_from_rfc3339(raw).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
    }

    #[test]
    fn unresolved_tenant_is_null_and_message_is_omitted() {
        let json = serde_json::to_value(event(None, None)).unwrap();

        assert!(json["tenant_id"].is_null());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn raw_fields_are_written_verbatim() {
        let text = r#"{"zeta":1,"alpha":2,"big":123456789012345678901234,"f":1.50}"#;
        let mut raw = RawFields::new();
        raw.insert("payload".to_string(), RawJson::from_slice(text.as_bytes()).unwrap());

        let event = event(None, None).with_raw_fields(raw);
        let wire = serde_json::to_string(&event).unwrap();

        assert!(wire.contains(&format!(r#""payload":{text}"#)), "{wire}");
        assert!(wire.contains(r#""subject":"user@example.com""#));
        assert_eq!(event.raw_field("payload"), Some(text));
    }

    #[test]
    fn raw_json_rejects_invalid_documents() {
        assert!(RawJson::from_slice(br#"{"a":1"#).is_none());
        assert!(RawJson::from_slice(&[0xff, 0xfe]).is_none());
        assert_eq!(RawJson::from_slice(b" [1, 2] ").unwrap().get(), "[1, 2]");
    }

    #[test]
    fn nil_tenant_is_not_null() {
        let nil = TenantId::from_uuid(uuid::Uuid::nil());
        let json = serde_json::to_value(event(Some(nil), None)).unwrap();

        assert_eq!(json["tenant_id"], "00000000-0000-0000-0000-000000000000");
    }
}
