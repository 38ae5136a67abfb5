//! Scanned-code payloads: generation, parsing, and resolution into a
//! navigation intent.
//!
//! A printed code carries either a bare location id or a JSON snapshot of
//! the location taken when the code was generated. Codes opened through a
//! link arrive percent-encoded inside a `/location/<payload>` route.

use std::borrow::Cow;

use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::gateway::{Gateway, GatewayError};
use crate::records::{Location, LocationId, LocationTrigger, ProjectId};

const ROUTE_PREFIX: &str = "/location/";

/// Location details captured when a code was generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSnapshot {
    pub id: LocationId,
    pub project_id: ProjectId,
    pub name: Option<String>,
    pub position: Option<String>,
    pub trigger: Option<LocationTrigger>,
    pub points: Option<u32>,
    pub clue: Option<String>,
}

impl LocationSnapshot {
    #[must_use]
    pub fn from_location(location: &Location) -> Self {
        Self {
            id: location.id,
            project_id: location.project_id,
            name: Some(location.location_name.clone()),
            position: Some(location.position.as_str().to_owned()),
            trigger: Some(location.location_trigger),
            points: Some(location.score_points),
            clue: Some(location.clue.clone()),
        }
    }

    fn from_object(object: &Map<String, Value>) -> Result<Self, PayloadError> {
        let text = |field: &str| object.get(field).and_then(Value::as_str).map(str::to_owned);
        Ok(Self {
            id: LocationId(required_id(object, "id")?),
            project_id: ProjectId(required_id(object, "project_id")?),
            name: text("name"),
            position: text("position"),
            trigger: object
                .get("trigger")
                .and_then(Value::as_str)
                .map(LocationTrigger::from_label),
            points: object.get("points").and_then(loose_u32),
            clue: text("clue"),
        })
    }

    /// JSON object a printed code carries.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".into(), Value::from(self.id.get()));
        if let Some(name) = &self.name {
            object.insert("name".into(), Value::from(name.as_str()));
        }
        if let Some(position) = &self.position {
            object.insert("position".into(), Value::from(position.as_str()));
        }
        if let Some(trigger) = self.trigger {
            object.insert("trigger".into(), Value::from(trigger.label()));
        }
        if let Some(points) = self.points {
            object.insert("points".into(), Value::from(points));
        }
        if let Some(clue) = &self.clue {
            object.insert("clue".into(), Value::from(clue.as_str()));
        }
        object.insert("project_id".into(), Value::from(self.project_id.get()));
        Value::Object(object)
    }
}

fn required_id(object: &Map<String, Value>, field: &'static str) -> Result<u64, PayloadError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(PayloadError::MissingField(field)),
        Some(value) => loose_u64(value).ok_or(PayloadError::InvalidField(field)),
    }
}

fn loose_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn loose_u32(value: &Value) -> Option<u32> {
    loose_u64(value).and_then(|points| u32::try_from(points).ok())
}

/// Why a payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("code payload is empty")]
    Empty,
    #[error("code payload is not valid percent-encoding")]
    Encoding,
    #[error("code payload is neither a location id nor a location record")]
    Undecodable,
    #[error("code payload is missing `{0}`")]
    MissingField(&'static str),
    #[error("code payload has an invalid `{0}`")]
    InvalidField(&'static str),
}

/// A decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodePayload {
    Structured(LocationSnapshot),
    BareId(LocationId),
}

impl CodePayload {
    /// Decode raw scanned content.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] for anything other than a location id or a
    /// JSON object carrying `id` and `project_id`.
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let text = route_payload(raw.trim());
        let decoded = if text.contains('%') {
            urlencoding::decode(text).map_err(|_| PayloadError::Encoding)?
        } else {
            Cow::Borrowed(text)
        };
        let decoded = decoded.trim();
        if decoded.is_empty() {
            return Err(PayloadError::Empty);
        }
        if let Ok(id) = decoded.parse::<u64>() {
            return Ok(Self::BareId(LocationId(id)));
        }

        let value: Value = serde_json::from_str(decoded).map_err(|_| PayloadError::Undecodable)?;
        match value {
            Value::Object(object) => LocationSnapshot::from_object(&object).map(Self::Structured),
            Value::String(token) => token
                .trim()
                .parse()
                .map(|id| Self::BareId(LocationId(id)))
                .map_err(|_| PayloadError::Undecodable),
            Value::Number(_) => Err(PayloadError::InvalidField("id")),
            _ => Err(PayloadError::Undecodable),
        }
    }

    #[must_use]
    pub const fn location_id(&self) -> LocationId {
        match self {
            Self::Structured(snapshot) => snapshot.id,
            Self::BareId(id) => *id,
        }
    }
}

/// The payload segment of a `/location/<payload>` route, a bare
/// `location/<payload>` path, or an absolute `http(s)://host/location/<payload>`
/// link. Anything else is returned unchanged.
fn route_payload(text: &str) -> &str {
    if let Some(rest) = text
        .strip_prefix(ROUTE_PREFIX)
        .or_else(|| text.strip_prefix(&ROUTE_PREFIX[1..]))
    {
        return rest;
    }
    let Some(after_scheme) = text
        .strip_prefix("https://")
        .or_else(|| text.strip_prefix("http://"))
    else {
        return text;
    };
    let path = after_scheme.find('/').map_or("", |at| &after_scheme[at..]);
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.find(ROUTE_PREFIX)
        .map_or(text, |at| path[at + ROUTE_PREFIX.len()..].trim_end_matches('/'))
}

/// Structured payload a printed code should carry for `location`.
#[must_use]
pub fn encode_payload(location: &Location) -> String {
    LocationSnapshot::from_location(location)
        .to_value()
        .to_string()
}

/// Link route that opens `location` from a scanned code.
#[must_use]
pub fn redirect_path(location: &Location) -> String {
    format!("{ROUTE_PREFIX}{}", urlencoding::encode(&encode_payload(location)))
}

/// Where the host should go after a successful scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationIntent {
    pub project_id: ProjectId,
    pub initial_location: Location,
    pub originated_from_code: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("malformed code payload: {0}")]
    MalformedPayload(#[from] PayloadError),
    #[error("location {id} could not be found")]
    NotFound {
        id: LocationId,
        #[source]
        source: GatewayError,
    },
}

/// Turn scanned content into a navigation intent. No session is touched.
///
/// # Errors
///
/// [`ResolveError::MalformedPayload`] when the payload cannot be decoded;
/// [`ResolveError::NotFound`] when the gateway has no such location or fails.
pub async fn resolve_code(
    gateway: &dyn Gateway,
    raw: &str,
) -> Result<NavigationIntent, ResolveError> {
    let payload = CodePayload::parse(raw).inspect_err(|err| warn!("rejected code payload: {err}"))?;
    let id = payload.location_id();
    debug!("resolving scanned location {id}");

    let location = gateway
        .get_location(id)
        .await
        .map_err(|source| ResolveError::NotFound { id, source })?;

    if let CodePayload::Structured(snapshot) = &payload
        && snapshot.project_id != location.project_id
    {
        warn!(
            "code for location {id} names project {} but the location belongs to {}",
            snapshot.project_id, location.project_id
        );
    }

    Ok(NavigationIntent {
        project_id: location.project_id,
        initial_location: location,
        originated_from_code: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Position;

    fn fountain() -> Location {
        let mut location = Location::new(LocationId(42), ProjectId(7), "Fountain", 5)
            .with_trigger(LocationTrigger::Both)
            .with_clue("Listen for water");
        location.position = Position::new("-27.49,153.01");
        location
    }

    #[test]
    fn bare_ids_in_every_shape() {
        for raw in [
            "42",
            " 42 ",
            "\"42\"",
            "/location/42",
            "location/42",
            "https://storypath.example/location/42",
            "http://localhost:5173/location/42/",
            "https://storypath.example/app/location/42?utm=qr",
        ] {
            assert_eq!(
                CodePayload::parse(raw),
                Ok(CodePayload::BareId(LocationId(42))),
                "payload {raw:?}"
            );
        }
    }

    #[test]
    fn structured_payload_with_string_ids() {
        let payload =
            CodePayload::parse(r#"{"id": 42, "name": "Fountain", "project_id": "7", "points": "5"}"#)
                .unwrap();
        let CodePayload::Structured(snapshot) = payload else {
            panic!("expected structured payload");
        };
        assert_eq!(snapshot.id, LocationId(42));
        assert_eq!(snapshot.project_id, ProjectId(7));
        assert_eq!(snapshot.name.as_deref(), Some("Fountain"));
        assert_eq!(snapshot.points, Some(5));
        assert_eq!(snapshot.trigger, None);
    }

    #[test]
    fn malformed_payloads_are_classified() {
        assert_eq!(CodePayload::parse("   "), Err(PayloadError::Empty));
        assert_eq!(CodePayload::parse("not-json"), Err(PayloadError::Undecodable));
        assert_eq!(CodePayload::parse("[1, 2]"), Err(PayloadError::Undecodable));
        assert_eq!(
            CodePayload::parse("https://storypath.example/projects/42"),
            Err(PayloadError::Undecodable)
        );
        assert_eq!(CodePayload::parse("-3"), Err(PayloadError::InvalidField("id")));
        assert_eq!(CodePayload::parse("%E0%A4%A"), Err(PayloadError::Encoding));
        assert_eq!(
            CodePayload::parse(r#"{"project_id": 7}"#),
            Err(PayloadError::MissingField("id"))
        );
        assert_eq!(
            CodePayload::parse(r#"{"id": 42}"#),
            Err(PayloadError::MissingField("project_id"))
        );
        assert_eq!(
            CodePayload::parse(r#"{"id": "forty", "project_id": 7}"#),
            Err(PayloadError::InvalidField("id"))
        );
    }

    #[test]
    fn generated_payload_decodes_to_its_snapshot() {
        let location = fountain();
        let payload = encode_payload(&location);
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["id"], 42);
        assert_eq!(value["project_id"], 7);
        assert_eq!(value["trigger"], "Both");
        assert_eq!(value["position"], "-27.49,153.01");
        assert_eq!(
            CodePayload::parse(&payload),
            Ok(CodePayload::Structured(LocationSnapshot::from_location(
                &location
            )))
        );
    }

    #[test]
    fn redirect_route_is_percent_encoded() {
        let location = fountain();
        let path = redirect_path(&location);
        assert!(path.starts_with("/location/%7B%22"));
        assert!(!path[ROUTE_PREFIX.len()..].contains('{'));
        assert_eq!(CodePayload::parse(&path).unwrap().location_id(), LocationId(42));
    }
}
