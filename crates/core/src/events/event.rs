use std::{collections::BTreeMap, convert::Infallible, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ANONYMOUS_USER: &str = "anonymous";

/// Primitive attribute value attached by a producer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl FromStr for AttributeValue {
    type Err = Infallible;

    /// Never fails: anything that is not a bool or a number is kept as text.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if let Ok(b) = raw.parse::<bool>() {
            return Ok(Self::Bool(b));
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Self::Integer(i));
        }
        if let Ok(f) = raw.parse::<f64>()
            && f.is_finite()
        {
            return Ok(Self::Float(f));
        }
        Ok(Self::Text(raw.to_string()))
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

/// NaN and the infinities have no JSON form; they become `Null`.
impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Self::Float(value)
        } else {
            Self::Null
        }
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Free-form producer attributes. `Attributes::new()` is the empty default;
/// every call gets its own map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One recorded observation. Built once by `record()` and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    name: String,
    #[serde(default)]
    attributes: Attributes,
    session_id: String,
    user_id: String,
    timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        name: impl Into<String>,
        attributes: Attributes,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            attributes,
            session_id: session_id.into(),
            user_id: user_id.into(),
            timestamp,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_values_are_parsed_from_cli_text() {
        assert_eq!("true".parse::<AttributeValue>(), Ok(AttributeValue::Bool(true)));
        assert_eq!("42".parse::<AttributeValue>(), Ok(AttributeValue::Integer(42)));
        assert_eq!("0.5".parse::<AttributeValue>(), Ok(AttributeValue::Float(0.5)));
        assert_eq!(
            "campaign-42".parse::<AttributeValue>(),
            Ok(AttributeValue::Text("campaign-42".to_string()))
        );
        assert_eq!(
            "NaN".parse::<AttributeValue>(),
            Ok(AttributeValue::Text("NaN".to_string()))
        );
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(AttributeValue::from(f64::NAN), AttributeValue::Null);
        assert_eq!(AttributeValue::from(f64::INFINITY), AttributeValue::Null);
        assert_eq!(AttributeValue::from(-0.25), AttributeValue::Float(-0.25));

        let event = Event::new(
            "chart_render",
            Attributes::new().with("ratio", f64::NAN),
            "session-1",
            ANONYMOUS_USER,
            Utc::now(),
        );
        let raw = serde_json::to_string(&[event]).unwrap();
        let back: Vec<Event> = serde_json::from_str(&raw).unwrap();
        assert_eq!(back[0].attributes().get("ratio"), Some(&AttributeValue::Null));
    }

    #[test]
    fn event_serializes_with_wire_field_names() {
        let ts = DateTime::parse_from_rfc3339("2026-10-19T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let event = Event::new(
            "button_click",
            Attributes::new().with("button", "send").with("count", 2),
            "session-1",
            ANONYMOUS_USER,
            ts,
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], "button_click");
        assert_eq!(json["sessionId"], "session-1");
        assert_eq!(json["userId"], "anonymous");
        assert_eq!(json["attributes"]["button"], "send");
        assert_eq!(json["attributes"]["count"], 2);
        assert!(json["timestamp"].as_str().unwrap().starts_with("2026-10-19T08:30:00"));

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn empty_attributes_are_not_shared_between_events() {
        let mut first = Attributes::new();
        first.insert("page", "/campaigns");
        let second = Attributes::default();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}
