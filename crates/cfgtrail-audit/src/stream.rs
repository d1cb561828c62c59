//! Wire types for change stream batches.
//!
//! A batch arrives as a stream trigger payload: an object with a `Records`
//! array, each record naming its operation (`eventName`) and carrying the row
//! images under `dynamodb`. Attribute values are single-key objects tagging
//! their type, e.g. `{"S": "maxItems"}` or `{"N": "10"}`.
//!
//! Only the envelope is strict. A record that does not fit the expected
//! shape is kept as raw JSON and reported as malformed when it is routed, so
//! it cannot take its neighbours down with it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::AuditError;

/// Operation name of an inserted row.
pub const INSERT: &str = "INSERT";
/// Operation name of a modified row.
pub const MODIFY: &str = "MODIFY";

/// A row image: attribute name to typed value.
pub type RowImage = BTreeMap<String, AttributeValue>;

/// A typed attribute value as it appears in a row image.
///
/// Values with an unknown tag, or whose payload does not match their tag
/// (e.g. `{"N": 10}`), are kept as [`AttributeValue::Opaque`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttributeValue {
    /// String.
    S(String),
    /// Number, transported as its decimal text.
    N(String),
    /// Binary, base64 encoded.
    B(String),
    /// Boolean.
    Bool(bool),
    /// Null marker.
    Null(bool),
    /// String set.
    Ss(Vec<String>),
    /// Number set.
    Ns(Vec<String>),
    /// Binary set.
    Bs(Vec<String>),
    /// List.
    L(Vec<AttributeValue>),
    /// Map.
    M(BTreeMap<String, AttributeValue>),
    /// Anything else, as received.
    #[serde(untagged)]
    Opaque(Value),
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_json(Value::deserialize(deserializer)?))
    }
}

fn string_list(items: &[Value]) -> Option<Vec<String>> {
    items.iter().map(|v| v.as_str().map(str::to_string)).collect()
}

impl AttributeValue {
    /// Interpret a raw `{"TAG": payload}` object. Never fails.
    pub fn from_json(raw: Value) -> Self {
        let Value::Object(map) = &raw else {
            return Self::Opaque(raw);
        };
        let mut entries = map.iter();
        let (Some((tag, payload)), None) = (entries.next(), entries.next()) else {
            return Self::Opaque(raw);
        };

        let typed = match (tag.as_str(), payload) {
            ("S", Value::String(s)) => Some(Self::S(s.clone())),
            ("N", Value::String(n)) => Some(Self::N(n.clone())),
            ("B", Value::String(b)) => Some(Self::B(b.clone())),
            ("BOOL", Value::Bool(b)) => Some(Self::Bool(*b)),
            ("NULL", Value::Bool(b)) => Some(Self::Null(*b)),
            ("SS", Value::Array(items)) => string_list(items).map(Self::Ss),
            ("NS", Value::Array(items)) => string_list(items).map(Self::Ns),
            ("BS", Value::Array(items)) => string_list(items).map(Self::Bs),
            ("L", Value::Array(items)) => Some(Self::L(
                items.iter().cloned().map(Self::from_json).collect(),
            )),
            ("M", Value::Object(fields)) => Some(Self::M(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v.clone())))
                    .collect(),
            )),
            _ => None,
        };
        typed.unwrap_or(Self::Opaque(raw))
    }

    /// Short type tag, used in diagnostics.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Bool(_) => "BOOL",
            Self::Null(_) => "NULL",
            Self::Ss(_) => "SS",
            Self::Ns(_) => "NS",
            Self::Bs(_) => "BS",
            Self::L(_) => "L",
            Self::M(_) => "M",
            Self::Opaque(_) => "opaque",
        }
    }

    /// The string payload, if this is a string attribute.
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// The number text, if this is a number attribute.
    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }
}

/// Row images attached to a stream record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamImages {
    /// Row state before the change.
    #[serde(rename = "OldImage", default, skip_serializing_if = "Option::is_none")]
    pub old_image: Option<RowImage>,

    /// Row state after the change.
    #[serde(rename = "NewImage", default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<RowImage>,
}

/// One change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    /// Transport-assigned record id, used for diagnostics only.
    #[serde(rename = "eventID", default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// Operation name (`INSERT`, `MODIFY`, `REMOVE`, ...).
    #[serde(rename = "eventName")]
    pub event_name: String,

    /// Row images.
    #[serde(default)]
    pub dynamodb: StreamImages,
}

impl StreamRecord {
    /// A record for an inserted row.
    pub fn insert(new_image: RowImage) -> Self {
        Self {
            event_id: None,
            event_name: INSERT.to_string(),
            dynamodb: StreamImages {
                old_image: None,
                new_image: Some(new_image),
            },
        }
    }

    /// A record for a modified row.
    pub fn modify(old_image: RowImage, new_image: RowImage) -> Self {
        Self {
            event_id: None,
            event_name: MODIFY.to_string(),
            dynamodb: StreamImages {
                old_image: Some(old_image),
                new_image: Some(new_image),
            },
        }
    }

    /// A record with an arbitrary operation name and no images.
    pub fn named(event_name: impl Into<String>) -> Self {
        Self {
            event_id: None,
            event_name: event_name.into(),
            dynamodb: StreamImages::default(),
        }
    }

    /// Set the transport record id.
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

/// One entry of a batch: a readable record, or the raw JSON of one that
/// does not fit the record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Record(StreamRecord),
    Unreadable(Value),
}

impl BatchEntry {
    /// The decoded record, or a malformed event error for an unreadable entry.
    pub fn record(&self) -> Result<&StreamRecord, AuditError> {
        match self {
            Self::Record(record) => Ok(record),
            Self::Unreadable(raw) => {
                let reason = match serde_json::from_value::<StreamRecord>(raw.clone()) {
                    Err(e) => e.to_string(),
                    Ok(_) => "record does not match the stream record shape".to_string(),
                };
                Err(AuditError::malformed(format!("unreadable stream record: {}", reason)))
            }
        }
    }

    /// Transport record id, when one can be found.
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Record(record) => record.event_id.as_deref(),
            Self::Unreadable(raw) => raw.get("eventID").and_then(Value::as_str),
        }
    }
}

impl From<StreamRecord> for BatchEntry {
    fn from(record: StreamRecord) -> Self {
        Self::Record(record)
    }
}

/// A batch of change notifications delivered to one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<BatchEntry>,
}

impl StreamBatch {
    /// Create a batch from records, preserving their order.
    pub fn new(records: Vec<StreamRecord>) -> Self {
        Self {
            records: records.into_iter().map(BatchEntry::from).collect(),
        }
    }

    /// Parse a batch from its JSON payload.
    ///
    /// Fails only when the envelope itself is not a batch.
    pub fn from_json(payload: &str) -> Result<Self, AuditError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch carries no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Build a `{key, value}` row image, the shape of a configuration entry.
pub fn config_image(key: &str, value: &str) -> RowImage {
    let mut image = RowImage::new();
    image.insert("key".to_string(), AttributeValue::S(key.to_string()));
    image.insert("value".to_string(), AttributeValue::N(value.to_string()));
    image
}
