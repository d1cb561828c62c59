//! Typed change events.
//!
//! Stream records carry untyped row images. They are converted here, at the
//! edge, into [`ChangeEvent`] values holding [`ConfigRow`]s, so everything
//! past this point works with a well-formed `{key, value}` pair.

use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::stream::{INSERT, MODIFY, RowImage, StreamRecord};

/// Attribute holding the configuration key.
pub const KEY_ATTRIBUTE: &str = "key";
/// Attribute holding the configuration value.
pub const VALUE_ATTRIBUTE: &str = "value";

/// The observed shape of a configuration entry.
///
/// Values are 32-bit integers, the range the configuration table accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigRow {
    pub key: String,
    pub value: i32,
}

impl ConfigRow {
    pub fn new(key: impl Into<String>, value: i32) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// Decode the after-image of a change. Both `key` and `value` are required.
    pub fn from_new_image(image: Option<&RowImage>) -> Result<Self, AuditError> {
        let image = image.ok_or_else(|| AuditError::malformed("NewImage is missing"))?;
        let key = string_attribute(image, KEY_ATTRIBUTE, "NewImage")?;
        let value = integer_attribute(image, VALUE_ATTRIBUTE, "NewImage")?;
        Ok(Self::new(key, value))
    }

    /// Decode the before-image of a change.
    ///
    /// Only `value` is required. The key is the row's primary key and is the
    /// same in both images, so `fallback_key` is used when the image omits it.
    pub fn from_old_image(image: Option<&RowImage>, fallback_key: &str) -> Result<Self, AuditError> {
        let image = image.ok_or_else(|| AuditError::malformed("OldImage is missing"))?;
        let key = match image.get(KEY_ATTRIBUTE) {
            Some(_) => string_attribute(image, KEY_ATTRIBUTE, "OldImage")?,
            None => fallback_key.to_string(),
        };
        let value = integer_attribute(image, VALUE_ATTRIBUTE, "OldImage")?;
        Ok(Self::new(key, value))
    }
}

fn string_attribute(image: &RowImage, name: &str, which: &str) -> Result<String, AuditError> {
    let attr = image
        .get(name)
        .ok_or_else(|| AuditError::malformed(format!("{} is missing '{}'", which, name)))?;
    attr.as_s().map(str::to_string).ok_or_else(|| {
        AuditError::malformed(format!(
            "{} attribute '{}' must be a string, got {}",
            which,
            name,
            attr.type_tag()
        ))
    })
}

fn integer_attribute(image: &RowImage, name: &str, which: &str) -> Result<i32, AuditError> {
    let attr = image
        .get(name)
        .ok_or_else(|| AuditError::malformed(format!("{} is missing '{}'", which, name)))?;
    let text = attr.as_n().ok_or_else(|| {
        AuditError::malformed(format!(
            "{} attribute '{}' must be a number, got {}",
            which,
            name,
            attr.type_tag()
        ))
    })?;
    text.parse::<i32>().map_err(|_| {
        AuditError::malformed(format!(
            "{} attribute '{}' is not a 32-bit integer: {:?}",
            which, name, text
        ))
    })
}

/// A classified change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A row was inserted.
    Created { after: ConfigRow },
    /// A row was modified.
    Updated { before: ConfigRow, after: ConfigRow },
    /// Any other operation kind, deletes included. Never audited.
    Other { kind: String },
}

impl ChangeEvent {
    /// Classify a stream record and decode its row images.
    ///
    /// Unknown operation kinds decode successfully as [`ChangeEvent::Other`]
    /// without looking at the images.
    pub fn from_record(record: &StreamRecord) -> Result<Self, AuditError> {
        let images = &record.dynamodb;
        match record.event_name.as_str() {
            INSERT => Ok(Self::Created {
                after: ConfigRow::from_new_image(images.new_image.as_ref())?,
            }),
            MODIFY => {
                let after = ConfigRow::from_new_image(images.new_image.as_ref())?;
                let before = ConfigRow::from_old_image(images.old_image.as_ref(), &after.key)?;
                Ok(Self::Updated { before, after })
            }
            other => Ok(Self::Other {
                kind: other.to_string(),
            }),
        }
    }

    /// Operation name of this event.
    pub fn kind(&self) -> &str {
        match self {
            Self::Created { .. } => INSERT,
            Self::Updated { .. } => MODIFY,
            Self::Other { kind } => kind,
        }
    }
}
