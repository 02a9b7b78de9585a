//! Trigger event parsing
//!
//! Intake accepts two trigger shapes: the event-bus object-created
//! notification, and a direct `{ "bucket": ..., "key": ... }` invocation
//! used by operators and tests. Notification keys arrive URL-encoded with
//! `+` standing for spaces; direct keys are taken verbatim.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectRef {
    pub key: String,

    #[serde(default)]
    pub etag: Option<String>,

    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationDetail {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

/// Raw trigger event, either shape
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TriggerEvent {
    Notification { detail: NotificationDetail },
    Direct { bucket: String, key: String },
}

impl TriggerEvent {
    /// Normalize to a [`Trigger`]
    #[must_use]
    pub fn into_trigger(self) -> Trigger {
        match self {
            TriggerEvent::Notification { detail } => Trigger {
                bucket: detail.bucket.name,
                key: decode_object_key(&detail.object.key),
                etag: detail.object.etag,
                size: detail.object.size,
            },
            TriggerEvent::Direct { bucket, key } => Trigger {
                bucket,
                key,
                etag: None,
                size: None,
            },
        }
    }
}

/// Normalized admission trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub bucket: String,
    pub key: String,

    /// Content tag carried by the notification, if any
    pub etag: Option<String>,

    /// Object size carried by the notification, if any
    pub size: Option<u64>,
}

fn decode_object_key(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    match urlencoding::decode(&plus_decoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plus_decoded,
    }
}
