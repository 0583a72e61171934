//! Outbox event types and the subscriber seam.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use tessera_types::{Record, UserSession};
use thiserror::Error;

/// Kind of record lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    RecordCreated,
    RecordUpdated,
    RecordDeleted,
    RecordRestored,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::RecordCreated => "record.created",
            EventType::RecordUpdated => "record.updated",
            EventType::RecordDeleted => "record.deleted",
            EventType::RecordRestored => "record.restored",
        }
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "record.created" => Ok(EventType::RecordCreated),
            "record.updated" => Ok(EventType::RecordUpdated),
            "record.deleted" => Ok(EventType::RecordDeleted),
            "record.restored" => Ok(EventType::RecordRestored),
            other => Err(format!("unknown event type '{other}'")),
        }
    }
}

/// Delivery state of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Processing,
    Processed,
    Failed,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processing => "processing",
            EventStatus::Processed => "processed",
            EventStatus::Failed => "failed",
        }
    }

    pub(crate) fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(EventStatus::Pending),
            "processing" => Some(EventStatus::Processing),
            "processed" => Some(EventStatus::Processed),
            "failed" => Some(EventStatus::Failed),
            _ => None,
        }
    }
}

/// Payload of every record event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEventPayload {
    pub object_api_name: String,
    pub record: Record,
    /// Previous state, for updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_record: Option<Record>,
    #[serde(default)]
    pub current_user: Option<UserSession>,
}

/// A claimed event, handed to a [`Subscriber`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    pub id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: EventStatus,
    /// Failed deliveries so far.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_date: DateTime<Utc>,
}

impl OutboxEvent {
    /// The event type, if it is one the engine emits.
    pub fn kind(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }

    /// Decodes the payload of a record event.
    pub fn record_payload(&self) -> Result<RecordEventPayload, serde_json::Error> {
        RecordEventPayload::deserialize(&self.payload)
    }
}

/// A failed delivery. The event is retried on a later poll.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receives committed events.
///
/// Delivery is at-least-once: an event whose delivery outcome was not
/// recorded, for example because the process died, is delivered again.
pub trait Subscriber: Send + Sync {
    fn deliver(&self, event: &OutboxEvent) -> Result<(), DeliveryError>;
}

impl<F> Subscriber for F
where
    F: Fn(&OutboxEvent) -> Result<(), DeliveryError> + Send + Sync,
{
    fn deliver(&self, event: &OutboxEvent) -> Result<(), DeliveryError> {
        self(event)
    }
}
