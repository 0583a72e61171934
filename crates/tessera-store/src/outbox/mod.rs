//! Transactional outbox.
//!
//! Mutations write their event row with [`Outbox::enqueue`] on the same
//! transaction as the data change, so an event exists if and only if the
//! change committed. [`Outbox::process_batch`] (usually driven by an
//! [`OutboxWorker`]) delivers pending rows afterwards:
//!
//! ```text
//!  pending ──claim──► processing ──ok──► processed
//!     ▲                   │
//!     └──── retry ◄───────┤ error, attempts < max
//!                         └──────────► failed
//! ```
//!
//! Rows stuck in `processing` longer than the claim lease (a worker died
//! mid-delivery) are reclaimed.

mod event;
mod worker;

pub use event::{
    DeliveryError, EventStatus, EventType, OutboxEvent, RecordEventPayload, Subscriber,
};
pub use worker::OutboxWorker;

use crate::codec::{format_timestamp, parse_timestamp};
use crate::db::Database;
use crate::error::{RecordError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tessera_types::{RequestContext, tables};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Delivery settings.
#[derive(Debug, Clone)]
pub struct OutboxOptions {
    /// Events claimed per batch.
    pub batch_size: usize,
    /// Failed deliveries before an event is parked as `failed`.
    pub max_attempts: u32,
    /// How long a claim holds before another worker may take the event.
    pub claim_lease: Duration,
}

impl Default for OutboxOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_attempts: 5,
            claim_lease: Duration::from_secs(300),
        }
    }
}

/// Outcome of one [`Outbox::process_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub claimed: usize,
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Delivers committed events to a subscriber.
pub struct Outbox {
    db: Arc<Database>,
    options: OutboxOptions,
}

impl Outbox {
    pub fn new(db: Arc<Database>, options: OutboxOptions) -> Self {
        Self { db, options }
    }

    pub fn options(&self) -> &OutboxOptions {
        &self.options
    }

    /// Writes a pending event through `conn`, which should be the
    /// mutation's open transaction.
    pub fn enqueue(conn: &Connection, event_type: EventType, payload: &impl Serialize) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(payload)?;
        conn.execute(
            &format!(
                "INSERT INTO {} (id, event_type, payload, status, attempts, created_date) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                tables::OUTBOX
            ),
            params![
                id,
                event_type.as_str(),
                payload,
                EventStatus::Pending.as_str(),
                format_timestamp(&Utc::now())
            ],
        )?;
        debug!(event_id = %id, event_type = %event_type, "Event enqueued");
        Ok(id)
    }

    /// Claims and delivers up to `batch_size` events in enqueue order.
    pub fn process_batch(&self, subscriber: &dyn Subscriber) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let ctx = RequestContext::anonymous();
        let cutoff = format_timestamp(&self.lease_cutoff());

        let candidates: Vec<String> = self.db.read(&ctx, |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id FROM {} \
                 WHERE status = 'pending' OR (status = 'processing' AND claimed_date < ?1) \
                 ORDER BY created_date, rowid LIMIT ?2",
                tables::OUTBOX
            ))?;
            let ids = stmt
                .query_map(params![cutoff, self.options.batch_size as i64], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(ids)
        })?;

        for id in candidates {
            let Some(event) = self.claim(&ctx, &id, &cutoff)? else {
                continue;
            };
            report.claimed += 1;

            match subscriber.deliver(&event) {
                Ok(()) => {
                    self.finish(&ctx, &event.id, EventStatus::Processed, event.attempts, None)?;
                    report.delivered += 1;
                }
                Err(e) => {
                    let attempts = event.attempts + 1;
                    if attempts >= self.options.max_attempts {
                        warn!(event_id = %event.id, attempts, error = %e, "Event delivery failed permanently");
                        self.finish(&ctx, &event.id, EventStatus::Failed, attempts, Some(&e.0))?;
                        report.failed += 1;
                    } else {
                        debug!(event_id = %event.id, attempts, error = %e, "Event delivery failed, will retry");
                        self.finish(&ctx, &event.id, EventStatus::Pending, attempts, Some(&e.0))?;
                        report.retried += 1;
                    }
                }
            }
        }

        if report.claimed > 0 {
            debug!(?report, "Outbox batch processed");
        }
        Ok(report)
    }

    fn lease_cutoff(&self) -> DateTime<Utc> {
        let lease = chrono::Duration::from_std(self.options.claim_lease).unwrap_or(chrono::Duration::MAX);
        Utc::now().checked_sub_signed(lease).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Moves one event to `processing` in its own short transaction.
    ///
    /// Returns `None` if another worker got there first or the payload is
    /// unreadable; the latter is parked as `failed`.
    fn claim(&self, ctx: &RequestContext, id: &str, cutoff: &str) -> Result<Option<OutboxEvent>> {
        let claimed = self.db.transaction(ctx, |tx| {
            let row = tx
                .query_row(
                    &format!(
                        "UPDATE {} SET status = 'processing', claimed_date = ?3 \
                         WHERE id = ?1 AND (status = 'pending' OR (status = 'processing' AND claimed_date < ?2)) \
                         RETURNING id, event_type, payload, attempts, last_error, created_date",
                        tables::OUTBOX
                    ),
                    params![id, cutoff, format_timestamp(&Utc::now())],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, u32>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, String>(5)?,
                        ))
                    },
                )
                .optional()?;
            Ok(row)
        })?;

        let Some((id, event_type, payload, attempts, last_error, created)) = claimed else {
            return Ok(None);
        };

        match serde_json::from_str(&payload) {
            Ok(payload) => Ok(Some(OutboxEvent {
                id,
                event_type,
                payload,
                status: EventStatus::Processing,
                attempts,
                last_error,
                created_date: parse_timestamp(&created).unwrap_or_default(),
            })),
            Err(e) => {
                warn!(event_id = %id, error = %e, "Undecodable event payload");
                self.finish(ctx, &id, EventStatus::Failed, attempts, Some(&format!("undecodable payload: {e}")))?;
                Ok(None)
            }
        }
    }

    fn finish(
        &self,
        ctx: &RequestContext,
        id: &str,
        status: EventStatus,
        attempts: u32,
        error: Option<&str>,
    ) -> Result<()> {
        let processed = (status == EventStatus::Processed).then(|| format_timestamp(&Utc::now()));
        self.db.transaction(ctx, |tx| {
            tx.execute(
                &format!(
                    "UPDATE {} SET status = ?2, attempts = ?3, last_error = COALESCE(?4, last_error), \
                     processed_date = ?5, claimed_date = NULL WHERE id = ?1",
                    tables::OUTBOX
                ),
                params![id, status.as_str(), attempts, error, processed],
            )?;
            Ok(())
        })
    }

    /// Deletes processed events older than `older_than`.
    pub fn cleanup_processed(&self, older_than: Duration) -> Result<usize> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| RecordError::internal(format!("retention out of range: {e}")))?;
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let removed = self.db.transaction(&RequestContext::anonymous(), |tx| {
            Ok(tx.execute(
                &format!(
                    "DELETE FROM {} WHERE status = 'processed' AND processed_date <= ?1",
                    tables::OUTBOX
                ),
                params![format_timestamp(&cutoff)],
            )?)
        })?;
        if removed > 0 {
            info!(removed, "Processed outbox events cleaned up");
        }
        Ok(removed)
    }

    /// Events not yet delivered or parked.
    pub fn pending_count(&self) -> Result<u64> {
        self.db.read(&RequestContext::anonymous(), |conn| {
            let count: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE status IN ('pending', 'processing')",
                    tables::OUTBOX
                ),
                [],
                |row| row.get(0),
            )?;
            Ok(count.unsigned_abs())
        })
    }

    /// Looks up one event by id.
    pub fn get(&self, id: &str) -> Result<Option<OutboxEvent>> {
        self.db.read(&RequestContext::anonymous(), |conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT id, event_type, payload, status, attempts, last_error, created_date \
                         FROM {} WHERE id = ?1",
                        tables::OUTBOX
                    ),
                    params![id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, u32>(4)?,
                            row.get::<_, Option<String>>(5)?,
                            row.get::<_, String>(6)?,
                        ))
                    },
                )
                .optional()?;
            let Some((id, event_type, payload, status, attempts, last_error, created)) = row else {
                return Ok(None);
            };
            let payload = stored_payload(&id, payload);
            Ok(Some(OutboxEvent {
                id,
                event_type,
                payload,
                status: EventStatus::parse(&status)
                    .ok_or_else(|| RecordError::internal(format!("unknown outbox status '{status}'")))?,
                attempts,
                last_error,
                created_date: parse_timestamp(&created).unwrap_or_default(),
            }))
        })
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Decoded payload, or the raw text when the row is corrupt.
fn stored_payload(id: &str, raw: String) -> serde_json::Value {
    match serde_json::from_str(&raw) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(event_id = %id, error = %e, "Outbox payload is not valid JSON");
            serde_json::Value::String(raw)
        }
    }
}
