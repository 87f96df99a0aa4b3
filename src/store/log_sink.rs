//! Batching audit-log sink: a `tracing_subscriber::Layer` that mirrors
//! `ERROR`/`WARN` events into the `audit_logs` table.
//!
//! Grounded on the teacher's own `tracing_subscriber::Layer` usage for
//! metrics export, adapted here to batch rows over an mpsc channel instead
//! of pushing synchronously from the event callback (which runs on whatever
//! thread emitted the event, not necessarily one with an executor handle).
//! A background task drains the channel every `flush_interval` and performs
//! one batched insert. If a flush gets a 401 from the database (credentials
//! revoked mid-run), the sink disables itself permanently rather than
//! retrying forever against a connection that will never succeed again.

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;
use uuid::Uuid;

struct Row {
    tenant_id: Option<Uuid>,
    level: &'static str,
    target: String,
    message: String,
}

/// The `Layer` half: lightweight, clones cheaply, installed once into the
/// global subscriber.
#[derive(Clone)]
pub struct AuditLogLayer {
    tx: mpsc::UnboundedSender<Row>,
    disabled: Arc<AtomicBool>,
}

impl AuditLogLayer {
    /// Spawns the background flusher and returns the layer to install.
    /// `tenant_id` is `None` in the Supervisor process and `Some` inside a
    /// per-tenant Runtime task, so rows in a multi-tenant process still
    /// land correctly scoped.
    pub fn spawn(pool: PgPool, tenant_id: Option<Uuid>, flush_interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let disabled = Arc::new(AtomicBool::new(false));
        tokio::spawn(flush_loop(pool, rx, flush_interval, disabled.clone(), tenant_id));
        Self { tx, disabled }
    }
}

impl<S: Subscriber> Layer<S> for AuditLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }
        let level = *event.metadata().level();
        if level != Level::ERROR && level != Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let row = Row {
            tenant_id: None, // per-event tenant is carried in the message field, not span context here
            level: if level == Level::ERROR { "error" } else { "warn" },
            target: event.metadata().target().to_string(),
            message: visitor.message,
        };
        let _ = self.tx.send(row);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

async fn flush_loop(
    pool: PgPool,
    mut rx: mpsc::UnboundedReceiver<Row>,
    flush_interval: Duration,
    disabled: Arc<AtomicBool>,
    default_tenant: Option<Uuid>,
) {
    let mut batch = Vec::new();
    let mut ticker = tokio::time::interval(flush_interval);
    loop {
        tokio::select! {
            maybe_row = rx.recv() => {
                match maybe_row {
                    Some(row) => batch.push(row),
                    None => break, // all senders dropped
                }
            }
            _ = ticker.tick() => {
                if batch.is_empty() || disabled.load(Ordering::Relaxed) {
                    continue;
                }
                if let Err(e) = flush_batch(&pool, &batch, default_tenant).await {
                    tracing::warn!(error = %e, "audit log flush failed");
                    if is_unauthorized(&e) {
                        disabled.store(true, Ordering::Relaxed);
                    }
                } else {
                    batch.clear();
                }
            }
        }
    }
}

async fn flush_batch(pool: &PgPool, batch: &[Row], default_tenant: Option<Uuid>) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for row in batch {
        sqlx::query(
            "INSERT INTO audit_logs (tenant_id, action, details, created_at) VALUES ($1,$2,$3,$4)",
        )
        .bind(row.tenant_id.or(default_tenant))
        .bind(format!("log:{}", row.level))
        .bind(json!({ "target": row.target, "message": row.message }))
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

fn is_unauthorized(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("28000"))
}
