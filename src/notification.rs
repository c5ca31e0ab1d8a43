//! Outbound notification queue.
//!
//! The core only enqueues; rendering and delivery belong to whoever drains
//! the queue. Enqueue is fire-and-forget with at-least-once semantics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::booking::types::{Booking, BookingRoom, Invoice, RoomId, UserId};
use crate::money::Money;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification queue closed")]
    Closed,

    #[error("Template data serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Template {
    BookingConfirmation,
}

impl Template {
    /// Job name understood by the delivery worker
    pub fn job_name(&self) -> &'static str {
        match self {
            Template::BookingConfirmation => "send-booking-confirmation-email",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub recipient: UserId,
    pub template: Template,
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomSnapshot {
    room_id: RoomId,
    price_at_booking: Money,
}

/// Invoice snapshot rendered into the confirmation email
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmationData<'a> {
    invoice_code: &'a str,
    total_amount: Money,
    paid_date: Option<DateTime<Utc>>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    rooms: Vec<RoomSnapshot>,
}

impl Notification {
    pub fn booking_confirmation(
        invoice: &Invoice,
        booking: &Booking,
        rooms: &[BookingRoom],
    ) -> Result<Self, NotificationError> {
        let data = ConfirmationData {
            invoice_code: &invoice.invoice_code,
            total_amount: invoice.total_amount,
            paid_date: invoice.paid_date,
            start_time: booking.interval.start,
            end_time: booking.interval.end,
            rooms: rooms
                .iter()
                .map(|r| RoomSnapshot {
                    room_id: r.room_id,
                    price_at_booking: r.price_at_booking,
                })
                .collect(),
        };
        Ok(Self {
            recipient: booking.user_id,
            template: Template::BookingConfirmation,
            data: serde_json::to_value(data)?,
        })
    }
}

#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// In-process queue backed by an unbounded tokio channel
#[derive(Clone)]
pub struct ChannelNotificationQueue {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotificationQueue {
    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationQueue for ChannelNotificationQueue {
    async fn enqueue(&self, notification: Notification) -> Result<(), NotificationError> {
        debug!(
            recipient = %notification.recipient,
            job = notification.template.job_name(),
            "Notification enqueued"
        );
        self.tx
            .send(notification)
            .map_err(|_| NotificationError::Closed)
    }
}

/// Drops every job
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotificationQueue;

#[async_trait]
impl NotificationQueue for NullNotificationQueue {
    async fn enqueue(&self, _notification: Notification) -> Result<(), NotificationError> {
        Ok(())
    }
}
