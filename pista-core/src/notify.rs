use async_trait::async_trait;

use crate::booking::Booking;

#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound confirmation channel (email, WhatsApp, ...). Strictly
/// best-effort: the allocator logs failures and never rolls back a booking
/// because a message could not be sent.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn booking_confirmed(&self, booking: &Booking) -> Result<(), NotifyError>;
}

/// Default sender: records the confirmation in the log. Stands in for the
/// real mailer in dev and tests.
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn booking_confirmed(&self, booking: &Booking) -> Result<(), NotifyError> {
        tracing::info!(
            code = %booking.code,
            email = %booking.email,
            total = booking.total,
            "booking confirmation queued"
        );
        Ok(())
    }
}
