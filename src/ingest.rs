// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Queue message handling, independent of the broker client.
//!
//! The transport (AMQP consumer, etc.) passes each message body to
//! [`handle_message`] and acts on the returned [`MessageDisposition`].

use tracing::{debug, warn};

use crate::log_entry::LogEntry;
use crate::resilience::resilient_writer::ResilientWriter;

/// What the transport should do with a consumed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    /// Delivered; acknowledge
    Ack,
    /// Delivery failed; negative-acknowledge with requeue
    Requeue,
    /// Not a log entry; acknowledge and drop. Requeueing would loop forever.
    Discard,
}

impl MessageDisposition {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Requeue => "requeue",
            Self::Discard => "discard",
        }
    }
}

/// Decode a message body and submit it through the resilient path.
///
/// A failed submit has already persisted the entry to the fallback store;
/// the requeued copy carries the same id, so the backend deduplicates
/// whichever copy arrives second.
pub async fn handle_message(body: &[u8], writer: &ResilientWriter) -> MessageDisposition {
    let disposition = match serde_json::from_slice::<LogEntry>(body) {
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "Queue message is not a valid log entry, discarding");
            MessageDisposition::Discard
        }
        Ok(entry) => {
            let id = entry.id;
            let outcome = writer.submit(entry).await;
            if outcome.is_success() {
                debug!(%id, "Queue message delivered");
                MessageDisposition::Ack
            } else {
                warn!(%id, errors = %outcome.error_summary(), "Queue message delivery failed, requeueing");
                MessageDisposition::Requeue
            }
        }
    };

    crate::metrics::record_ingest(disposition.as_str());
    disposition
}
