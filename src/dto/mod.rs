//! Wire-facing data transfer objects.

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod health;
pub mod room;
pub mod validation;
pub mod ws;

/// Format a timestamp as RFC 3339 for wire payloads.
pub(crate) fn format_timestamp(time: OffsetDateTime) -> String {
    time.format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
