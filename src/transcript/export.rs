use super::{Message, Sender};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// One exported message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRecord {
    pub sender: Sender,
    pub text: String,
    /// Export time, not the message's creation time
    pub timestamp: String,
}

/// Snapshot the transcript into export records, in transcript order.
///
/// Every record carries the same `exported_at` timestamp.
pub fn export_records(messages: &[Message], exported_at: DateTime<Utc>) -> Vec<ExportRecord> {
    let timestamp = exported_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    messages
        .iter()
        .map(|m| ExportRecord {
            sender: m.sender,
            text: m.text.clone(),
            timestamp: timestamp.clone(),
        })
        .collect()
}
