//! In-memory conversation transcript
//!
//! The store is the only owner of the message list; everything else goes
//! through its append/update/delete/clear contract.

mod export;
mod store;

pub use export::{export_records, ExportRecord};
pub use store::{Message, MessageId, Sender, TranscriptStore};
