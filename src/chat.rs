//! Chat state: the transcript, the session controller and the error banner

use crate::client::AnswerService;
use crate::error::ChatError;
use crate::events::{ChatEvent, EVENT_CHANNEL_CAPACITY};
use crate::session::{SessionOutcome, StreamSessionController, TranscriptEdit};
use crate::transcript::{export_records, ExportRecord, Message, MessageId, TranscriptStore};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

pub(crate) struct Chat<S> {
    store: TranscriptStore,
    controller: StreamSessionController<S>,
    events: broadcast::Sender<ChatEvent>,
    /// Last user-visible error, cleared by the next submission or a clear
    error: Option<String>,
}

impl<S: AnswerService> Chat<S> {
    pub(crate) fn new(service: S, first_frame_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store: TranscriptStore::new(),
            controller: StreamSessionController::new(service, first_frame_timeout, events.clone()),
            events,
            error: None,
        }
    }

    /// Subscribe to chat events
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub(crate) fn service(&self) -> &S {
        self.controller.service()
    }

    /// Sender for deletes and clears issued while `submit` is running
    pub(crate) fn edit_handle(&self) -> mpsc::UnboundedSender<TranscriptEdit> {
        self.controller.edit_handle()
    }

    /// Ask a question. Always ends with `ChatEvent::Idle`.
    pub(crate) async fn submit(&mut self, question: &str) -> Result<SessionOutcome, ChatError> {
        self.error = None;
        let _ = self.events.send(ChatEvent::Loading);

        let result = self.controller.submit(&mut self.store, question).await;
        if let Err(e) = &result {
            self.error = Some(e.to_string());
        }

        let _ = self.events.send(ChatEvent::Idle);
        result
    }

    pub(crate) fn delete(&mut self, id: MessageId) -> bool {
        let Some(sender) = self.store.get(id).map(|m| m.sender) else {
            return false;
        };
        info!(id = %id, sender = %sender, "Deleting message");
        self.store.delete(id);
        let _ = self.events.send(ChatEvent::MessageDeleted { id });
        true
    }

    /// Remove every message and the error banner
    pub(crate) fn clear(&mut self) {
        if !self.store.is_empty() {
            info!(count = self.store.len(), "Clearing chat");
        }
        self.store.clear();
        self.error = None;
        let _ = self.events.send(ChatEvent::Cleared);
    }

    /// Export records for the current transcript, stamped now
    pub(crate) fn export(&self) -> Vec<ExportRecord> {
        export_records(self.store.snapshot(), Utc::now())
    }

    pub(crate) fn messages(&self) -> &[Message] {
        self.store.snapshot()
    }

    pub(crate) fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FALLBACK_FAILURE_TEXT;
    use crate::test_support::{ScriptedService, StreamScript};
    use crate::transcript::Sender;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_streamed_answer_and_export() {
        let service = ScriptedService::streaming(vec!["{\"text\":\"Hel\"}\n{\"text\":\"lo\"}\n"]);
        let mut chat = Chat::new(service, TIMEOUT);

        chat.submit("Hi").await.unwrap();

        let records = chat.export();
        assert_eq!(records.len(), 2);
        assert_eq!((records[0].sender, records[0].text.as_str()), (Sender::User, "Hi"));
        assert_eq!(
            (records[1].sender, records[1].text.as_str()),
            (Sender::Assistant, "Hello")
        );
        assert!(chrono::DateTime::parse_from_rfc3339(&records[0].timestamp).is_ok());
        assert!(chat.error().is_none());
    }

    #[tokio::test]
    async fn test_events_bracket_every_submission() {
        let service = ScriptedService::streaming(vec!["{\"text\":\"ok\"}\n"]);
        let mut chat = Chat::new(service, TIMEOUT);
        let mut rx = chat.subscribe();

        chat.submit("q").await.unwrap();
        let _ = chat.submit("  ").await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.first(), Some(&ChatEvent::Loading));
        assert_eq!(events.last(), Some(&ChatEvent::Idle));
        assert_eq!(
            events.iter().filter(|e| **e == ChatEvent::Idle).count(),
            2
        );
    }

    #[tokio::test]
    async fn test_validation_error_sets_banner() {
        let service = ScriptedService::streaming(vec![]);
        let mut chat = Chat::new(service, TIMEOUT);

        let result = chat.submit("   ").await;

        assert!(matches!(result, Err(ChatError::EmptyQuestion)));
        assert_eq!(chat.error(), Some("Please enter a query"));
        assert!(chat.messages().is_empty());
        assert_eq!(chat.service().stream_calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_failure_sets_banner() {
        let service = ScriptedService::new(StreamScript::OpenFails(500), Err(500));
        let mut chat = Chat::new(service, TIMEOUT);

        assert!(chat.submit("q").await.is_err());
        assert_eq!(chat.error(), Some("Error fetching answer"));
        assert_eq!(chat.messages().last().unwrap().text, FALLBACK_FAILURE_TEXT);
    }

    #[tokio::test]
    async fn test_next_submission_clears_banner() {
        let service = ScriptedService::streaming(vec!["{\"text\":\"fine\"}\n"]);
        let mut chat = Chat::new(service, TIMEOUT);

        assert!(chat.submit("").await.is_err());
        assert!(chat.error().is_some());

        chat.submit("q").await.unwrap();
        assert!(chat.error().is_none());
        assert_eq!(chat.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let service = ScriptedService::new(StreamScript::OpenFails(500), Ok("answer"));
        let mut chat = Chat::new(service, TIMEOUT);
        chat.submit("one").await.unwrap();
        chat.submit("two").await.unwrap();

        let first = chat.messages()[0].id;
        assert!(chat.delete(first));
        assert!(!chat.delete(first));
        assert_eq!(chat.messages().len(), 3);
        assert_eq!(chat.messages()[0].text, "answer");

        chat.clear();
        assert!(chat.messages().is_empty());
        assert!(chat.export().is_empty());
        assert!(chat.error().is_none());
    }

    #[tokio::test]
    async fn test_edit_handle_reaches_running_submission() {
        let (feed, service) = ScriptedService::fed(Err(500));
        let mut chat = Chat::new(service, TIMEOUT);
        let mut rx = chat.subscribe();
        let edits = chat.edit_handle();

        let driver = async {
            feed.send("{\"text\":\"stale\"}\n").unwrap();
            while !matches!(rx.recv().await, Ok(ChatEvent::MessageUpdated { .. })) {}
            edits.send(TranscriptEdit::Clear).unwrap();
            drop(feed);
        };
        let (result, ()) = tokio::join!(chat.submit("q"), driver);

        assert!(result.is_ok());
        assert!(chat.messages().is_empty());
        assert!(chat.error().is_none());
    }
}
