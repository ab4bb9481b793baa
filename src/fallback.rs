//! One-shot fallback when streaming is unavailable
//!
//! The fallback answer always lands in a message of its own. A partial
//! assistant message left behind by a broken stream is not touched.

use crate::client::AnswerService;
use crate::error::ChatError;
use crate::events::ChatEvent;
use crate::transcript::{MessageId, Sender, TranscriptStore};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

/// Text of the error message appended when the fallback fails too
pub(crate) const FALLBACK_FAILURE_TEXT: &str = "Failed to get response";

/// Ask for the complete answer and install it as a single message.
///
/// On failure an `error` message is appended instead and the failure is
/// returned for display.
#[instrument(skip_all, fields(question_len = question.len()))]
pub(crate) async fn request_fallback<S: AnswerService>(
    service: &S,
    store: &mut TranscriptStore,
    question: &str,
    events: &broadcast::Sender<ChatEvent>,
) -> Result<MessageId, ChatError> {
    match service.ask(question).await {
        Ok(answer) => {
            info!(answer_len = answer.len(), "Fallback answer received");
            let id = store.append(Sender::Assistant, answer.as_str());
            let _ = events.send(ChatEvent::MessageAdded {
                id,
                sender: Sender::Assistant,
                text: answer,
            });
            Ok(id)
        }
        Err(e) => {
            error!("Fallback request failed: {}", e);
            let id = store.append(Sender::Error, FALLBACK_FAILURE_TEXT);
            let _ = events.send(ChatEvent::MessageAdded {
                id,
                sender: Sender::Error,
                text: FALLBACK_FAILURE_TEXT.to_string(),
            });
            Err(ChatError::Fallback(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedService, StreamScript};

    #[tokio::test]
    async fn test_success_appends_assistant_message() {
        let service = ScriptedService::new(StreamScript::OpenFails(502), Ok("42"));
        let (tx, mut rx) = broadcast::channel(16);
        let mut store = TranscriptStore::new();

        let id = request_fallback(&service, &mut store, "q", &tx).await.unwrap();

        let message = store.get(id).unwrap();
        assert_eq!(message.sender, Sender::Assistant);
        assert_eq!(message.text, "42");
        assert_eq!(service.fallback_calls(), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            ChatEvent::MessageAdded {
                id,
                sender: Sender::Assistant,
                text: "42".into()
            }
        );
    }

    #[tokio::test]
    async fn test_failure_appends_error_message() {
        let service = ScriptedService::new(StreamScript::OpenFails(502), Err(500));
        let (tx, _rx) = broadcast::channel(16);
        let mut store = TranscriptStore::new();

        let result = request_fallback(&service, &mut store, "q", &tx).await;

        assert!(matches!(result, Err(ChatError::Fallback(_))));
        let messages = store.snapshot();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, Sender::Error);
        assert_eq!(messages[0].text, FALLBACK_FAILURE_TEXT);
    }

    #[tokio::test]
    async fn test_leaves_partial_message_alone() {
        let service = ScriptedService::new(StreamScript::OpenFails(502), Ok("full answer"));
        let (tx, _rx) = broadcast::channel(16);
        let mut store = TranscriptStore::new();
        let partial = store.append(Sender::Assistant, "full ans");

        let id = request_fallback(&service, &mut store, "q", &tx).await.unwrap();

        assert_ne!(id, partial);
        assert_eq!(store.get(partial).unwrap().text, "full ans");
        assert_eq!(store.get(id).unwrap().text, "full answer");
    }
}
