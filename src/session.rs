//! Stream session controller
//!
//! Drives one question-to-answer exchange: appends the user message, opens
//! the stream, folds frames into a single assistant message, and hands over
//! to the one-shot fallback when streaming fails.
//!
//! States: `Idle -> AwaitingStream -> Streaming -> Completed -> Idle`, with
//! `AwaitingStream | Streaming -> Failed -> Idle` through the fallback.
//!
//! While a session holds the transcript, deletes and clears arrive as
//! [`TranscriptEdit`]s and are applied between chunks.

use crate::client::{AnswerService, ChunkStream};
use crate::error::{ChatError, StreamFailure};
use crate::events::ChatEvent;
use crate::fallback::request_fallback;
use crate::stream::{FragmentAccumulator, Frame, FrameDecoder};
use crate::transcript::{MessageId, Sender, TranscriptStore};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingStream,
    Streaming,
    Completed,
    Failed,
}

/// How a submitted question was answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The stream delivered at least one frame and closed normally
    Streamed { assistant_id: MessageId },
    /// The stream closed without a single valid frame
    Empty,
    /// Streaming failed and the one-shot request answered instead.
    /// `partial_id` is the assistant message the broken stream had started.
    Fallback {
        assistant_id: MessageId,
        partial_id: Option<MessageId>,
    },
}

/// Transcript change requested while a question is being answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TranscriptEdit {
    Delete(MessageId),
    Clear,
}

/// In-flight state of one exchange
struct StreamSession {
    decoder: FrameDecoder,
    accumulator: FragmentAccumulator,
    /// Set once the first frame has created the assistant message
    assistant_id: Option<MessageId>,
}

impl StreamSession {
    fn new() -> Self {
        Self {
            decoder: FrameDecoder::new(),
            accumulator: FragmentAccumulator::new(),
            assistant_id: None,
        }
    }
}

pub(crate) struct StreamSessionController<S> {
    service: S,
    first_frame_timeout: Duration,
    events: broadcast::Sender<ChatEvent>,
    state: SessionState,
    edit_tx: mpsc::UnboundedSender<TranscriptEdit>,
    edits: mpsc::UnboundedReceiver<TranscriptEdit>,
}

impl<S: AnswerService> StreamSessionController<S> {
    pub(crate) fn new(
        service: S,
        first_frame_timeout: Duration,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        let (edit_tx, edits) = mpsc::unbounded_channel();
        Self {
            service,
            first_frame_timeout,
            events,
            state: SessionState::Idle,
            edit_tx,
            edits,
        }
    }

    /// Sender for transcript edits; they take effect at the next chunk
    /// boundary of a running session, or when the next session starts.
    pub(crate) fn edit_handle(&self) -> mpsc::UnboundedSender<TranscriptEdit> {
        self.edit_tx.clone()
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn service(&self) -> &S {
        &self.service
    }

    /// Answer one question, writing every step into `store`.
    ///
    /// An empty or whitespace-only question is rejected before anything is
    /// appended or sent. Streaming failures are absorbed by the fallback;
    /// only a failed fallback is returned as an error.
    #[tracing::instrument(skip_all, fields(question_len = question.len()))]
    pub(crate) async fn submit(
        &mut self,
        store: &mut TranscriptStore,
        question: &str,
    ) -> Result<SessionOutcome, ChatError> {
        if question.trim().is_empty() {
            return Err(ChatError::EmptyQuestion);
        }
        self.apply_pending_edits(store);

        let user_id = store.append(Sender::User, question);
        self.emit(ChatEvent::MessageAdded {
            id: user_id,
            sender: Sender::User,
            text: question.to_string(),
        });

        self.transition(SessionState::AwaitingStream);
        let mut session = StreamSession::new();
        let streamed = self.run_stream(store, &mut session, question).await;

        let outcome = match streamed {
            Ok(()) => {
                self.transition(SessionState::Completed);
                info!(
                    frames = session.accumulator.frames(),
                    skipped = session.decoder.skipped(),
                    answer_len = session.accumulator.text().len(),
                    "Stream completed"
                );
                Ok(match session.assistant_id {
                    Some(assistant_id) => SessionOutcome::Streamed { assistant_id },
                    None => SessionOutcome::Empty,
                })
            }
            Err(failure) => {
                self.transition(SessionState::Failed);
                warn!(
                    frames = session.accumulator.frames(),
                    "Streaming failed, falling back to one-shot request: {}", failure
                );
                self.emit(ChatEvent::FallbackEngaged {
                    reason: failure.to_string(),
                });
                self.apply_pending_edits(store);
                request_fallback(&self.service, store, question, &self.events)
                    .await
                    .map(|assistant_id| SessionOutcome::Fallback {
                        assistant_id,
                        partial_id: session.assistant_id,
                    })
            }
        };

        self.apply_pending_edits(store);
        self.transition(SessionState::Idle);
        outcome
    }

    /// Consume the stream until it closes or fails
    async fn run_stream(
        &mut self,
        store: &mut TranscriptStore,
        session: &mut StreamSession,
        question: &str,
    ) -> Result<(), StreamFailure> {
        // Bounds the wait from opening until the first valid frame.
        let deadline = Instant::now() + self.first_frame_timeout;
        let first_frame_timeout = self.first_frame_timeout;

        let mut body: ChunkStream = match timeout_at(deadline, self.service.open_stream(question))
            .await
        {
            Err(_) => return Err(StreamFailure::FirstFrameTimeout(self.first_frame_timeout)),
            Ok(Err(e)) => return Err(StreamFailure::Open(e)),
            Ok(Ok(body)) => body,
        };

        loop {
            let awaiting_first = session.assistant_id.is_none();
            let next_chunk = async {
                if awaiting_first {
                    timeout_at(deadline, body.next())
                        .await
                        .map_err(|_| StreamFailure::FirstFrameTimeout(first_frame_timeout))
                } else {
                    Ok(body.next().await)
                }
            };

            let next = tokio::select! {
                Some(edit) = self.edits.recv() => {
                    self.apply_edit(store, edit);
                    continue;
                }
                next = next_chunk => next?,
            };

            match next {
                None => break,
                Some(Err(e)) => return Err(StreamFailure::Interrupted(e)),
                Some(Ok(chunk)) => {
                    let frames = session.decoder.push(&chunk);
                    self.apply_frames(store, session, frames);
                }
            }
        }

        // Release the read handle before the trailing flush.
        drop(body);
        let tail: Vec<Frame> = session.decoder.finish().into_iter().collect();
        self.apply_frames(store, session, tail);
        Ok(())
    }

    /// Apply one chunk's frames in arrival order, then publish the result once
    fn apply_frames(
        &mut self,
        store: &mut TranscriptStore,
        session: &mut StreamSession,
        frames: Vec<Frame>,
    ) {
        if frames.is_empty() {
            return;
        }

        let id = match session.assistant_id {
            Some(id) => id,
            None => {
                let id = store.append(Sender::Assistant, "");
                session.assistant_id = Some(id);
                self.transition(SessionState::Streaming);
                self.emit(ChatEvent::MessageAdded {
                    id,
                    sender: Sender::Assistant,
                    text: String::new(),
                });
                id
            }
        };

        let mut applied = true;
        for frame in &frames {
            let text = session.accumulator.push(frame);
            applied = store.update_text(id, text);
        }

        if applied {
            self.emit(ChatEvent::MessageUpdated {
                id,
                text: session.accumulator.text().to_string(),
            });
        } else {
            debug!(id = %id, "Assistant message removed while streaming");
        }
    }

    fn apply_pending_edits(&mut self, store: &mut TranscriptStore) {
        while let Ok(edit) = self.edits.try_recv() {
            self.apply_edit(store, edit);
        }
    }

    fn apply_edit(&mut self, store: &mut TranscriptStore, edit: TranscriptEdit) {
        match edit {
            TranscriptEdit::Delete(id) => {
                if store.delete(id) {
                    info!(id = %id, "Deleted message");
                    self.emit(ChatEvent::MessageDeleted { id });
                }
            }
            TranscriptEdit::Clear => {
                info!(count = store.len(), "Cleared transcript");
                store.clear();
                self.emit(ChatEvent::Cleared);
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
