//! Scripted answering service for tests

use crate::client::{AnswerService, ChunkStream};
use crate::error::ResponseError;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::cell::{Cell, RefCell};
use tokio::sync::mpsc;

/// What the streaming endpoint does when opened
pub(crate) enum StreamScript {
    /// Opening fails with this HTTP status
    OpenFails(u16),
    /// Body chunks in order; `Err` breaks the body mid-flight
    Chunks(Vec<Result<&'static str, &'static str>>),
    /// Body chunks, then the body never produces anything again
    ChunksThenStall(Vec<&'static str>),
    /// Body chunks sent by the test while the session runs; the body
    /// closes when the sender is dropped
    Fed(RefCell<Option<mpsc::UnboundedReceiver<&'static str>>>),
}

pub(crate) struct ScriptedService {
    stream: StreamScript,
    fallback: Result<&'static str, u16>,
    stream_calls: Cell<usize>,
    fallback_calls: Cell<usize>,
    questions: RefCell<Vec<String>>,
}

impl ScriptedService {
    pub(crate) fn new(stream: StreamScript, fallback: Result<&'static str, u16>) -> Self {
        Self {
            stream,
            fallback,
            stream_calls: Cell::new(0),
            fallback_calls: Cell::new(0),
            questions: RefCell::new(Vec::new()),
        }
    }

    /// Shorthand for a healthy stream delivering these chunks
    pub(crate) fn streaming(chunks: Vec<&'static str>) -> Self {
        Self::new(
            StreamScript::Chunks(chunks.into_iter().map(Ok).collect()),
            Err(500),
        )
    }

    /// A stream the test feeds chunk by chunk through the returned sender
    pub(crate) fn fed(fallback: Result<&'static str, u16>) -> (mpsc::UnboundedSender<&'static str>, Self) {
        let (feed, rx) = mpsc::unbounded_channel();
        (feed, Self::new(StreamScript::Fed(RefCell::new(Some(rx))), fallback))
    }

    pub(crate) fn stream_calls(&self) -> usize {
        self.stream_calls.get()
    }

    pub(crate) fn fallback_calls(&self) -> usize {
        self.fallback_calls.get()
    }

    /// Every question received, on either endpoint
    pub(crate) fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }
}

fn chunk(text: &'static str) -> Result<Bytes, ResponseError> {
    Ok(Bytes::from_static(text.as_bytes()))
}

impl AnswerService for ScriptedService {
    async fn open_stream(&self, question: &str) -> Result<ChunkStream, ResponseError> {
        self.stream_calls.set(self.stream_calls.get() + 1);
        self.questions.borrow_mut().push(question.to_string());

        match &self.stream {
            StreamScript::OpenFails(status) => Err(ResponseError::ServerError {
                status: *status,
                message: "stream unavailable".into(),
            }),
            StreamScript::Chunks(chunks) => {
                let items: Vec<_> = chunks
                    .iter()
                    .map(|c| match c {
                        Ok(text) => chunk(*text),
                        Err(reason) => Err(ResponseError::Transport(reason.to_string())),
                    })
                    .collect();
                Ok(stream::iter(items).boxed())
            }
            StreamScript::ChunksThenStall(chunks) => {
                let items: Vec<_> = chunks.iter().copied().map(chunk).collect();
                Ok(stream::iter(items).chain(stream::pending()).boxed())
            }
            StreamScript::Fed(feed) => {
                let Some(rx) = feed.borrow_mut().take() else {
                    return Err(ResponseError::Transport("feed already used".into()));
                };
                let body = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|text| (chunk(text), rx))
                });
                Ok(body.boxed())
            }
        }
    }

    async fn ask(&self, question: &str) -> Result<String, ResponseError> {
        self.fallback_calls.set(self.fallback_calls.get() + 1);
        self.questions.borrow_mut().push(question.to_string());

        match self.fallback {
            Ok(answer) => Ok(answer.to_string()),
            Err(status) => Err(ResponseError::ServerError {
                status,
                message: "fallback unavailable".into(),
            }),
        }
    }
}
