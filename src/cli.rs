//! Interactive terminal front end
//!
//! A plain line is a question; lines starting with `/` are commands.
//! While a question is being answered only `/delete` and `/clear` are
//! accepted; they are applied between chunks of the answer.

use crate::chat::Chat;
use crate::client::HttpAnswerClient;
use crate::config::Config;
use crate::events::ChatEvent;
use crate::session::{SessionOutcome, TranscriptEdit};
use crate::storage;
use crate::transcript::{Message, MessageId, Sender};
use anyhow::Context;
use std::collections::HashMap;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

const HELP: &str = "\
Type a question and press Enter. Commands:
  /list          show the conversation with message ids
  /delete <id>   delete one message
  /clear         delete every message
  /export        save the conversation as JSON
  /health        check the answering service
  /help          show this help
  /quit          exit";

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Ask(String),
    List,
    Delete(MessageId),
    Clear,
    Export,
    Health,
    Help,
    Quit,
    Invalid(String),
}

/// Parse one input line
pub(crate) fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Command::Ask(line.trim_end_matches(['\r', '\n']).to_string());
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or("");
    let arg = parts.next();

    match (name, arg) {
        ("list", None) => Command::List,
        ("delete", Some(id)) => match id.parse::<u64>() {
            Ok(id) => Command::Delete(MessageId::from(id)),
            Err(_) => Command::Invalid(format!("Not a message id: {id}")),
        },
        ("delete", None) => Command::Invalid("Usage: /delete <id>".to_string()),
        ("clear", None) => Command::Clear,
        ("export", None) => Command::Export,
        ("health", None) => Command::Health,
        ("help", None) => Command::Help,
        ("quit" | "exit", None) => Command::Quit,
        _ => Command::Invalid(format!("Unknown command: /{rest}")),
    }
}

/// Prints streamed answers incrementally from chat events
#[derive(Default)]
pub(crate) struct Renderer {
    /// Bytes of each assistant message already printed
    printed: HashMap<MessageId, usize>,
    /// A line is open and needs a newline before anything else
    line_open: bool,
}

impl Renderer {
    /// Render one event; returns true once the submission is over
    pub(crate) fn handle(&mut self, event: &ChatEvent, out: &mut impl Write) -> io::Result<bool> {
        match event {
            ChatEvent::Loading => {}
            ChatEvent::MessageAdded { sender: Sender::User, .. } => {}
            ChatEvent::MessageAdded {
                id,
                sender: Sender::Assistant,
                text,
            } => {
                self.close_line(out)?;
                write!(out, "assistant> {text}")?;
                self.printed.insert(*id, text.len());
                self.line_open = true;
            }
            ChatEvent::MessageAdded {
                sender: Sender::Error,
                text,
                ..
            } => {
                self.close_line(out)?;
                writeln!(out, "error> {text}")?;
            }
            ChatEvent::MessageUpdated { id, text } => {
                let fresh = match self.printed.get(id).copied() {
                    Some(done) => text.get(done..).unwrap_or(text.as_str()),
                    // The MessageAdded for this answer was missed.
                    None => {
                        self.close_line(out)?;
                        write!(out, "assistant> ")?;
                        text.as_str()
                    }
                };
                write!(out, "{fresh}")?;
                self.printed.insert(*id, text.len());
                self.line_open = true;
            }
            ChatEvent::MessageDeleted { id } => {
                if self.printed.remove(id).is_some() {
                    self.close_line(out)?;
                    writeln!(out, "(message {id} deleted)")?;
                }
            }
            ChatEvent::Cleared => {
                self.printed.clear();
                self.close_line(out)?;
                writeln!(out, "(chat cleared)")?;
            }
            ChatEvent::FallbackEngaged { reason } => {
                debug!(%reason, "Fallback engaged");
                self.close_line(out)?;
                writeln!(out, "(streaming unavailable, asking without streaming)")?;
            }
            ChatEvent::Idle => {
                self.close_line(out)?;
                out.flush()?;
                return Ok(true);
            }
        }
        out.flush()?;
        Ok(false)
    }

    fn close_line(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.line_open {
            writeln!(out)?;
            self.line_open = false;
        }
        Ok(())
    }
}

/// Render events to stdout until the submission goes idle
async fn render_until_idle(rx: &mut broadcast::Receiver<ChatEvent>) -> io::Result<()> {
    let mut renderer = Renderer::default();
    let mut stdout = io::stdout();
    loop {
        match rx.recv().await {
            Ok(event) => {
                if renderer.handle(&event, &mut stdout)? {
                    return Ok(());
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Renderer lagged behind chat events");
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

/// Forward a line typed while an answer is streaming
fn forward_edit(line: &str, edits: &mpsc::UnboundedSender<TranscriptEdit>) {
    let edit = match parse_command(line) {
        Command::Delete(id) => TranscriptEdit::Delete(id),
        Command::Clear => TranscriptEdit::Clear,
        Command::Invalid(message) => {
            println!("{message}");
            return;
        }
        _ => {
            println!("Busy answering; only /delete and /clear work right now");
            return;
        }
    };
    if edits.send(edit).is_err() {
        warn!("Chat session is gone, dropping edit");
    }
}

fn format_message(message: &Message) -> String {
    let time = message.created_at.format("%H:%M:%S");
    match message.sender {
        // Error entries have no delete action; /clear removes them.
        Sender::Error => format!("      {time} error: {}", message.text),
        sender => format!("[{:>3}] {time} {sender}: {}", message.id, message.text),
    }
}

fn prompt() -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}

/// Run the interactive loop until `/quit` or end of input
pub(crate) async fn run(chat: &mut Chat<HttpAnswerClient>, config: &Config) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        prompt()?;
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        match parse_command(&line) {
            Command::Ask(question) => {
                let mut rx = chat.subscribe();
                let edits = chat.edit_handle();
                let mut input_open = true;
                let (result, rendered) = {
                    let answering = async {
                        tokio::join!(chat.submit(&question), render_until_idle(&mut rx))
                    };
                    tokio::pin!(answering);

                    loop {
                        tokio::select! {
                            done = &mut answering => break done,
                            line = lines.next_line(), if input_open => {
                                match line.context("Failed to read input")? {
                                    Some(line) => forward_edit(&line, &edits),
                                    None => input_open = false,
                                }
                            }
                        }
                    }
                };
                rendered?;
                match result {
                    Ok(SessionOutcome::Streamed { assistant_id }) => {
                        debug!(id = %assistant_id, "Answer streamed");
                    }
                    Ok(SessionOutcome::Empty) => println!("(no answer received)"),
                    Ok(SessionOutcome::Fallback {
                        assistant_id,
                        partial_id,
                    }) => {
                        info!(
                            id = %assistant_id,
                            partial = ?partial_id,
                            "Answer delivered without streaming"
                        );
                    }
                    Err(_) => {
                        if let Some(banner) = chat.error() {
                            println!("! {banner}");
                        }
                    }
                }
                if !input_open {
                    break;
                }
            }
            Command::List => {
                if chat.messages().is_empty() {
                    println!("Start a conversation... Ask about your documents!");
                }
                for message in chat.messages() {
                    println!("{}", format_message(message));
                }
                if let Some(banner) = chat.error() {
                    println!("! {banner}");
                }
            }
            Command::Delete(id) => {
                if !chat.delete(id) {
                    println!("No message with id {id}");
                }
            }
            Command::Clear => {
                if chat.messages().is_empty() {
                    continue;
                }
                print!("Are you sure you want to clear all messages? [y/N] ");
                io::stdout().flush()?;
                let answer = lines.next_line().await.context("Failed to read input")?;
                if matches!(answer.as_deref().map(str::trim), Some("y" | "Y" | "yes")) {
                    chat.clear();
                }
            }
            Command::Export => {
                match storage::save_export(&chat.export(), config.export.directory.as_deref()) {
                    Ok(path) => println!("Exported to {}", path.display()),
                    Err(e) => println!("! Export failed: {e}"),
                }
            }
            Command::Health => match chat.service().health().await {
                Ok(status) => println!(
                    "{} (model key loaded: {})",
                    status.message, status.gemini_key_loaded
                ),
                Err(e) => println!("! Service unreachable: {e}"),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Invalid(message) => println!("{message}"),
        }
    }

    info!("Input closed, exiting");
    Ok(())
}
