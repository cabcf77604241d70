//! Interactive question loop
//!
//! Reads questions with rustyline, keeps a persistent input history, and
//! handles a handful of `/` commands. Everything else is a question for
//! the session.

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;

use crate::session::{QueryResponse, Session};
use crate::types::Role;

const PROMPT: &str = "docbuddy> ";

/// REPL command types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Help,
    History { limit: Option<usize> },
    Reset,
    Exit,
    Unknown { input: String },
    Empty,
}

impl Command {
    /// Parse a line of input
    pub fn parse(input: &str) -> Command {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Command::Empty;
        }

        let Some(rest) = trimmed.strip_prefix('/') else {
            return Command::Ask(trimmed.to_string());
        };

        let parts: Vec<&str> = rest.split_whitespace().collect();
        match parts.first().map(|p| p.to_lowercase()).as_deref() {
            Some("help") | Some("h") => Command::Help,
            Some("exit") | Some("quit") | Some("q") => Command::Exit,
            Some("history") => Command::History {
                limit: parts.get(1).and_then(|s| s.parse().ok()),
            },
            Some("reset") | Some("clear") => Command::Reset,
            _ => Command::Unknown {
                input: trimmed.to_string(),
            },
        }
    }
}

/// Render a response for a terminal
pub fn render_response(response: &QueryResponse) -> String {
    match response {
        QueryResponse::Answer(payload) => {
            let mut out = format!("{}\n", payload.answer);
            if !payload.citations.is_empty() {
                out.push_str(&format!("\n{}\n", "Sources:".bold()));
                for (i, citation) in payload.citations.iter().enumerate() {
                    out.push_str(&format!(
                        "  [{}] {} ({}..{})\n",
                        i + 1,
                        citation.document_id.cyan(),
                        citation.span.start,
                        citation.span.end
                    ));
                }
            }
            let confidence = format!("{:.2}", payload.confidence);
            let confidence = if payload.confidence >= 0.5 {
                confidence.green()
            } else {
                confidence.yellow()
            };
            out.push_str(&format!("{} {}", "Confidence:".bold(), confidence));
            out
        }
        QueryResponse::Failure(payload) => format!(
            "{} {} during {}\n  {}",
            "✗".red(),
            payload.cause.red().bold(),
            payload.step_failed.wire_name(),
            payload.detail.dimmed()
        ),
    }
}

/// Interactive loop over a session
pub struct Repl {
    editor: DefaultEditor,
    history_path: Option<PathBuf>,
    session: Session,
}

impl Repl {
    pub fn new(session: Session) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;
        let history_path = dirs::home_dir().map(|home| home.join(".docbuddy").join("history"));

        if let Some(path) = &history_path {
            if path.exists() {
                let _ = editor.load_history(path);
            }
        }

        Ok(Self {
            editor,
            history_path,
            session,
        })
    }

    /// Run until `/exit` or end of input
    pub async fn run(&mut self) -> Result<()> {
        println!(
            "{} Ask about your documents. Type {} for commands.\n",
            "DocBuddy".bold().cyan(),
            "/help".cyan()
        );

        loop {
            let line = match self.editor.readline(PROMPT) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(anyhow::anyhow!("Readline error: {}", err)),
            };

            let command = Command::parse(&line);
            if !matches!(command, Command::Empty) {
                let _ = self.editor.add_history_entry(line.trim());
            }

            match command {
                Command::Empty => {}
                Command::Ask(question) => {
                    let response = self.session.ask(&question).await;
                    println!("\n{}\n", render_response(&response));
                }
                Command::Help => show_help(),
                Command::History { limit } => self.show_history(limit.unwrap_or(10)),
                Command::Reset => {
                    self.session.clear();
                    println!("{}", "Conversation cleared.".yellow());
                }
                Command::Exit => break,
                Command::Unknown { input } => {
                    println!("{}", format!("Unknown command: {}", input).red());
                    println!("Type {} for available commands", "/help".cyan());
                }
            }
        }

        self.save_history();
        println!("{}", "Goodbye!".green());
        Ok(())
    }

    fn show_history(&self, limit: usize) {
        let history = self.session.history();
        if history.is_empty() {
            println!("{}", "No conversation yet.".dimmed());
            return;
        }
        let start = history.len().saturating_sub(limit);
        for turn in &history[start..] {
            let role = match turn.role {
                Role::User => "you".cyan(),
                Role::Assistant => "docbuddy".green(),
                Role::System => "system".dimmed(),
            };
            println!("{}: {}", role, turn.text);
        }
    }

    fn save_history(&mut self) {
        if let Some(path) = &self.history_path {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = self.editor.save_history(path);
        }
    }
}

fn show_help() {
    println!("{}", "Commands:".bold());
    println!("  {}          show this help", "/help".cyan());
    println!("  {} [n]   show the last n conversation turns", "/history".cyan());
    println!("  {}         forget the conversation so far", "/reset".cyan());
    println!("  {}          leave", "/exit".cyan());
    println!("Anything else is asked as a question.");
}
