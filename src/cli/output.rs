//! Colored output helpers for CLI
//!
//! Provides consistent, colored terminal output for the deepdive CLI,
//! including progress lines rendered from session events.

use crate::research::events::SessionEvent;
use crate::research::types::{FindingStatus, TerminationVerdict};
use owo_colors::OwoColorize;

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print the banner line
    pub fn banner(&self) {
        if self.colored {
            eprintln!(
                "\n  {} {}\n",
                "deepdive".bright_cyan().bold(),
                format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
            );
        } else {
            eprintln!("\n  deepdive v{}\n", env!("CARGO_PKG_VERSION"));
        }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✓".green().bold(), message.green());
        } else {
            eprintln!("  [OK] {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "•".blue(), message);
        } else {
            eprintln!("  [INFO] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            eprintln!("  [WARN] {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            eprintln!("\n  {}", title.bright_white().bold().underline());
        } else {
            eprintln!("\n  === {} ===", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            eprintln!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            eprintln!("    {}: {}", key, value);
        }
    }

    /// Print a list item
    pub fn list_item(&self, item: &str) {
        if self.colored {
            eprintln!("    {} {}", "•".blue(), item);
        } else {
            eprintln!("    - {}", item);
        }
    }

    /// Render one progress event
    pub fn event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::SessionStarted { question, .. } => {
                self.header(&format!("Researching: {}", question))
            }
            SessionEvent::RoundOpened { round } => {
                if self.colored {
                    eprintln!("\n  {}", format!("Round {}", round).cyan().bold());
                } else {
                    eprintln!("\n  --- Round {} ---", round);
                }
            }
            SessionEvent::Reflected { thought, .. } => {
                self.info(&format!("Reflecting: {}", first_line(thought)))
            }
            SessionEvent::Dispatched { topics, .. } => {
                self.info(&format!("Dispatching {} topic(s)", topics.len()));
                for topic in topics {
                    self.list_item(topic);
                }
            }
            SessionEvent::FindingMerged {
                topic,
                status,
                documents_selected,
                ..
            } => match status {
                FindingStatus::Found => self.success(&format!(
                    "{} ({} documents)",
                    topic, documents_selected
                )),
                FindingStatus::NoEvidence => {
                    self.warning(&format!("{}: no evidence found", topic))
                }
                FindingStatus::TimedOut => self.warning(&format!("{}: timed out", topic)),
            },
            SessionEvent::RoundSealed {
                round,
                new_documents,
                ..
            } => self.kv(
                &format!("round {}", round),
                &format!("{} new documents", new_documents),
            ),
            SessionEvent::Terminated { verdict } => self.verdict(verdict),
            SessionEvent::ReportReady { .. } => self.success("Report ready"),
        }
    }

    /// Print the terminal verdict
    pub fn verdict(&self, verdict: &TerminationVerdict) {
        match verdict {
            TerminationVerdict::Complete(reason) => {
                self.success(&format!("Research complete: {}", reason))
            }
            TerminationVerdict::Failed(cause) => self.error(&format!("Research failed: {}", cause)),
            other => self.warning(&format!("Research stopped: {}", other.reason())),
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
