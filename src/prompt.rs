//! Confirmation prompts.
//!
//! The reconciler asks through a [`Prompter`]; the binary answers from
//! stdin.

use anyhow::Result;
use async_trait::async_trait;

/// A reply to a confirmation prompt. Empty input means yes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    /// Confirm each PR separately.
    Interactive,
    /// Stop asking about the remaining PRs.
    Quit,
}

impl Answer {
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "" | "y" | "yes" => Answer::Yes,
            "i" | "interactive" => Answer::Interactive,
            "q" | "quit" => Answer::Quit,
            _ => Answer::No,
        }
    }
}

#[async_trait]
pub trait Prompter {
    /// Shows `question` and returns the raw reply line.
    async fn ask(&mut self, question: &str) -> Result<String>;
}
