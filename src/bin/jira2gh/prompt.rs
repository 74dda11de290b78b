use std::io::Write;

use anyhow::{Context, Result};
use async_trait::async_trait;
use jira2gh::Prompter;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};

/// Asks on stdout and reads the reply from stdin.
pub struct StdinPrompter {
    reader: BufReader<Stdin>,
}

impl StdinPrompter {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()),
        }
    }
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn ask(&mut self, question: &str) -> Result<String> {
        let mut stdout = std::io::stdout();
        stdout.write_all(question.as_bytes())?;
        stdout.flush()?;

        let mut reply = String::new();
        let read = self
            .reader
            .read_line(&mut reply)
            .await
            .context("failed to read confirmation")?;
        if read == 0 {
            anyhow::bail!("failed to read confirmation: stdin closed");
        }
        Ok(reply)
    }
}
