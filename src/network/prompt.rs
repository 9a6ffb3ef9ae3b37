//! Live-network confirmation
//!
//! Before the first state-changing call on a live network the user is asked
//! once whether to continue. Anything other than `y` declines.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::Result;

#[async_trait]
pub trait Confirmation: Send + Sync {
    /// Ask `question`; `true` means go ahead.
    async fn confirm(&self, question: &str) -> Result<bool>;
}

/// Interactive prompt on stdin/stdout.
#[derive(Debug, Default)]
pub struct StdinConfirmation;

#[async_trait]
impl Confirmation for StdinConfirmation {
    async fn confirm(&self, question: &str) -> Result<bool> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{} Continue? (y/N): ", question).as_bytes())
            .await?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(is_yes(&line))
    }
}

/// Fixed answer, for `--no-prompt` and tests. Counts how often it was asked.
#[derive(Debug)]
pub struct AutoConfirm {
    answer: bool,
    asked: AtomicUsize,
}

impl AutoConfirm {
    pub fn yes() -> Self {
        Self {
            answer: true,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn no() -> Self {
        Self {
            answer: false,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Confirmation for AutoConfirm {
    async fn confirm(&self, _question: &str) -> Result<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}
