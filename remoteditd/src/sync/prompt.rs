use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Yes,
    Cancel,
}

/// Asks the user before destructive steps. May suspend for input.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    async fn confirm(&self, message: &str, detail: &str) -> Confirmation;
}

/// Answers every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub Confirmation);

#[async_trait]
impl ConfirmPrompt for AutoConfirm {
    async fn confirm(&self, _message: &str, _detail: &str) -> Confirmation {
        self.0
    }
}

/// Reads `y`/`n` from stdin. Anything but an explicit yes cancels.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

#[async_trait]
impl ConfirmPrompt for TerminalPrompt {
    async fn confirm(&self, message: &str, detail: &str) -> Confirmation {
        let mut stderr = tokio::io::stderr();
        let question = format!("{message}\n  {detail}\n[y/N] ");
        if let Err(err) = stderr.write_all(question.as_bytes()).await {
            warn!(error = %err, "failed to write prompt");
            return Confirmation::Cancel;
        }
        let _ = stderr.flush().await;

        let mut line = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut line).await {
            Ok(_) => parse_answer(&line),
            Err(err) => {
                warn!(error = %err, "failed to read prompt answer");
                Confirmation::Cancel
            }
        }
    }
}

fn parse_answer(line: &str) -> Confirmation {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Confirmation::Yes,
        _ => Confirmation::Cancel,
    }
}
