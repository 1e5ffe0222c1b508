// ABOUTME: Pluggable approval for rolling back after a failed deployment.
// ABOUTME: Interactive stdin prompt for operators, fixed answers for automation and tests.

use async_trait::async_trait;
use std::io::{BufRead, Write};

#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Whether to restore the latest backup. `reason` is shown to the operator.
    async fn approve_rollback(&self, reason: &str) -> bool;
}

/// Always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

#[async_trait]
impl ApprovalGate for FixedAnswer {
    async fn approve_rollback(&self, reason: &str) -> bool {
        tracing::info!(approved = self.0, "rollback decided without prompting: {reason}");
        self.0
    }
}

/// Asks on stderr and reads a yes/no answer from stdin. End of input declines.
#[derive(Debug, Default)]
pub struct StdinPrompt;

#[async_trait]
impl ApprovalGate for StdinPrompt {
    async fn approve_rollback(&self, reason: &str) -> bool {
        let question = format!("{reason}\nRoll back to the latest backup? [y/N] ");
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(question.as_bytes());
            let _ = stderr.flush();

            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line),
            }
        })
        .await
        .ok()
        .flatten();

        answer.as_deref().is_some_and(is_yes)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_approves() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("sure"));
    }

    #[tokio::test]
    async fn fixed_answer_is_returned() {
        assert!(FixedAnswer(true).approve_rollback("verify failed").await);
        assert!(!FixedAnswer(false).approve_rollback("verify failed").await);
    }
}
