//! In-memory oracle fake (testing only)
//!
//! `ScriptedOracle` answers from three sources, checked in order:
//! 1. one-shot targeted answers: the first whose needle occurs in the prompt
//!    is consumed
//! 2. sticky rules: the first rule whose needle occurs in the prompt wins
//! 3. a FIFO queue of one-shot answers
//!
//! Every prompt is recorded so tests can assert on what was asked.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Oracle, OracleError, OracleResult};

#[derive(Debug, Default)]
pub struct ScriptedOracle {
    targeted: Mutex<Vec<(String, OracleResult<String>)>>,
    rules: Mutex<Vec<(String, OracleResult<String>)>>,
    queue: Mutex<VecDeque<OracleResult<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot successful answer.
    pub fn push_ok(&self, text: impl Into<String>) {
        self.queue.lock().unwrap().push_back(Ok(text.into()));
    }

    /// Queue a one-shot failure.
    pub fn push_err(&self, err: OracleError) {
        self.queue.lock().unwrap().push_back(Err(err));
    }

    /// Answer the next prompt containing `needle` with `answer`, once.
    pub fn push_when(&self, needle: impl Into<String>, answer: OracleResult<String>) {
        self.targeted.lock().unwrap().push((needle.into(), answer));
    }

    /// Answer every prompt containing `needle` with `answer`.
    pub fn respond_when(&self, needle: impl Into<String>, answer: OracleResult<String>) {
        self.rules.lock().unwrap().push((needle.into(), answer));
    }

    /// All prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Number of prompts containing `needle`.
    pub fn calls_containing(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, prompt: &str) -> OracleResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        {
            let mut targeted = self.targeted.lock().unwrap();
            if let Some(pos) = targeted.iter().position(|(needle, _)| prompt.contains(needle)) {
                return targeted.remove(pos).1;
            }
        }

        {
            let rules = self.rules.lock().unwrap();
            if let Some((_, answer)) = rules.iter().find(|(needle, _)| prompt.contains(needle)) {
                return answer.clone();
            }
        }

        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Unavailable("script exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_take_precedence_over_queue() {
        let oracle = ScriptedOracle::new();
        oracle.push_ok("queued");
        oracle.respond_when("SECURITY", Ok("rule".to_string()));

        assert_eq!(oracle.complete("SECURITY review").await.unwrap(), "rule");
        assert_eq!(oracle.complete("other").await.unwrap(), "queued");
        assert!(oracle.complete("other").await.is_err());
        assert_eq!(oracle.call_count(), 3);
        assert_eq!(oracle.calls_containing("other"), 2);
    }

    #[tokio::test]
    async fn test_targeted_answers_are_consumed_in_order() {
        let oracle = ScriptedOracle::new();
        oracle.respond_when("DECIDE", Ok("sticky".to_string()));
        oracle.push_when("DECIDE", Ok("first".to_string()));
        oracle.push_when("DECIDE", Ok("second".to_string()));

        assert_eq!(oracle.complete("DECIDE now").await.unwrap(), "first");
        assert_eq!(oracle.complete("DECIDE now").await.unwrap(), "second");
        assert_eq!(oracle.complete("DECIDE now").await.unwrap(), "sticky");
    }
}
