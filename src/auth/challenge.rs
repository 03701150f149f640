//! Challenge/response (Sicas) verification

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Challenge service errors
#[derive(Error, Debug)]
pub enum ChallengeError {
    #[error("Challenge service unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid challenge service response: {0}")]
    InvalidResponse(String),
}

/// Answer from the challenge service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeVerdict {
    pub success: bool,
    #[serde(default)]
    pub reason: String,
}

impl ChallengeVerdict {
    pub fn accepted() -> Self {
        Self {
            success: true,
            reason: String::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: reason.into(),
        }
    }
}

/// External service that checks a response against an issued challenge
#[async_trait]
pub trait ChallengeValidator: Send + Sync {
    async fn validate(
        &self,
        challenge_id: &str,
        response: &str,
    ) -> Result<ChallengeVerdict, ChallengeError>;
}

/// In-process validator holding issued challenges; each is answerable once
#[derive(Default)]
pub struct MemoryChallengeValidator {
    challenges: RwLock<HashMap<String, String>>,
}

impl MemoryChallengeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the expected answer for `challenge_id`
    pub fn issue(&self, challenge_id: impl Into<String>, answer: impl Into<String>) {
        self.challenges
            .write()
            .insert(challenge_id.into(), answer.into());
    }
}

#[async_trait]
impl ChallengeValidator for MemoryChallengeValidator {
    async fn validate(
        &self,
        challenge_id: &str,
        response: &str,
    ) -> Result<ChallengeVerdict, ChallengeError> {
        let Some(answer) = self.challenges.write().remove(challenge_id) else {
            return Ok(ChallengeVerdict::rejected("unknown challenge"));
        };

        if crate::crypto::constant_time_eq(&answer, response) {
            Ok(ChallengeVerdict::accepted())
        } else {
            Ok(ChallengeVerdict::rejected("wrong answer"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_challenges_are_single_use() {
        let validator = MemoryChallengeValidator::new();
        validator.issue("c1", "x7k");

        assert!(validator.validate("c1", "x7k").await.unwrap().success);
        let again = validator.validate("c1", "x7k").await.unwrap();
        assert!(!again.success);
        assert_eq!(again.reason, "unknown challenge");
    }

    #[tokio::test]
    async fn test_wrong_answer_burns_challenge() {
        let validator = MemoryChallengeValidator::new();
        validator.issue("c1", "x7k");

        assert!(!validator.validate("c1", "nope").await.unwrap().success);
        assert!(!validator.validate("c1", "x7k").await.unwrap().success);
    }
}
