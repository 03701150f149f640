//! One-time password delivery
//!
//! A one-time password is only useful if it reaches the account owner and
//! nobody else, so it never travels back to whoever asked for it. The
//! gatekeeper hands it to a [`OneTimeDelivery`] instead.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Delivery errors
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Delivery failed: {0}")]
    Failed(String),

    #[error("Delivery I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Out-of-band channel to the owner of an account
#[async_trait]
pub trait OneTimeDelivery: Send + Sync {
    async fn deliver(&self, username: &str, password: &str) -> Result<(), DeliveryError>;
}

/// Keeps delivered passwords in memory, newest last
#[derive(Default)]
pub struct MemoryDelivery {
    sent: Mutex<Vec<(String, String)>>,
}

impl MemoryDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent password delivered to `username`
    pub fn last_for(&self, username: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(user, _)| user == username)
            .map(|(_, password)| password.clone())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OneTimeDelivery for MemoryDelivery {
    async fn deliver(&self, username: &str, password: &str) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .push((username.to_string(), password.to_string()));
        Ok(())
    }
}

/// Mails the password through a local `sendmail`-compatible program.
///
/// The username is the recipient address.
pub struct SendmailDelivery {
    program: PathBuf,
    sender: String,
}

impl SendmailDelivery {
    pub fn new(program: impl Into<PathBuf>, sender: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            sender: sender.into(),
        }
    }

    fn message(&self, recipient: &str, password: &str) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: One time password\r\n\r\n\
             You can use your email ({}) and the following code: {} to login.\r\n",
            self.sender, recipient, recipient, password
        )
    }
}

#[async_trait]
impl OneTimeDelivery for SendmailDelivery {
    async fn deliver(&self, username: &str, password: &str) -> Result<(), DeliveryError> {
        if !username.contains('@') {
            return Err(DeliveryError::Failed(format!(
                "'{}' is not a mail address",
                username
            )));
        }

        let mut child = Command::new(&self.program)
            .arg("-f")
            .arg(&self.sender)
            .arg("--")
            .arg(username)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                DeliveryError::Failed(format!(
                    "Failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(self.message(username, password).as_bytes())
                .await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeliveryError::Failed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        debug!(recipient = %username, "One-time password mailed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_delivery_keeps_latest() {
        let delivery = MemoryDelivery::new();
        delivery.deliver("a@x.org", "one").await.unwrap();
        delivery.deliver("b@x.org", "two").await.unwrap();
        delivery.deliver("a@x.org", "three").await.unwrap();

        assert_eq!(delivery.len(), 3);
        assert_eq!(delivery.last_for("a@x.org").as_deref(), Some("three"));
        assert_eq!(delivery.last_for("c@x.org"), None);
    }

    #[test]
    fn test_sendmail_message_names_recipient() {
        let delivery = SendmailDelivery::new("/usr/sbin/sendmail", "noreply@example.org");
        let message = delivery.message("ola@example.org", "abc123");
        assert!(message.starts_with("From: noreply@example.org\r\nTo: ola@example.org\r\n"));
        assert!(message.contains("following code: abc123 to login"));
    }

    #[tokio::test]
    async fn test_sendmail_requires_address() {
        let delivery = SendmailDelivery::new("/usr/sbin/sendmail", "noreply@example.org");
        assert!(matches!(
            delivery.deliver("ola", "abc123").await,
            Err(DeliveryError::Failed(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sendmail_failure_is_reported() {
        let delivery = SendmailDelivery::new("false", "noreply@example.org");
        assert!(delivery.deliver("ola@example.org", "abc123").await.is_err());
    }
}
