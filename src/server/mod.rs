//! Line-delimited JSON server
//!
//! Reads one [`Envelope`] per line and writes one [`Reply`] per line.
//! Requests on one connection are handled in order.

mod types;

pub use types::{Envelope, Reply, Request};

use crate::auth::Gatekeeper;
use crate::{ErrorKind, Outcome};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

/// Serves a [`Gatekeeper`] over any line-oriented byte stream
pub struct BouncerServer {
    gatekeeper: Arc<Gatekeeper>,
}

impl BouncerServer {
    pub fn new(gatekeeper: Arc<Gatekeeper>) -> Self {
        Self { gatekeeper }
    }

    /// Run the server over stdio
    pub async fn run_stdio(&self) -> std::io::Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.run(stdin, stdout).await
    }

    /// Serve until `reader` reaches EOF
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        info!("Bouncer server starting");

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let reply = self.handle_line(trimmed).await;
            let encoded = serde_json::to_string(&reply)?;
            writer.write_all(encoded.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        info!("Bouncer server shutting down");
        Ok(())
    }

    /// Decode and dispatch one request line
    pub async fn handle_line(&self, line: &str) -> Reply {
        let envelope: Envelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "Failed to parse request");
                return Reply {
                    id: None,
                    outcome: Outcome::Error {
                        kind: ErrorKind::InvalidRequest,
                        message: format!("Invalid request: {}", e),
                    },
                };
            }
        };

        debug!(op = envelope.request.op(), "Handling request");
        Reply {
            id: envelope.id,
            outcome: self.dispatch(envelope.request).await,
        }
    }

    /// Run one request against the gatekeeper
    pub async fn dispatch(&self, request: Request) -> Outcome {
        let gatekeeper = &self.gatekeeper;
        let result = match request {
            Request::Authenticate { authorization } => gatekeeper
                .authenticate(authorization.as_deref())
                .await
                .map(|issued| Outcome::Token {
                    token: issued.token,
                    revalidation_code: Some(issued.revalidation_code),
                }),
            Request::Authorize {
                authorization,
                system,
            } => gatekeeper
                .authorize(authorization.as_deref(), &system)
                .await
                .map(|rights| Outcome::Rights { rights }),
            Request::Revalidate {
                authorization,
                code,
            } => gatekeeper
                .revalidate(authorization.as_deref(), &code)
                .await
                .map(|claims| Outcome::Data {
                    data: json!({
                        "user": claims.sub,
                        "systems": claims.systems,
                        "expires_at": claims.expires_at(),
                    }),
                }),
            Request::Logout { authorization } => gatekeeper
                .logout(authorization.as_deref())
                .await
                .map(|()| Outcome::Data {
                    data: json!({ "logged_out": true }),
                }),
            Request::Share {
                authorization,
                systems,
            } => gatekeeper
                .share(authorization.as_deref(), &systems)
                .await
                .map(|keys| Outcome::Data {
                    data: json!({
                        "keys": keys
                            .iter()
                            .map(|k| json!({ "system": k.system, "key": k.to_string() }))
                            .collect::<Vec<_>>()
                    }),
                }),
            Request::Unshare { authorization, key } => gatekeeper
                .unshare(authorization.as_deref(), key.as_deref())
                .await
                .map(|()| Outcome::Data {
                    data: json!({ "revoked": true }),
                }),
            Request::Redeem { key, system } => gatekeeper
                .redeem(&key, &system)
                .await
                .map(|rights| Outcome::Rights { rights }),
            Request::Challenge { authorization } => gatekeeper
                .verify_challenge(authorization.as_deref())
                .await
                .map(|verdict| Outcome::Data {
                    data: json!({ "success": verdict.success, "reason": verdict.reason }),
                }),
            Request::Onetime { username } => gatekeeper
                .issue_one_time_password(&username)
                .await
                .map(|()| Outcome::Data {
                    data: json!({ "sent": true }),
                }),
        };

        result.unwrap_or_else(Outcome::from)
    }
}
