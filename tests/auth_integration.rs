//! Integration tests for the gatekeeper
//!
//! Tests the full flow: directory document -> gatekeeper -> tokens,
//! access decisions and capability keys

use base64::{engine::general_purpose::STANDARD, Engine};
use bouncer::auth::Gatekeeper;
use bouncer::config::Config;
use bouncer::crypto::{password_hash, HashAlgorithm};
use bouncer::directory::MemoryDirectory;
use bouncer::storage::{keys, MemorySecretStore, SecretStore};
use bouncer::token::SigningAlgorithm;
use bouncer::{AuthError, ErrorKind, Outcome};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

const ALICE: &str = "alice@example.org";
const BOB: &str = "bob@example.org";

fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
}

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Directory document as an operator would write it
fn directory_document() -> String {
    json!({
        "users": [
            {
                "_id": ALICE,
                "password": password_hash(HashAlgorithm::Sha256, "wonderland", "a1"),
                "hash": "sha256",
                "salt": "a1",
                "active": true,
                "groups": ["analysts", "auditors"],
                "systems": [
                    { "uri": "https://data.example.org/reports/*", "rights": ["read", "write"] }
                ]
            },
            {
                "_id": BOB,
                "password": password_hash(HashAlgorithm::Sha512, "builder", ""),
                "active": false,
                "systems": [{ "uri": "https://data.example.org/*", "rights": "admin" }]
            }
        ],
        "groups": [
            {
                "_id": "analysts",
                "systems": [
                    { "uri": "https://data.example.org/reports/*", "rights": ["read"] },
                    { "uri": "https://data.example.org/raw/*", "rights": ["read"] }
                ]
            },
            {
                "_id": "auditors",
                "systems": [
                    { "uri": "https://data.example.org/raw/2024", "rights": ["audit"] }
                ]
            }
        ]
    })
    .to_string()
}

async fn setup(config: Config) -> (Arc<MemorySecretStore>, Gatekeeper) {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(directory_document().as_bytes()).unwrap();

    let directory = MemoryDirectory::load(file.path()).await.unwrap();
    let store = Arc::new(MemorySecretStore::new());
    let gatekeeper = Gatekeeper::new(&config, Arc::new(directory), store.clone());
    (store, gatekeeper)
}

/// Valid Basic credentials get a token; a flipped password does not
#[tokio::test]
async fn test_password_login() {
    let (store, gatekeeper) = setup(Config::default()).await;

    let issued = gatekeeper
        .authenticate(Some(&basic(ALICE, "wonderland")))
        .await
        .unwrap();
    assert!(store.get(&keys::secret(ALICE)).await.unwrap().is_some());
    assert_eq!(
        store.get(&keys::revalidation(ALICE)).await.unwrap(),
        Some(issued.revalidation_code.clone())
    );

    let result = gatekeeper
        .authenticate(Some(&basic(ALICE, "dnalrednow")))
        .await;
    assert!(matches!(result, Err(AuthError::InvalidPassword)));
}

/// A disabled account is refused even with the correct password
#[tokio::test]
async fn test_disabled_account_with_correct_password() {
    let (_, gatekeeper) = setup(Config::default()).await;
    let result = gatekeeper.authenticate(Some(&basic(BOB, "builder"))).await;
    assert!(matches!(result, Err(AuthError::AccountDisabled)));
}

/// Deleting the cached secret is a forced logout
#[tokio::test]
async fn test_secret_deletion_invalidates_token() {
    let (store, gatekeeper) = setup(Config::default()).await;
    let issued = gatekeeper
        .authenticate(Some(&basic(ALICE, "wonderland")))
        .await
        .unwrap();
    let header = bearer(&issued.token);

    assert!(gatekeeper
        .authorize(Some(&header), "https://data.example.org/raw/x")
        .await
        .is_ok());

    store.delete(&keys::secret(ALICE)).await.unwrap();
    let result = gatekeeper
        .authorize(Some(&header), "https://data.example.org/raw/x")
        .await;
    assert!(matches!(result, Err(AuthError::InvalidToken(_))));
}

/// Direct grants override group grants; exact grants beat wildcards
#[tokio::test]
async fn test_access_list_precedence() {
    let (_, gatekeeper) = setup(Config::default()).await;
    let issued = gatekeeper
        .authenticate(Some(&basic(ALICE, "wonderland")))
        .await
        .unwrap();
    let header = bearer(&issued.token);

    let reports = issued
        .claims
        .systems
        .iter()
        .filter(|e| e.uri == "https://data.example.org/reports/*")
        .collect::<Vec<_>>();
    assert_eq!(reports.len(), 1);

    let rights = gatekeeper
        .authorize(Some(&header), "https://data.example.org/reports/q3")
        .await
        .unwrap();
    assert_eq!(rights, json!(["read", "write"]));

    let rights = gatekeeper
        .authorize(Some(&header), "https://data.example.org/raw/2024")
        .await
        .unwrap();
    assert_eq!(rights, json!(["audit"]));

    let rights = gatekeeper
        .authorize(Some(&header), "https://data.example.org/raw/2023")
        .await
        .unwrap();
    assert_eq!(rights, json!(["read"]));
}

/// Wildcards need a segment at the `*` position and never cross hosts
#[tokio::test]
async fn test_wildcard_boundaries_and_hosts() {
    let (_, gatekeeper) = setup(Config::default()).await;
    let header = basic(ALICE, "wonderland");

    for system in [
        "https://data.example.org/raw",
        "https://data.example.org/other/raw/x",
        "https://data.example.net/raw/x",
        "https://evil.example.org/reports/q3",
    ] {
        let result = gatekeeper.authorize(Some(&header), system).await;
        assert!(matches!(result, Err(AuthError::Forbidden)), "{}", system);
    }

    assert!(gatekeeper
        .authorize(Some(&header), "https://data.example.org/raw/")
        .await
        .is_ok());
    assert!(gatekeeper
        .authorize(Some(&header), "http://data.example.org/raw/x")
        .await
        .is_ok());
}

/// Each successful check slides the idle window
#[tokio::test(start_paused = true)]
async fn test_sliding_session() {
    let mut config = Config::default();
    config.token.expiration = Duration::from_secs(10);
    let (_, gatekeeper) = setup(config).await;

    let issued = gatekeeper
        .authenticate(Some(&basic(ALICE, "wonderland")))
        .await
        .unwrap();
    let header = bearer(&issued.token);
    let system = "https://data.example.org/raw/x";

    tokio::time::advance(Duration::from_secs(8)).await;
    assert!(gatekeeper.authorize(Some(&header), system).await.is_ok());

    // 16s after login, past the original deadline
    tokio::time::advance(Duration::from_secs(8)).await;
    assert!(gatekeeper.authorize(Some(&header), system).await.is_ok());

    tokio::time::advance(Duration::from_secs(11)).await;
    assert!(matches!(
        gatekeeper.authorize(Some(&header), system).await,
        Err(AuthError::InvalidToken(_))
    ));
}

/// Refreshing a token keeps the login's absolute ceiling
#[tokio::test]
async fn test_refresh_keeps_session_ceiling() {
    let mut config = Config::default();
    config.token.max_session = Duration::from_secs(3600);
    let (_, gatekeeper) = setup(config).await;

    let login = gatekeeper
        .authenticate(Some(&basic(ALICE, "wonderland")))
        .await
        .unwrap();
    let mut current = login.clone();
    for _ in 0..3 {
        current = gatekeeper
            .authenticate(Some(&bearer(&current.token)))
            .await
            .unwrap();
        assert_eq!(current.claims.auth_time, login.claims.auth_time);
        assert_eq!(current.expires_at, login.expires_at);
    }
}

/// Capability keys grant read access to exactly the shared system
#[tokio::test]
async fn test_capability_delegation() {
    let (_, gatekeeper) = setup(Config::default()).await;
    let header = basic(ALICE, "wonderland");

    let keys = gatekeeper
        .share(
            Some(&header),
            &["https://data.example.org/reports/q3".to_string()],
        )
        .await
        .unwrap();
    let compound = keys[0].to_string();

    let rights = gatekeeper
        .redeem(&compound, "https://data.example.org/reports/q3")
        .await
        .unwrap();
    assert_eq!(rights, json!(["read"]));

    assert!(matches!(
        gatekeeper
            .redeem(&compound, "https://data.example.org/reports/q4")
            .await,
        Err(AuthError::Forbidden)
    ));

    let (id, _) = compound.split_once(' ').unwrap();
    assert!(matches!(
        gatekeeper
            .redeem(
                &format!("{} {}", id, "0".repeat(40)),
                "https://data.example.org/reports/q3"
            )
            .await,
        Err(AuthError::InvalidCapabilityKey)
    ));
}

/// Unsigned tokens only exist when explicitly enabled
#[tokio::test]
async fn test_unsigned_tokens_are_opt_in() {
    let mut config = Config::parse("[token]\nalgorithm = \"none\"\n").unwrap();
    let (_, gatekeeper) = setup(config.clone()).await;
    assert_eq!(gatekeeper.tokens().algorithm(), SigningAlgorithm::Hs256);

    config.token.allow_unsigned = true;
    let (_, gatekeeper) = setup(config).await;
    let issued = gatekeeper
        .authenticate(Some(&basic(ALICE, "wonderland")))
        .await
        .unwrap();
    assert!(issued.token.ends_with('.'));
    assert!(gatekeeper
        .authorize(Some(&bearer(&issued.token)), "https://data.example.org/raw/x")
        .await
        .is_ok());
}

/// Errors reaching the caller never carry collaborator detail
#[tokio::test]
async fn test_error_outcomes() {
    let (_, gatekeeper) = setup(Config::default()).await;

    let err = gatekeeper.authorize(None, "https://x.org/").await.unwrap_err();
    match Outcome::from(err) {
        Outcome::Error { kind, message } => {
            assert_eq!(kind, ErrorKind::MissingCredentials);
            assert_eq!(message, "Missing credentials");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}
