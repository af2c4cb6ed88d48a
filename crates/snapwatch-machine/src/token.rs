//! Pairing-token acquisition and persistence.
//!
//! The machine issues an opaque token on first contact. A human authorizes
//! the pairing on the touchscreen, the agent confirms the token over the
//! same endpoint, and only a confirmed token is written to the store. Stored
//! tokens are reused across runs.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SnapmakerError};

/// Marker substring the machine returns when it refuses a pairing.
const FAILURE_MARKER: &str = "Failed";

/// Wire calls of the pairing handshake.
///
/// [`SnapmakerClient`](crate::SnapmakerClient) implements this over HTTP;
/// tests substitute a scripted device.
#[allow(async_fn_in_trait)]
pub trait PairingApi {
    /// Request a new pending pairing (connect endpoint, no token). Returns
    /// the raw reply body.
    async fn request_token(&self) -> Result<String>;

    /// Submit `token` as a form-encoded confirmation. Returns the raw reply
    /// body.
    async fn confirm_token(&self, token: &str) -> Result<String>;
}

impl<T: PairingApi> PairingApi for &T {
    async fn request_token(&self) -> Result<String> {
        (**self).request_token().await
    }

    async fn confirm_token(&self, token: &str) -> Result<String> {
        (**self).confirm_token(token).await
    }
}

/// Single-slot durable store for the pairing token.
///
/// The file holds exactly the token string, no delimiters or metadata.
/// Exclusive access by one agent process per machine is a precondition of
/// this type; it performs no locking.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored token.
    ///
    /// A missing file is created empty rather than treated as an error, and
    /// empty or whitespace-only content reads as `None`.
    pub fn load(&self) -> Result<Option<String>> {
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| SnapmakerError::TokenStore(e.to_string()))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| SnapmakerError::TokenStore(e.to_string()))?;

        let token = contents.trim();
        if token.is_empty() {
            Ok(None)
        } else {
            Ok(Some(token.to_string()))
        }
    }

    /// Overwrite the stored token in place, truncating any remainder.
    pub fn save(&self, token: &str) -> Result<()> {
        std::fs::write(&self.path, token).map_err(|e| SnapmakerError::TokenStore(e.to_string()))
    }
}

/// Owner of the pairing handshake and the persisted token.
///
/// Guarantees that at most one token is persisted and that nothing is
/// written before the machine has echoed the issued token back.
pub struct TokenManager<A> {
    api: A,
    store: TokenStore,
    override_token: Option<String>,
    /// Wait between issue attempts after a transport failure or echo
    /// mismatch. Intentionally retried without bound: the missing piece is
    /// a human action.
    backoff: Duration,
    /// Wait for the touchscreen authorization before confirming.
    settle: Duration,
}

impl<A: PairingApi> TokenManager<A> {
    /// Manager with the default intervals (20s backoff, 10s settle).
    pub fn new(api: A, store: TokenStore) -> Self {
        Self {
            api,
            store,
            override_token: None,
            backoff: Duration::from_secs(20),
            settle: Duration::from_secs(10),
        }
    }

    /// Use `token` directly instead of the store. Never persisted.
    pub fn with_override(mut self, token: Option<String>) -> Self {
        self.override_token = token;
        self
    }

    /// Replace the retry and settle intervals.
    pub fn with_intervals(mut self, backoff: Duration, settle: Duration) -> Self {
        self.backoff = backoff;
        self.settle = settle;
        self
    }

    /// Return a usable token, running the issue handshake if none is stored.
    ///
    /// An override token or a stored token is announced to the machine
    /// best-effort and returned as-is; only an empty store triggers the
    /// issue protocol.
    pub async fn load_or_create(&self) -> Result<String> {
        if let Some(token) = &self.override_token {
            tracing::debug!("using configured token override");
            self.confirm_existing(token).await;
            return Ok(token.clone());
        }

        match self.store.load()? {
            Some(token) => {
                self.confirm_existing(&token).await;
                Ok(token)
            }
            None => self.issue().await,
        }
    }

    /// Re-announce a previously issued token to the machine.
    ///
    /// The reply is deliberately ignored: a single failed confirmation does
    /// not invalidate a stored token. A token the machine has permanently
    /// forgotten (e.g. after a factory reset) surfaces as an unavailable
    /// status fetch and must be cleared out-of-band.
    async fn confirm_existing(&self, token: &str) {
        if let Err(e) = self.api.confirm_token(token).await {
            tracing::error!(error = %e, "could not confirm stored token");
        }
    }

    /// Issue protocol: request a fresh token, wait for the touchscreen
    /// authorization, confirm, persist.
    async fn issue(&self) -> Result<String> {
        tracing::info!("no token stored, requesting a new pairing");

        loop {
            let body = match self.api.request_token().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(error = %e, "pairing request failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                    continue;
                }
            };

            if body.contains(FAILURE_MARKER) {
                return Err(SnapmakerError::RejectedByDevice(body));
            }

            let token = extract_token(&body)?;

            tracing::info!("please authorize the pairing on the touchscreen");
            tokio::time::sleep(self.settle).await;

            let echoed = match self.api.confirm_token(&token).await {
                Ok(body) => extract_token(&body)?,
                Err(e) => {
                    tracing::warn!(error = %e, "pairing confirmation failed, retrying");
                    tokio::time::sleep(self.backoff).await;
                    continue;
                }
            };

            if echoed == token {
                self.store.save(&token)?;
                tracing::info!(
                    path = %self.store.path().display(),
                    "token confirmed and saved"
                );
                return Ok(token);
            }

            tracing::warn!("machine echoed a different token, retrying");
            tokio::time::sleep(self.backoff).await;
        }
    }
}

/// Pull the `token` field out of a connect reply body.
fn extract_token(body: &str) -> Result<String> {
    #[derive(serde::Deserialize)]
    struct Reply {
        token: String,
    }

    let reply: Reply =
        serde_json::from_str(body).map_err(|e| SnapmakerError::MalformedResponse(e.to_string()))?;
    Ok(reply.token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted device standing in for the machine's connect endpoint.
    #[derive(Default)]
    struct ScriptedDevice {
        issue_replies: Mutex<VecDeque<Result<String>>>,
        confirm_replies: Mutex<VecDeque<Result<String>>>,
        confirmed: Mutex<Vec<String>>,
    }

    impl ScriptedDevice {
        fn on_issue(self, reply: Result<String>) -> Self {
            self.issue_replies.lock().unwrap().push_back(reply);
            self
        }

        fn on_confirm(self, reply: Result<String>) -> Self {
            self.confirm_replies.lock().unwrap().push_back(reply);
            self
        }

        fn confirmed_tokens(&self) -> Vec<String> {
            self.confirmed.lock().unwrap().clone()
        }
    }

    impl PairingApi for ScriptedDevice {
        async fn request_token(&self) -> Result<String> {
            self.issue_replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted issue request")
        }

        async fn confirm_token(&self, token: &str) -> Result<String> {
            self.confirmed.lock().unwrap().push(token.to_string());
            self.confirm_replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted confirm request")
        }
    }

    fn token_body(token: &str) -> Result<String> {
        Ok(format!("{{\"token\":\"{token}\"}}"))
    }

    fn unreachable() -> Result<String> {
        Err(SnapmakerError::Unreachable("connection refused".into()))
    }

    fn manager(device: &ScriptedDevice, store: TokenStore) -> TokenManager<&ScriptedDevice> {
        TokenManager::new(device, store).with_intervals(Duration::ZERO, Duration::ZERO)
    }

    fn store_with(contents: &str) -> (tempfile::TempDir, TokenStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SMtoken.txt");
        std::fs::write(&path, contents).unwrap();
        (dir, TokenStore::new(path))
    }

    #[test]
    fn test_store_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SMtoken.txt");
        let store = TokenStore::new(&path);

        assert_eq!(store.load().unwrap(), None);
        assert!(path.exists());
    }

    #[test]
    fn test_store_save_truncates_longer_content() {
        let (_dir, store) = store_with("a-much-longer-previous-token");
        store.save("ab").unwrap();
        assert_eq!(store.load().unwrap(), Some("ab".to_string()));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "ab");
    }

    #[test]
    fn test_store_trims_whitespace() {
        let (_dir, store) = store_with("  abc123\n");
        assert_eq!(store.load().unwrap(), Some("abc123".to_string()));
    }

    #[tokio::test]
    async fn test_stored_token_survives_confirm_failure() {
        let (_dir, store) = store_with("stored-token");
        let device = ScriptedDevice::default().on_confirm(unreachable());

        let token = manager(&device, store.clone()).load_or_create().await.unwrap();

        assert_eq!(token, "stored-token");
        assert_eq!(device.confirmed_tokens(), vec!["stored-token"]);
        assert_eq!(store.load().unwrap(), Some("stored-token".to_string()));
    }

    #[tokio::test]
    async fn test_stored_token_returned_on_successful_confirm() {
        let (_dir, store) = store_with("stored-token");
        let device = ScriptedDevice::default().on_confirm(token_body("stored-token"));

        let token = manager(&device, store).load_or_create().await.unwrap();
        assert_eq!(token, "stored-token");
    }

    #[tokio::test]
    async fn test_issue_persists_confirmed_token() {
        let (_dir, store) = store_with("");
        let device = ScriptedDevice::default()
            .on_issue(token_body("abc123"))
            .on_confirm(token_body("abc123"));

        let token = manager(&device, store.clone()).load_or_create().await.unwrap();

        assert_eq!(token, "abc123");
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "abc123");
    }

    #[tokio::test]
    async fn test_issue_runs_when_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("SMtoken.txt"));
        let device = ScriptedDevice::default()
            .on_issue(token_body("abc123"))
            .on_confirm(token_body("abc123"));

        let token = manager(&device, store.clone()).load_or_create().await.unwrap();

        assert_eq!(token, "abc123");
        assert_eq!(store.load().unwrap(), Some("abc123".to_string()));
    }

    #[tokio::test]
    async fn test_echo_mismatch_retries_issue() {
        let (_dir, store) = store_with("");
        let device = ScriptedDevice::default()
            .on_issue(token_body("first"))
            .on_issue(token_body("second"))
            .on_confirm(token_body("something-else"))
            .on_confirm(token_body("second"));

        let token = manager(&device, store.clone()).load_or_create().await.unwrap();

        assert_eq!(token, "second");
        assert_eq!(device.confirmed_tokens(), vec!["first", "second"]);
        // Only the confirmed token ever reaches the file.
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_transport_failure_retries_issue() {
        let (_dir, store) = store_with("");
        let device = ScriptedDevice::default()
            .on_issue(unreachable())
            .on_issue(token_body("abc123"))
            .on_confirm(token_body("abc123"));

        let token = manager(&device, store).load_or_create().await.unwrap();
        assert_eq!(token, "abc123");
    }

    #[tokio::test]
    async fn test_failure_marker_is_fatal() {
        let (_dir, store) = store_with("");
        let device =
            ScriptedDevice::default().on_issue(Ok("Failed: machine refused binding".to_string()));

        let result = manager(&device, store.clone()).load_or_create().await;

        assert!(matches!(result, Err(SnapmakerError::RejectedByDevice(_))));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "");
    }

    #[tokio::test]
    async fn test_malformed_issue_reply_is_fatal() {
        let (_dir, store) = store_with("");
        let device = ScriptedDevice::default().on_issue(Ok("<html>not json</html>".to_string()));

        let result = manager(&device, store).load_or_create().await;
        assert!(matches!(result, Err(SnapmakerError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_override_bypasses_store() {
        let (_dir, store) = store_with("stored-token");
        let device = ScriptedDevice::default().on_confirm(token_body("override-token"));

        let token = manager(&device, store.clone())
            .with_override(Some("override-token".to_string()))
            .load_or_create()
            .await
            .unwrap();

        assert_eq!(token, "override-token");
        // The override is never persisted.
        assert_eq!(store.load().unwrap(), Some("stored-token".to_string()));
    }
}
