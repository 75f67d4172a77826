//! Bearer token sources.
//!
//! The client never reads cookies, files or the keyring itself; it asks a
//! [`CredentialProvider`] for the current token and tells it when a token was
//! rejected. Refreshing or re-prompting is the provider's business.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use keyring::Entry;
use tracing::{debug, warn};

pub const KEYRING_SERVICE: &str = "toolwire";
pub const KEYRING_ACCOUNT: &str = "access_token";
pub const TOKEN_ENV_VAR: &str = "TOOLWIRE_TOKEN";

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The bearer token to send, if one is available.
    async fn token(&self) -> Option<String>;

    /// Called when a server answered 401 to a request carrying our token.
    async fn on_unauthorized(&self);
}

fn non_blank(token: Option<String>) -> Option<String> {
    token.filter(|token| !token.trim().is_empty())
}

#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn token(&self) -> Option<String> {
        non_blank(self.token.clone())
    }

    async fn on_unauthorized(&self) {
        debug!("Static token was rejected by the server");
    }
}

/// Reads the token from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(TOKEN_ENV_VAR)
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn token(&self) -> Option<String> {
        non_blank(std::env::var(&self.var).ok())
    }

    async fn on_unauthorized(&self) {
        warn!(var = %self.var, "Token from environment was rejected by the server");
    }
}

/// A stored-token operation that the platform keyring refused.
#[derive(Debug)]
pub struct TokenStoreError {
    action: &'static str,
    source: keyring::Error,
}

impl TokenStoreError {
    fn new(action: &'static str, source: keyring::Error) -> Self {
        Self { action, source }
    }

    /// Locked or unreachable credential backends may succeed on a later try;
    /// anything else (bad encoding, ambiguous entries) will not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.source,
            keyring::Error::PlatformFailure(_) | keyring::Error::NoStorageAccess(_)
        )
    }
}

impl fmt::Display for TokenStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_transient() {
            write!(
                f,
                "Keyring unavailable, could not {} token: {}",
                self.action, self.source
            )
        } else {
            write!(f, "Could not {} token in keyring: {}", self.action, self.source)
        }
    }
}

impl Error for TokenStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Clone)]
pub struct KeyringCredentials {
    service: String,
    account: String,
}

impl Default for KeyringCredentials {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE, KEYRING_ACCOUNT)
    }
}

impl KeyringCredentials {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self, action: &'static str) -> Result<Entry, TokenStoreError> {
        Entry::new(&self.service, &self.account).map_err(|err| TokenStoreError::new(action, err))
    }

    pub fn get_token(&self) -> Result<Option<String>, TokenStoreError> {
        match self.entry("read")?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(TokenStoreError::new("read", err)),
        }
    }

    pub fn set_token(&self, token: &str) -> Result<(), TokenStoreError> {
        self.entry("store")?
            .set_password(token)
            .map_err(|err| TokenStoreError::new("store", err))
    }

    /// `Ok(false)` when there was no token to remove.
    pub fn remove_token(&self) -> Result<bool, TokenStoreError> {
        match self.entry("remove")?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(TokenStoreError::new("remove", err)),
        }
    }
}

#[async_trait]
impl CredentialProvider for KeyringCredentials {
    async fn token(&self) -> Option<String> {
        match self.get_token() {
            Ok(token) => non_blank(token),
            Err(err) => {
                warn!(
                    service = %self.service,
                    transient = err.is_transient(),
                    error = %err,
                    "Token lookup failed; continuing without a stored token"
                );
                None
            }
        }
    }

    async fn on_unauthorized(&self) {
        warn!(
            service = %self.service,
            "Stored token was rejected; run `toolwire auth` to replace it"
        );
    }
}

/// Asks each provider in order; the first token wins.
#[derive(Clone, Default)]
pub struct CredentialChain {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl CredentialChain {
    pub fn new(providers: Vec<Arc<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    pub fn push(&mut self, provider: Arc<dyn CredentialProvider>) {
        self.providers.push(provider);
    }
}

#[async_trait]
impl CredentialProvider for CredentialChain {
    async fn token(&self) -> Option<String> {
        for provider in &self.providers {
            if let Some(token) = provider.token().await {
                return Some(token);
            }
        }
        None
    }

    async fn on_unauthorized(&self) {
        for provider in &self.providers {
            provider.on_unauthorized().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        token: Option<String>,
        rejected: AtomicUsize,
    }

    #[async_trait]
    impl CredentialProvider for Counting {
        async fn token(&self) -> Option<String> {
            self.token.clone()
        }

        async fn on_unauthorized(&self) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn blank_static_token_counts_as_missing() {
        assert_eq!(StaticCredentials::new("   ").token().await, None);
        assert_eq!(StaticCredentials::anonymous().token().await, None);
        assert_eq!(
            StaticCredentials::new("abc").token().await.as_deref(),
            Some("abc")
        );
    }

    #[tokio::test]
    async fn env_credentials_read_at_call_time() {
        let var = "TOOLWIRE_TEST_TOKEN_ENV_CREDENTIALS";
        let provider = EnvCredentials::new(var);
        std::env::remove_var(var);
        assert_eq!(provider.token().await, None);
        std::env::set_var(var, "from-env");
        assert_eq!(provider.token().await.as_deref(), Some("from-env"));
        std::env::remove_var(var);
    }

    #[test]
    fn token_store_errors_classify_backend_failures() {
        let locked = TokenStoreError::new(
            "read",
            keyring::Error::NoStorageAccess("locked".to_string().into()),
        );
        assert!(locked.is_transient());
        assert!(locked
            .to_string()
            .starts_with("Keyring unavailable, could not read token"));

        let garbled = TokenStoreError::new("store", keyring::Error::BadEncoding(vec![0xff]));
        assert!(!garbled.is_transient());
        assert!(garbled.to_string().starts_with("Could not store token in keyring"));
        assert!(garbled.source().is_some());
    }

    #[tokio::test]
    async fn chain_returns_first_token_and_notifies_all() {
        let empty = Arc::new(Counting::default());
        let second = Arc::new(Counting {
            token: Some("second".to_string()),
            ..Counting::default()
        });
        let providers: Vec<Arc<dyn CredentialProvider>> = vec![empty.clone(), second.clone()];
        let chain = CredentialChain::new(providers);

        assert_eq!(chain.token().await.as_deref(), Some("second"));

        chain.on_unauthorized().await;
        assert_eq!(empty.rejected.load(Ordering::SeqCst), 1);
        assert_eq!(second.rejected.load(Ordering::SeqCst), 1);
    }
}
