//! Signwall Test Utilities
//!
//! Shared test infrastructure for the signwall workspace:
//! - Fakes for every outbound service trait
//! - A key-value store with failure injection
//! - Fixtures for users and sessions
//! - Proptest generators

use async_trait::async_trait;
use chrono::Utc;
use signwall_core::{
    Artifact, ArtifactRenderer, CaptchaVerdict, CaptchaVerifier, IdentityProvider, Notifier,
    ProviderUser, Session, SignatureReceipt, SignwallResult, StoreError, TokenGrant, UpstreamError,
    UserId,
};
use signwall_storage::{InMemoryKvStore, KeyValueStore};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub use signwall_storage::{InMemorySignatureStore, ManualClock};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// FIXTURES
// ============================================================================

/// An 18-digit provider ID, distinct per `n`.
pub fn discord_id(n: u64) -> UserId {
    format!("{}", 100_000_000_000_000_000u64 + n)
}

/// A provider user with a fresh-style (discriminator "0") account.
pub fn test_user(n: u64) -> ProviderUser {
    ProviderUser {
        id: discord_id(n),
        username: format!("user{}", n),
        discriminator: "0".to_string(),
        avatar_hash: None,
    }
}

/// A session whose tokens are derived from the user ID.
pub fn test_session(user_id: &str) -> Session {
    Session {
        refresh_token: format!("refresh-{}", user_id),
        access_token: format!("access-{}", user_id),
        user_id: user_id.to_string(),
    }
}

// ============================================================================
// IDENTITY PROVIDER
// ============================================================================

#[derive(Default)]
struct IdentityState {
    codes: HashMap<String, TokenGrant>,
    tokens: HashMap<String, ProviderUser>,
    revoked: HashSet<String>,
    outage: Option<UpstreamError>,
}

/// In-memory OAuth2 provider.
///
/// Codes registered with [`FakeIdentityProvider::register_login`] exchange
/// for `access-<user_id>` tokens; unknown or revoked tokens answer 401.
#[derive(Default)]
pub struct FakeIdentityProvider {
    state: Mutex<IdentityState>,
    user_lookups: AtomicUsize,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `code` exchangeable for a session belonging to `user`.
    pub fn register_login(&self, code: &str, user: &ProviderUser) -> TokenGrant {
        let session = test_session(&user.id);
        let grant = TokenGrant {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token,
            expires_in: Some(604_800),
            token_type: Some("Bearer".to_string()),
        };
        let mut state = lock(&self.state);
        state.codes.insert(code.to_string(), grant.clone());
        state.tokens.insert(session.access_token, user.clone());
        grant
    }

    /// Accept `access_token` as belonging to `user`.
    pub fn register_token(&self, access_token: &str, user: &ProviderUser) {
        let mut state = lock(&self.state);
        state.revoked.remove(access_token);
        state.tokens.insert(access_token.to_string(), user.clone());
    }

    /// Simulate the user removing the application.
    pub fn revoke(&self, access_token: &str) {
        lock(&self.state).revoked.insert(access_token.to_string());
    }

    /// Fail every call with `error` until cleared with `None`.
    pub fn set_outage(&self, error: Option<UpstreamError>) {
        lock(&self.state).outage = error;
    }

    /// Number of `current_user` calls made so far.
    pub fn user_lookups(&self) -> usize {
        self.user_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn exchange_code(&self, code: &str) -> SignwallResult<TokenGrant> {
        let state = lock(&self.state);
        if let Some(error) = &state.outage {
            return Err(error.clone().into());
        }
        state.codes.get(code).cloned().ok_or_else(|| {
            UpstreamError::Status {
                service: "discord".to_string(),
                status: 400,
                message: "invalid_grant".to_string(),
            }
            .into()
        })
    }

    async fn current_user(&self, access_token: &str) -> SignwallResult<ProviderUser> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        let state = lock(&self.state);
        if let Some(error) = &state.outage {
            return Err(error.clone().into());
        }
        if state.revoked.contains(access_token) {
            return Err(unauthorized());
        }
        state
            .tokens
            .get(access_token)
            .cloned()
            .ok_or_else(unauthorized)
    }
}

fn unauthorized() -> signwall_core::SignwallError {
    UpstreamError::Unauthorized {
        service: "discord".to_string(),
    }
    .into()
}

// ============================================================================
// RENDERER
// ============================================================================

/// Renderer that counts calls and can be slowed down or broken.
///
/// The Nth successful render returns eight bytes of value N, so tests can
/// tell renders apart.
#[derive(Default)]
pub struct FakeRenderer {
    calls: AtomicUsize,
    failing: AtomicBool,
    latency: Mutex<Duration>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        let renderer = Self::default();
        *lock(&renderer.latency) = latency;
        renderer
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactRenderer for FakeRenderer {
    async fn render(&self) -> SignwallResult<Artifact> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::Status {
                service: "renderer".to_string(),
                status: 503,
                message: "renderer down".to_string(),
            }
            .into());
        }
        Ok(Artifact::png(vec![n as u8; 8], Utc::now()))
    }
}

// ============================================================================
// CAPTCHA
// ============================================================================

/// Captcha verifier with a fixed verdict that records the solutions it saw.
pub struct FakeCaptcha {
    accept: bool,
    seen: Mutex<Vec<String>>,
}

impl FakeCaptcha {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn solutions(&self) -> Vec<String> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl CaptchaVerifier for FakeCaptcha {
    async fn verify(&self, solution: &str) -> SignwallResult<CaptchaVerdict> {
        lock(&self.seen).push(solution.to_string());
        Ok(CaptchaVerdict {
            success: self.accept,
            errors: if self.accept {
                Vec::new()
            } else {
                vec!["solution_invalid".to_string()]
            },
        })
    }
}

// ============================================================================
// NOTIFIER
// ============================================================================

/// Notifier that records `(user_id, position)` for every delivery.
pub struct RecordingNotifier {
    name: &'static str,
    fail: bool,
    deliveries: Mutex<Vec<(UserId, i64)>>,
}

impl RecordingNotifier {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fail: false,
            deliveries: Mutex::new(Vec::new()),
        }
    }

    /// Records the attempt, then fails.
    pub fn failing(name: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn deliveries(&self) -> Vec<(UserId, i64)> {
        lock(&self.deliveries).clone()
    }

    /// Poll until at least `count` deliveries arrived or `timeout` elapsed.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if lock(&self.deliveries).len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn signature_created(
        &self,
        user: &ProviderUser,
        receipt: &SignatureReceipt,
    ) -> SignwallResult<()> {
        lock(&self.deliveries).push((user.id.clone(), receipt.position));
        if self.fail {
            return Err(UpstreamError::Transport {
                service: self.name.to_string(),
                reason: "connection refused".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// FAILURE INJECTION
// ============================================================================

/// [`InMemoryKvStore`] wrapper that fails reads or writes on demand.
#[derive(Default)]
pub struct FlakyKvStore {
    inner: InMemoryKvStore,
    fail_reads: AtomicBool,
    failing_writes: Mutex<HashSet<String>>,
}

impl FlakyKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrapping(inner: InMemoryKvStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn inner(&self) -> &InMemoryKvStore {
        &self.inner
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make writes to `key` fail until [`FlakyKvStore::heal_writes`].
    pub fn fail_writes_to(&self, key: &str) {
        lock(&self.failing_writes).insert(key.to_string());
    }

    pub fn heal_writes(&self) {
        lock(&self.failing_writes).clear();
    }

    fn check_write(&self, key: &str) -> SignwallResult<()> {
        if lock(&self.failing_writes).contains(key) {
            return Err(StoreError::backend("set", format!("injected failure for {}", key)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyKvStore {
    async fn get(&self, key: &str) -> SignwallResult<Option<Vec<u8>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "injected read failure".to_string(),
            }
            .into());
        }
        self.inner.get(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> SignwallResult<()> {
        self.check_write(key)?;
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn set_persistent(&self, key: &str, value: &[u8]) -> SignwallResult<()> {
        self.check_write(key)?;
        self.inner.set_persistent(key, value).await
    }

    async fn delete(&self, key: &str) -> SignwallResult<()> {
        self.check_write(key)?;
        self.inner.delete(key).await
    }

    async fn ping(&self) -> SignwallResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "injected read failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Well-formed provider IDs (16-20 digits, no leading zero).
    pub fn arb_provider_id() -> impl Strategy<Value = String> {
        "[1-9][0-9]{15,19}"
    }

    /// Strings that are never valid provider IDs.
    pub fn arb_malformed_referrer() -> impl Strategy<Value = String> {
        prop_oneof![
            "[0-9]{1,15}",
            "[0-9]{21,30}",
            "[a-z][a-z0-9]{0,20}",
            "[0-9]{8}-[0-9]{8}",
        ]
    }

    pub fn arb_user() -> impl Strategy<Value = ProviderUser> {
        (arb_provider_id(), "[a-z][a-z0-9_]{1,31}", prop_oneof![Just("0".to_string()), "[0-9]{4}"])
            .prop_map(|(id, username, discriminator)| ProviderUser {
                id,
                username,
                discriminator,
                avatar_hash: None,
            })
    }

    pub fn arb_session() -> impl Strategy<Value = Session> {
        (arb_provider_id(), "[A-Za-z0-9]{10,40}", "[A-Za-z0-9]{10,40}").prop_map(
            |(user_id, access_token, refresh_token)| Session {
                refresh_token,
                access_token,
                user_id,
            },
        )
    }
}
