//! Session lifecycle against the identity provider and the canister
//!
//! Every transition-starting call (`initialize`, `login`, `logout`,
//! `retry_connection`) bumps an epoch under the lock. Async work never holds
//! the lock; its result is applied only if the epoch is still the one it
//! started with and the manager has not been shut down. A logout therefore
//! always wins over a login or retry still in flight.

use super::backoff::ExponentialBackoff;
use super::state::SessionState;
use crate::backend::{BackendConnector, CanisterBackend, Identity, IdentityProvider, Principal};
use crate::config::SessionConfig;
use crate::errors::{ConnectionError, XonoraError, XonoraResult};
use crate::logger::{self, LogTag};
use crate::rate_limiter::RateLimiter;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Identifier used for the local login budget
const LOGIN_IDENTIFIER: &str = "local";
const LOGIN_OPERATION: &str = "login";

struct Binding {
    identity: Identity,
    backend: Arc<dyn CanisterBackend>,
}

struct Inner {
    state: SessionState,
    binding: Option<Binding>,
    epoch: u64,
    retry_exhausted: bool,
}

pub struct SessionManager {
    config: SessionConfig,
    provider: Arc<dyn IdentityProvider>,
    connector: Arc<dyn BackendConnector>,
    auth_limiter: Arc<RateLimiter>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SessionState>,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        provider: Arc<dyn IdentityProvider>,
        connector: Arc<dyn BackendConnector>,
        auth_limiter: Arc<RateLimiter>,
        shutdown: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            provider,
            connector,
            auth_limiter,
            inner: Mutex::new(Inner {
                state: SessionState::Disconnected,
                binding: None,
                epoch: 0,
                retry_exhausted: false,
            }),
            state_tx,
            shutdown,
        }
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Resume an existing provider session if there is one
    pub async fn initialize(&self) -> SessionState {
        let epoch = self.begin(SessionState::Connecting);
        logger::info(LogTag::Session, "Initializing session");

        match self.try_resume().await {
            Ok(Some(binding)) => {
                let principal = binding.identity.principal.clone();
                if self.commit_connected(epoch, binding) {
                    logger::info(
                        LogTag::Session,
                        &format!("Resumed session for {}", principal.to_display_short()),
                    );
                }
            }
            Ok(None) => {
                self.commit_disconnected(epoch);
                logger::debug(LogTag::Session, "No existing session to resume");
            }
            Err(e) => {
                logger::warning(LogTag::Session, &format!("Session resume failed: {}", e));
                self.commit_error(epoch, &e);
            }
        }

        self.state()
    }

    /// Run the interactive login flow and bind a request client
    pub async fn login(&self) -> XonoraResult<Principal> {
        let gate = self.auth_limiter.is_allowed(LOGIN_IDENTIFIER, LOGIN_OPERATION);
        if !gate.allowed {
            let retry_after_secs = gate.retry_after_secs().unwrap_or(1);
            logger::warning(
                LogTag::Session,
                &format!("Login blocked by rate limit, retry in {}s", retry_after_secs),
            );
            return Err(XonoraError::RateLimit {
                operation: LOGIN_OPERATION.to_string(),
                retry_after_secs,
            });
        }

        let epoch = self.begin(SessionState::Connecting);
        logger::info(LogTag::Session, "Starting login");

        let login = match tokio::time::timeout(self.config.login_timeout(), self.provider.login()).await
        {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::identity("Login timed out")),
        };
        let outcome = match login {
            Ok(identity) => self.bind(identity).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(binding) => {
                self.auth_limiter
                    .record_request(LOGIN_IDENTIFIER, LOGIN_OPERATION, true);
                let principal = binding.identity.principal.clone();
                if !self.commit_connected(epoch, binding) {
                    logger::debug(LogTag::Session, "Login result discarded, session moved on");
                    return Err(XonoraError::NotConnected);
                }
                logger::info(
                    LogTag::Session,
                    &format!("Logged in as {}", principal.to_display_short()),
                );
                Ok(principal)
            }
            Err(e) => {
                self.auth_limiter
                    .record_request(LOGIN_IDENTIFIER, LOGIN_OPERATION, false);
                logger::warning(LogTag::Session, &format!("Login failed: {}", e));
                self.commit_error(epoch, &e);
                Err(e.into())
            }
        }
    }

    /// Tear down identity and client; always ends `Disconnected`
    pub async fn logout(&self) {
        {
            let mut inner = self.inner.lock();
            inner.epoch += 1;
            inner.binding = None;
            inner.retry_exhausted = false;
            inner.state = SessionState::Disconnected;
            self.publish(&inner);
        }

        if let Err(e) = self.provider.logout().await {
            logger::warning(
                LogTag::Session,
                &format!("Identity provider logout failed: {}", e),
            );
        }
        logger::info(LogTag::Session, "Logged out");
    }

    /// Reconnect with exponential backoff
    ///
    /// Waits base, 2x base, 4x base ... (capped) before each attempt. After
    /// the configured number of attempts the session settles in a terminal
    /// error that `resync_once` will not retry on its own.
    pub async fn retry_connection(&self) -> XonoraResult<Principal> {
        let epoch = self.begin(SessionState::Connecting);
        let backoff =
            ExponentialBackoff::new(self.config.retry_base_delay(), self.config.retry_max_delay());
        let attempts = self.config.max_retry_attempts.max(1);
        let mut last_error = ConnectionError::unknown("No connection attempt made");

        for attempt in 1..=attempts {
            let delay = backoff.next_delay();
            logger::debug(
                LogTag::Session,
                &format!(
                    "Connection attempt {}/{} in {}ms",
                    attempt,
                    attempts,
                    delay.as_millis()
                ),
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(XonoraError::NotConnected),
                _ = tokio::time::sleep(delay) => {}
            }
            if !self.is_current(epoch) {
                logger::debug(LogTag::Session, "Retry abandoned, session moved on");
                return Err(XonoraError::NotConnected);
            }

            match self.try_resume().await {
                Ok(Some(binding)) => {
                    let principal = binding.identity.principal.clone();
                    if !self.commit_connected(epoch, binding) {
                        return Err(XonoraError::NotConnected);
                    }
                    logger::info(
                        LogTag::Session,
                        &format!("Reconnected on attempt {}/{}", attempt, attempts),
                    );
                    return Ok(principal);
                }
                Ok(None) => {
                    logger::info(LogTag::Session, "Provider session gone, stopping retry");
                    self.commit_disconnected(epoch);
                    return Err(XonoraError::NotConnected);
                }
                Err(e) => {
                    logger::warning(
                        LogTag::Session,
                        &format!("Connection attempt {}/{} failed: {}", attempt, attempts, e),
                    );
                    last_error = e;
                }
            }
        }

        let message = format!(
            "{} (gave up after {} attempts)",
            last_error.user_message(),
            attempts
        );
        let kind = last_error.kind;
        let applied = self.commit(epoch, |inner| {
            inner.binding = None;
            inner.retry_exhausted = true;
            inner.state = SessionState::Error { kind, message };
        });
        if applied {
            logger::error(
                LogTag::Session,
                &format!("Connection failed after {} attempts: {}", attempts, last_error),
            );
        }
        Err(last_error.into())
    }

    /// Reconcile local state with the provider once
    pub async fn resync_once(&self) -> SessionState {
        let (state, exhausted, epoch) = {
            let inner = self.inner.lock();
            (inner.state.clone(), inner.retry_exhausted, inner.epoch)
        };

        match state {
            SessionState::Connecting => {}
            SessionState::Connected { .. } => match self.provider.is_authenticated().await {
                Ok(true) => {}
                Ok(false) => {
                    if self.commit_disconnected(epoch) {
                        logger::info(LogTag::Session, "Provider session expired, disconnected");
                    }
                }
                Err(e) => {
                    logger::debug(LogTag::Session, &format!("Session check failed: {}", e));
                }
            },
            SessionState::Error { .. } if !exhausted => {
                logger::info(LogTag::Session, "Retrying failed connection");
                if let Err(e) = self.retry_connection().await {
                    logger::debug(LogTag::Session, &format!("Retry did not connect: {}", e));
                }
            }
            SessionState::Error { .. } => {}
            SessionState::Disconnected => match self.try_resume().await {
                Ok(Some(binding)) => {
                    let principal = binding.identity.principal.clone();
                    if self.commit_connected(epoch, binding) {
                        logger::info(
                            LogTag::Session,
                            &format!("Picked up session for {}", principal.to_display_short()),
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    logger::debug(LogTag::Session, &format!("Session check failed: {}", e));
                }
            },
        }

        self.state()
    }

    /// Reconcile every `resync_interval` until cancelled
    pub fn spawn_resync(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = self.config.resync_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            state = manager.resync_once() => {
                                logger::verbose(LogTag::Session, &format!("Resync: {}", state));
                            }
                        }
                    }
                }
            }
            logger::debug(LogTag::Session, "Session resync stopped");
        })
    }

    /// Drop the error and return to `Disconnected`
    pub fn clear_error(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.state, SessionState::Error { .. }) {
            inner.state = SessionState::Disconnected;
            inner.retry_exhausted = false;
            self.publish(&inner);
        }
    }

    /// Stop in-flight work; later results are discarded
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        inner.binding = None;
        inner.state = SessionState::Disconnected;
        self.publish(&inner);
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.inner.lock().state.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().state.is_connected()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.inner.lock().state.principal().cloned()
    }

    pub fn principal_display(&self) -> Option<String> {
        self.principal().map(|p| p.to_display_short())
    }

    pub fn status_label(&self) -> &'static str {
        self.inner.lock().state.status_label()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.lock().state.error_message().map(str::to_string)
    }

    pub fn retry_exhausted(&self) -> bool {
        self.inner.lock().retry_exhausted
    }

    pub fn backend(&self) -> XonoraResult<Arc<dyn CanisterBackend>> {
        self.require_connected().map(|(_, backend)| backend)
    }

    /// Principal and request client of the live session
    pub fn require_connected(&self) -> XonoraResult<(Principal, Arc<dyn CanisterBackend>)> {
        let inner = self.inner.lock();
        match (&inner.state, &inner.binding) {
            (SessionState::Connected { principal }, Some(binding)) => {
                Ok((principal.clone(), Arc::clone(&binding.backend)))
            }
            _ => Err(XonoraError::NotConnected),
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    async fn bind(&self, identity: Identity) -> Result<Binding, ConnectionError> {
        let backend = self.connector.connect(&identity).await?;
        Ok(Binding { identity, backend })
    }

    /// Provider session plus a fresh client, `None` when not authenticated
    async fn try_resume(&self) -> Result<Option<Binding>, ConnectionError> {
        if !self.provider.is_authenticated().await? {
            return Ok(None);
        }
        match self.provider.current_identity().await? {
            Some(identity) => self.bind(identity).await.map(Some),
            None => Ok(None),
        }
    }

    fn begin(&self, state: SessionState) -> u64 {
        let mut inner = self.inner.lock();
        inner.epoch += 1;
        inner.state = state;
        self.publish(&inner);
        inner.epoch
    }

    fn is_current(&self, epoch: u64) -> bool {
        !self.shutdown.is_cancelled() && self.inner.lock().epoch == epoch
    }

    fn commit(&self, epoch: u64, apply: impl FnOnce(&mut Inner)) -> bool {
        let mut inner = self.inner.lock();
        if self.shutdown.is_cancelled() || inner.epoch != epoch {
            return false;
        }
        apply(&mut inner);
        self.publish(&inner);
        true
    }

    fn commit_connected(&self, epoch: u64, binding: Binding) -> bool {
        self.commit(epoch, |inner| {
            inner.state = SessionState::Connected {
                principal: binding.identity.principal.clone(),
            };
            inner.binding = Some(binding);
            inner.retry_exhausted = false;
        })
    }

    fn commit_disconnected(&self, epoch: u64) -> bool {
        self.commit(epoch, |inner| {
            inner.binding = None;
            inner.state = SessionState::Disconnected;
        })
    }

    fn commit_error(&self, epoch: u64, error: &ConnectionError) -> bool {
        self.commit(epoch, |inner| {
            inner.binding = None;
            inner.state = SessionState::Error {
                kind: error.kind,
                message: error.user_message().to_string(),
            };
        })
    }

    fn publish(&self, inner: &Inner) {
        self.state_tx.send_replace(inner.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{InMemoryCanister, InMemoryConnector, ScriptedIdentityProvider};
    use crate::config::RateLimitSettings;
    use crate::errors::ConnectionErrorKind;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Harness {
        provider: Arc<ScriptedIdentityProvider>,
        connector: Arc<InMemoryConnector>,
        manager: Arc<SessionManager>,
    }

    fn alice() -> Principal {
        Principal::new("alice-principal-0001")
    }

    fn harness(provider: ScriptedIdentityProvider) -> Harness {
        let provider = Arc::new(provider);
        let connector = Arc::new(InMemoryConnector::new(InMemoryCanister::new()));
        let auth = Arc::new(RateLimiter::new("auth", RateLimitSettings::default().auth));
        let manager = Arc::new(SessionManager::new(
            SessionConfig::default(),
            provider.clone(),
            connector.clone(),
            auth,
            CancellationToken::new(),
        ));
        Harness {
            provider,
            connector,
            manager,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_resumes_existing_session() {
        let h = harness(ScriptedIdentityProvider::with_session(alice()));
        let state = h.manager.initialize().await;

        assert_eq!(state, SessionState::Connected { principal: alice() });
        assert_eq!(h.manager.principal_display().as_deref(), Some("alice-...l-0001"));
        let (principal, backend) = h.manager.require_connected().unwrap();
        assert_eq!(principal, alice());
        assert_eq!(backend.whoami().await.unwrap(), alice());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_without_session() {
        let h = harness(ScriptedIdentityProvider::new());
        assert_eq!(h.manager.initialize().await, SessionState::Disconnected);
        assert!(matches!(h.manager.backend(), Err(XonoraError::NotConnected)));
        assert_eq!(h.connector.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_classified_by_origin() {
        let h = harness(ScriptedIdentityProvider::with_session(alice()));
        h.connector
            .fail_next(ConnectionError::backend("canister stopped"));
        match h.manager.initialize().await {
            SessionState::Error { kind, message } => {
                assert_eq!(kind, ConnectionErrorKind::Backend);
                assert_eq!(message, ConnectionErrorKind::Backend.user_message());
            }
            other => panic!("unexpected state {:?}", other),
        }

        h.provider
            .fail_next_check(ConnectionError::network("offline"));
        match h.manager.initialize().await {
            SessionState::Error { kind, .. } => assert_eq!(kind, ConnectionErrorKind::Network),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_publishes_state() {
        let h = harness(ScriptedIdentityProvider::new());
        let mut rx = h.manager.subscribe();
        h.provider.push_login(Ok(Identity::new(alice())));

        let principal = h.manager.login().await.unwrap();
        assert_eq!(principal, alice());
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            *rx.borrow_and_update(),
            SessionState::Connected { principal: alice() }
        );
        assert_eq!(h.manager.status_label(), "Connected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_login_is_identity_error() {
        let h = harness(ScriptedIdentityProvider::new());
        let err = h.manager.login().await.unwrap_err();

        assert!(matches!(
            err,
            XonoraError::Connection(ConnectionError {
                kind: ConnectionErrorKind::Identity,
                ..
            })
        ));
        assert_eq!(h.manager.status_label(), "Connection Error");
        assert!(h.manager.error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_logins_are_rate_limited() {
        let h = harness(ScriptedIdentityProvider::new());
        for _ in 0..5 {
            assert!(h.manager.login().await.is_err());
        }
        let err = h.manager.login().await.unwrap_err();
        assert!(matches!(err, XonoraError::RateLimit { .. }));
        assert_eq!(h.provider.login_count(), 5);

        tokio::time::advance(Duration::from_secs(61)).await;
        h.provider.push_login(Ok(Identity::new(alice())));
        assert!(h.manager.login().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_always_disconnects() {
        let h = harness(ScriptedIdentityProvider::with_session(alice()));
        h.manager.initialize().await;
        h.provider
            .fail_logout(ConnectionError::network("provider unreachable"));

        h.manager.logout().await;
        assert_eq!(h.manager.state(), SessionState::Disconnected);
        assert!(h.manager.error().is_none());
        assert!(h.manager.backend().is_err());

        // From an error state as well
        h.manager.login().await.unwrap_err();
        h.manager.logout().await;
        assert_eq!(h.manager.state(), SessionState::Disconnected);
        assert!(h.manager.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_then_terminal_error() {
        let h = harness(ScriptedIdentityProvider::with_session(alice()));
        for _ in 0..4 {
            h.connector
                .fail_next(ConnectionError::network("connection reset"));
        }
        h.manager.initialize().await;
        assert!(h.manager.error().is_some());

        let started = Instant::now();
        let err = h.manager.retry_connection().await.unwrap_err();
        assert!(matches!(err, XonoraError::Connection(_)));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(7) && elapsed < Duration::from_secs(8));
        assert_eq!(h.connector.connect_count(), 4);
        assert!(h.manager.retry_exhausted());
        assert!(h
            .manager
            .error()
            .unwrap()
            .contains("gave up after 3 attempts"));

        // No automatic retry once exhausted
        h.manager.resync_once().await;
        assert_eq!(h.connector.connect_count(), 4);
        assert!(h.manager.error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_on_later_attempt() {
        let h = harness(ScriptedIdentityProvider::with_session(alice()));
        h.connector
            .fail_next(ConnectionError::backend("replica busy"));
        h.connector
            .fail_next(ConnectionError::backend("replica busy"));
        h.manager.initialize().await;

        let started = Instant::now();
        assert_eq!(h.manager.retry_connection().await.unwrap(), alice());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
        assert!(h.manager.state().is_connected());
        assert!(!h.manager.retry_exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_discards_in_flight_retry() {
        let h = harness(ScriptedIdentityProvider::with_session(alice()));
        h.connector.fail_next(ConnectionError::network("offline"));
        h.manager.initialize().await;

        let manager = h.manager.clone();
        let retry = tokio::spawn(async move { manager.retry_connection().await });
        tokio::task::yield_now().await;
        assert_eq!(h.manager.state(), SessionState::Connecting);

        h.manager.logout().await;
        let result = retry.await.unwrap();
        assert!(matches!(result, Err(XonoraError::NotConnected)));
        assert_eq!(h.manager.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_retry() {
        let h = harness(ScriptedIdentityProvider::with_session(alice()));
        h.connector.fail_next(ConnectionError::network("offline"));
        h.manager.initialize().await;

        let manager = h.manager.clone();
        let retry = tokio::spawn(async move { manager.retry_connection().await });
        tokio::task::yield_now().await;
        h.manager.shutdown();

        assert!(retry.await.unwrap().is_err());
        assert_eq!(h.manager.state(), SessionState::Disconnected);
        assert_eq!(h.connector.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_tracks_provider_session() {
        let h = harness(ScriptedIdentityProvider::with_session(alice()));
        h.manager.initialize().await;

        h.provider.expire_session();
        assert_eq!(h.manager.resync_once().await, SessionState::Disconnected);

        h.provider.set_session(alice());
        assert!(h.manager.resync_once().await.is_connected());

        // A failed probe while connected keeps the session
        h.provider
            .fail_next_check(ConnectionError::network("blip"));
        assert!(h.manager.resync_once().await.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_error() {
        let h = harness(ScriptedIdentityProvider::new());
        h.manager.login().await.unwrap_err();
        h.manager.clear_error();
        assert_eq!(h.manager.state(), SessionState::Disconnected);
    }
}
