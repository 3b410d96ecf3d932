//! Session manager: owns the in-memory session and its persisted copy.
//!
//! The session moves `Unknown → Authenticated | Anonymous` during startup
//! recovery and between the two afterwards via login, registration and
//! logout. Every token/user change in memory is paired with the matching
//! store writes, and every eviction clears both.
//!
//! Readers get immutable snapshots: [`SessionManager::snapshot`], a
//! [`watch`] receiver, or a callback registered with
//! [`SessionManager::subscribe`].

use std::sync::{Arc, Mutex, PoisonError, Weak};

use loboshop_types::{AuthResponse, Credentials, RegisterData, Session, User};
use serde_json::Value;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{OnceCell, broadcast, watch};
use tokio::task::JoinHandle;

use crate::api::{
    ApiClient, ApiError, ApiErrorKind, ApiResult, AuthEvent, TokenCheck, server_message,
};
use crate::config::Config;
use crate::storage::{Store, TOKEN_KEY, USER_KEY};

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";
const NOT_LOGGED_IN: &str = "Not logged in";

/// Eviction policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Evict when a request for the current token is answered with 401.
    pub evict_on_unauthorized: bool,
    /// Evict during recovery when the token cannot be validated because
    /// the server is unreachable or failing.
    pub evict_on_unreachable: bool,
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            evict_on_unauthorized: config.evict_on_unauthorized,
            evict_on_unreachable: config.evict_on_unreachable,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

type Callback = Arc<dyn Fn(&Session) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    callbacks: Vec<(u64, Callback)>,
}

struct Inner {
    api: ApiClient,
    store: Store,
    options: SessionOptions,
    state: watch::Sender<Session>,
    /// Serializes session operations so transitions never interleave.
    op_lock: tokio::sync::Mutex<()>,
    recovered: OnceCell<()>,
    listeners: Mutex<Listeners>,
    eviction_task: Mutex<Option<JoinHandle<()>>>,
    /// Own copy of the 401 events, drained by [`SessionManager::settle`].
    pending: Option<tokio::sync::Mutex<broadcast::Receiver<AuthEvent>>>,
}

/// Owner of the client session.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

/// Handle returned by [`SessionManager::subscribe`].
///
/// The callback stays registered until this is dropped or
/// [`Subscription::unsubscribe`] is called.
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut listeners = inner.listeners.lock().unwrap_or_else(PoisonError::into_inner);
            listeners.callbacks.retain(|(id, _)| *id != self.id);
        }
    }
}

enum Persisted {
    Empty,
    Complete { token: String, user: User },
    /// Partial, unparseable or unreadable data.
    Invalid(&'static str),
}

impl SessionManager {
    /// Creates a manager in the `Unknown` state over `api` and its store.
    ///
    /// With `evict_on_unauthorized`, a background task listens for 401s
    /// from the client. It only holds a weak reference and is aborted when
    /// the last clone of the manager is dropped. Outside a Tokio runtime
    /// the listener is skipped and only [`Self::settle`] applies 401s.
    pub fn new(api: ApiClient, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(Session::Unknown);
        let pending = options
            .evict_on_unauthorized
            .then(|| tokio::sync::Mutex::new(api.subscribe()));
        let inner = Arc::new(Inner {
            store: api.store().clone(),
            api,
            options,
            state,
            op_lock: tokio::sync::Mutex::new(()),
            recovered: OnceCell::new(),
            listeners: Mutex::new(Listeners::default()),
            eviction_task: Mutex::new(None),
            pending,
        });

        if options.evict_on_unauthorized {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let events = inner.api.subscribe();
                    let task = handle.spawn(listen_for_rejections(Arc::downgrade(&inner), events));
                    *inner
                        .eviction_task
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(task);
                }
                Err(_) => {
                    tracing::warn!("no async runtime; 401 responses evict only on settle()");
                }
            }
        }

        Self { inner }
    }

    /// The client this manager authenticates, for catalog calls.
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// Applies every 401 the client has reported so far.
    ///
    /// The background listener applies them too, but may not get to run
    /// before a short-lived runtime shuts down. Await this before exiting.
    pub async fn settle(&self) {
        let Some(pending) = &self.inner.pending else {
            return;
        };
        let mut events = pending.lock().await;
        loop {
            match events.try_recv() {
                Ok(AuthEvent::Unauthorized { token: Some(token) }) => {
                    self.inner.evict_if_current(&token).await;
                }
                Ok(AuthEvent::Unauthorized { token: None }) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "missed authentication events");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    /// Current session.
    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every transition.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Waits until startup recovery has finished and returns the session.
    pub async fn ready(&self) -> Session {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|s| !s.is_loading()).await {
            Ok(session) => session.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Registers `callback` to run with the new session after each transition.
    pub fn subscribe(&self, callback: impl Fn(&Session) + Send + Sync + 'static) -> Subscription {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.callbacks.push((id, Arc::new(callback)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Restores the persisted session, validating the token with the server.
    ///
    /// Runs once per manager; later calls return the current session.
    /// Never fails: every problem ends in `Anonymous` (or, for an
    /// unreachable server under the default policy, keeps the saved
    /// session).
    pub async fn recover(&self) -> Session {
        self.inner
            .recovered
            .get_or_init(|| self.inner.recover_once())
            .await;
        self.snapshot()
    }

    /// Logs in and persists the session.
    ///
    /// # Errors
    /// Returns the server's message (or "Login failed") when the server
    /// refuses, "Connection error" on transport failure, or a storage
    /// error when the session cannot be saved. The session is unchanged on
    /// error.
    pub async fn login(&self, credentials: &Credentials) -> ApiResult<User> {
        let _guard = self.inner.op_lock.lock().await;
        let response = self
            .inner
            .api
            .login(credentials)
            .await
            .map_err(|e| auth_failure(e, LOGIN_FAILED))?;
        self.inner.establish(response, LOGIN_FAILED).await
    }

    /// Registers a new account and logs in with it.
    ///
    /// # Errors
    /// Same contract as [`SessionManager::login`], with "Registration
    /// failed" as the fallback message.
    pub async fn register(&self, data: &RegisterData) -> ApiResult<User> {
        let _guard = self.inner.op_lock.lock().await;
        let response = self
            .inner
            .api
            .register(data)
            .await
            .map_err(|e| auth_failure(e, REGISTRATION_FAILED))?;
        self.inner.establish(response, REGISTRATION_FAILED).await
    }

    /// Clears the persisted and in-memory session. Safe to repeat.
    pub async fn logout(&self) {
        let _guard = self.inner.op_lock.lock().await;
        self.inner.evict().await;
        self.inner.transition(Session::Anonymous);
    }

    /// Re-fetches the profile and stores the returned user.
    ///
    /// # Errors
    /// Returns an error when not logged in, when the request fails, or when
    /// the response carries no user.
    pub async fn refresh_profile(&self) -> ApiResult<User> {
        let _guard = self.inner.op_lock.lock().await;
        let Session::Authenticated { token, .. } = self.snapshot() else {
            return Err(ApiError::new(ApiErrorKind::Unauthorized, NOT_LOGGED_IN));
        };

        let Some(user) = self.inner.api.profile().await?.user else {
            return Err(ApiError::parse("Profile response had no user"));
        };
        self.inner.store.set(USER_KEY, user_value(&user)?).await?;
        self.inner.transition(Session::Authenticated {
            user: user.clone(),
            token,
        });
        Ok(user)
    }
}

impl Inner {
    async fn recover_once(&self) {
        let _guard = self.op_lock.lock().await;

        let next = match self.load_persisted().await {
            Persisted::Empty => Session::Anonymous,
            Persisted::Invalid(reason) => {
                tracing::info!(reason, "discarding saved session");
                self.evict().await;
                Session::Anonymous
            }
            Persisted::Complete { token, user } => match self.api.verify_token().await {
                TokenCheck::Valid => Session::Authenticated { user, token },
                TokenCheck::Rejected(e) => {
                    tracing::info!(error = %e, "saved session rejected by server");
                    self.evict().await;
                    Session::Anonymous
                }
                TokenCheck::Unreachable(e) if self.options.evict_on_unreachable => {
                    tracing::warn!(error = %e, "could not validate saved session, discarding it");
                    self.evict().await;
                    Session::Anonymous
                }
                TokenCheck::Unreachable(e) => {
                    tracing::warn!(error = %e, "could not validate saved session, keeping it");
                    Session::Authenticated { user, token }
                }
            },
        };

        self.transition(next);
    }

    async fn load_persisted(&self) -> Persisted {
        let token = self.store.get_string(TOKEN_KEY).await;
        let user = self.store.get(USER_KEY).await;

        match (token, user) {
            (Ok(None), Ok(None)) => Persisted::Empty,
            (Ok(Some(token)), Ok(Some(raw))) => match parse_user(raw) {
                Some(user) => Persisted::Complete { token, user },
                None => Persisted::Invalid("unparseable user"),
            },
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "could not read saved session");
                Persisted::Invalid("store unreadable")
            }
            _ => Persisted::Invalid("partial session"),
        }
    }

    async fn establish(&self, response: AuthResponse, fallback: &str) -> ApiResult<User> {
        let message = response.message.clone();
        let Some((token, user)) = response.into_session_parts() else {
            return Err(ApiError::rejected(
                message.unwrap_or_else(|| fallback.to_string()),
            ));
        };

        if let Err(e) = self.persist(&token, &user).await {
            tracing::warn!(error = %e, "could not save session");
            self.restore_persisted().await;
            return Err(e);
        }

        self.transition(Session::Authenticated {
            user: user.clone(),
            token,
        });
        Ok(user)
    }

    async fn persist(&self, token: &str, user: &User) -> ApiResult<()> {
        let user = user_value(user)?;
        self.store.set(TOKEN_KEY, Value::String(token.to_string())).await?;
        self.store.set(USER_KEY, user).await?;
        Ok(())
    }

    /// Rewrites the store to match the in-memory session after a failed save.
    async fn restore_persisted(&self) {
        let current = self.state.borrow().clone();
        let restored = match &current {
            Session::Authenticated { user, token } => self.persist(token, user).await,
            Session::Unknown | Session::Anonymous => {
                self.evict().await;
                Ok(())
            }
        };
        if let Err(e) = restored {
            tracing::warn!(error = %e, "could not restore saved session");
        }
    }

    /// Removes the persisted token and user. Failures are logged.
    async fn evict(&self) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.store.remove(key).await {
                tracing::warn!(key, error = %e, "could not remove saved session entry");
            }
        }
    }

    async fn evict_if_current(&self, rejected: &str) {
        let _guard = self.op_lock.lock().await;
        let is_current = self.state.borrow().token() == Some(rejected);
        if !is_current {
            tracing::debug!("ignoring 401 for a token that is no longer current");
            return;
        }

        tracing::warn!("current token rejected by server, logging out");
        self.evict().await;
        self.transition(Session::Anonymous);
    }

    fn transition(&self, next: Session) {
        if *self.state.borrow() == next {
            return;
        }
        tracing::debug!(
            authenticated = next.is_authenticated(),
            loading = next.is_loading(),
            "session transition"
        );
        self.state.send_replace(next.clone());

        let callbacks: Vec<Callback> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(&next);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let task = self
            .eviction_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

async fn listen_for_rejections(inner: Weak<Inner>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        match events.recv().await {
            Ok(AuthEvent::Unauthorized { token: Some(token) }) => {
                let Some(inner) = inner.upgrade() else { break };
                inner.evict_if_current(&token).await;
            }
            Ok(AuthEvent::Unauthorized { token: None }) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "missed authentication events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Reads a persisted user stored either as an object or as a JSON string.
fn parse_user(raw: Value) -> Option<User> {
    match raw {
        Value::String(s) => serde_json::from_str(&s).ok(),
        other => serde_json::from_value(other).ok(),
    }
}

fn user_value(user: &User) -> ApiResult<Value> {
    serde_json::to_value(user).map_err(|e| ApiError::parse(format!("Could not encode user: {e}")))
}

/// Maps a login/registration request failure to the message callers show.
fn auth_failure(err: ApiError, fallback: &str) -> ApiError {
    match err.kind {
        ApiErrorKind::Transport | ApiErrorKind::Timeout | ApiErrorKind::Storage => err,
        _ => {
            let message = err
                .details
                .as_deref()
                .and_then(server_message)
                .unwrap_or_else(|| fallback.to_string());
            ApiError { message, ..err }
        }
    }
}
