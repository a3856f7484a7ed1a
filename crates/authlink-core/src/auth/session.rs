//! Session lifecycle on top of the authenticated client.
//!
//! `SessionManager` is the only component that writes the persisted copy
//! of the access token. It keeps that copy, the in-memory token holder and
//! the signed-in user in step across restore, login, renewal and logout.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::{AccessToken, CredentialStore, RenewalError, RenewalObserver};
use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::models::{ProfileUpdate, SignupResponse, User};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// `restore()` has not finished yet.
    Loading,
    Authenticated(User),
    Unauthenticated,
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

/// Keeps persisted storage and session state in step with renewal episodes.
struct SessionMirror {
    store: Arc<dyn CredentialStore>,
    state: Arc<RwLock<SessionState>>,
}

impl RenewalObserver for SessionMirror {
    fn renewed(&self, token: &AccessToken) {
        if let Err(e) = self.store.save(token.as_str()) {
            warn!(error = %e, "Failed to persist renewed token");
        }
    }

    fn expired(&self, error: &RenewalError) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted token");
        }
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = SessionState::Unauthenticated;
        info!(reason = %error, "Session expired, signed out");
    }
}

pub struct SessionManager {
    api: ApiClient,
    store: Arc<dyn CredentialStore>,
    state: Arc<RwLock<SessionState>>,
}

impl SessionManager {
    pub fn new(api: ApiClient, store: Arc<dyn CredentialStore>) -> Self {
        let state = Arc::new(RwLock::new(SessionState::Loading));
        api.coordinator().set_observer(Arc::new(SessionMirror {
            store: Arc::clone(&store),
            state: Arc::clone(&state),
        }));
        Self { api, store, state }
    }

    /// Build the client and the configured storage backend.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let store = config.storage.open(&config)?;
        let api = ApiClient::new(config)?;
        Ok(Self::new(api, store))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            *self.state.read().unwrap_or_else(PoisonError::into_inner),
            SessionState::Authenticated(_)
        )
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Mark `user` signed in, unless the session was reset after `generation`
    /// was read.
    fn commit_user(&self, generation: u64, user: User) -> Result<User, ApiError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if self.api.coordinator().generation() != generation {
            debug!("Session changed while the request was in flight, dropping result");
            return Err(ApiError::SessionEnded);
        }
        *state = SessionState::Authenticated(user.clone());
        Ok(user)
    }

    /// Drop the token from memory and storage and sign out.
    ///
    /// Starts a new generation, so a renewal still in flight cannot bring
    /// the token back.
    fn teardown(&self) {
        self.api.coordinator().reset(None);
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted token");
        }
        self.set_state(SessionState::Unauthenticated);
    }

    /// Resume a previous session from the persisted token, if any.
    ///
    /// The token is validated by fetching the profile (renewing it on the
    /// way if it has expired). Without a persisted token no request is made.
    pub async fn restore(&self) -> SessionState {
        self.set_state(SessionState::Loading);

        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted token, discarding it");
                self.teardown();
                return self.state();
            }
        };

        let Some(token) = stored else {
            debug!("No persisted token, starting signed out");
            self.set_state(SessionState::Unauthenticated);
            return self.state();
        };

        let generation = self.api.coordinator().reset(Some(AccessToken::new(token)));

        match self.api.profile().await {
            Ok(profile) => {
                if let Ok(user) = self.commit_user(generation, User::from(profile)) {
                    info!(user_id = %user.id, "Session restored");
                }
            }
            Err(e) if self.api.coordinator().generation() == generation => {
                warn!(error = %e, "Persisted session is no longer valid");
                self.teardown();
            }
            Err(e) => debug!(error = %e, "Restore overtaken by login or logout"),
        }

        self.state()
    }

    /// Sign in. On failure the session is left exactly as it was.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let response = self.api.login(email, password).await?;
        if response.access_token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Login response did not include an access token".to_string(),
            ));
        }

        let token = AccessToken::new(response.access_token);
        self.api.coordinator().reset(Some(token.clone()));
        if let Err(e) = self.store.save(token.as_str()) {
            warn!(error = %e, "Failed to save session");
        }

        info!(user_id = %response.user.id, "Login successful");
        self.set_state(SessionState::Authenticated(response.user.clone()));
        Ok(response.user)
    }

    /// Register a new account. Does not sign in.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignupResponse, ApiError> {
        self.api.signup(email, password, full_name).await
    }

    /// Sign out. Local state is cleared whatever the service answers.
    pub async fn logout(&self) {
        if let Err(e) = self.api.logout().await {
            warn!(error = %e, "Logout request failed, clearing local session anyway");
        }
        self.teardown();
        info!("Logged out");
    }

    /// Re-fetch the profile of the signed-in user.
    pub async fn refresh_user(&self) -> Result<User, ApiError> {
        let generation = self.api.coordinator().generation();
        let user = User::from(self.api.profile().await?);
        self.commit_user(generation, user)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        let generation = self.api.coordinator().generation();
        let user = User::from(self.api.update_profile(update).await?);
        self.commit_user(generation, user)
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("api", &self.api)
            .field("state", &self.state())
            .finish()
    }
}
