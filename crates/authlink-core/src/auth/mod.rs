//! Authentication module: token lifecycle and session management.
//!
//! This module provides:
//! - `TokenStore`: the in-memory holder of the current access token
//! - `Renewer` / `HttpRenewer`: obtains a fresh access token using the
//!   refresh cookie carried by the transport
//! - `RenewalCoordinator`: collapses concurrent renewal needs into one call
//! - `CredentialStore`: persisted copy of the access token (file, keyring, memory)
//! - `SessionManager`: restore/login/logout orchestration on top of the client

pub mod coordinator;
pub mod credentials;
pub mod renewal;
pub mod session;
pub mod token;

pub use coordinator::{RenewalCoordinator, RenewalObserver};
pub use credentials::{
    CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore,
    StorageKind,
};
pub use renewal::{HttpRenewer, RenewalError, Renewer};
pub use session::{SessionManager, SessionState};
pub use token::{AccessToken, TokenStore};
