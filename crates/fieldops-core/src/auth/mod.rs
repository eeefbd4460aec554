//! Authentication module for managing the user's session.
//!
//! This module provides:
//! - `CredentialStore`: the bearer token and user profile, persisted in slots
//! - `SessionManager`: login, logout and token refresh, plus session events
//! - `slots`: the memory, file and keychain slot backends

pub mod session;
pub mod slots;
pub mod store;

pub use session::{SessionEvent, SessionManager};
pub use slots::{FileSlots, KeyringSlots, MemorySlots, SlotStore};
pub use store::CredentialStore;

use anyhow::Result;

use crate::config::{Config, CredentialBackend};

/// Keychain service name for the keyring backend
const KEYRING_SERVICE: &str = "fieldops";

/// Slot backend selected by `config`.
pub fn slots_for(config: &Config) -> Result<Box<dyn SlotStore>> {
    Ok(match config.credential_backend {
        CredentialBackend::File => Box::new(FileSlots::new(config.data_dir()?)?),
        CredentialBackend::Keyring => Box::new(KeyringSlots::new(KEYRING_SERVICE)),
        CredentialBackend::Memory => Box::new(MemorySlots::new()),
    })
}
