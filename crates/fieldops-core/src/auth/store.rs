use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::slots::SlotStore;
use crate::models::UserProfile;

/// Slot holding the bearer token
pub const TOKEN_SLOT: &str = "token";

/// Slot holding the serialized user profile
pub const PROFILE_SLOT: &str = "user";

#[derive(Debug, Default, Clone)]
struct Resident {
    token: Option<String>,
    profile: Option<UserProfile>,
}

/// Holds the bearer token and the signed-in user's profile.
///
/// Reads are served from memory; every write goes through to the slots
/// while the write lock is held, so readers never see a token from one
/// session paired with the profile from another.
pub struct CredentialStore {
    slots: Box<dyn SlotStore>,
    resident: RwLock<Resident>,
}

impl CredentialStore {
    /// Open the store, loading whatever the slots already hold.
    pub fn open(slots: Box<dyn SlotStore>) -> Result<Self> {
        let token = slots.read(TOKEN_SLOT)?.filter(|t| !t.is_empty());
        let profile = match slots.read(PROFILE_SLOT)? {
            Some(raw) => match serde_json::from_str::<UserProfile>(&raw) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(error = %e, "Ignoring unreadable profile slot");
                    None
                }
            },
            None => None,
        };
        debug!(has_token = token.is_some(), has_profile = profile.is_some(), "Credential store opened");

        Ok(Self {
            slots,
            resident: RwLock::new(Resident { token, profile }),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Resident> {
        self.resident.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Resident> {
        self.resident.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.read().profile.clone()
    }

    pub fn has_token(&self) -> bool {
        self.read().token.is_some()
    }

    /// Store a token and profile together. A failed write puts back
    /// whatever session was resident before.
    pub fn set_session(&self, token: &str, profile: &UserProfile) -> Result<()> {
        let serialized = serde_json::to_string(profile).context("Failed to serialize profile")?;
        let mut resident = self.write();

        let written = self
            .slots
            .write(PROFILE_SLOT, &serialized)
            .and_then(|_| self.slots.write(TOKEN_SLOT, token));
        if let Err(e) = written {
            self.restore_slots(&resident);
            return Err(e);
        }

        resident.token = Some(token.to_string());
        resident.profile = Some(profile.clone());
        Ok(())
    }

    /// Rewrite the slots from the in-memory copy, which still holds the
    /// last state that was fully written.
    fn restore_slots(&self, previous: &Resident) {
        let token = match previous.token {
            Some(ref token) => self.slots.write(TOKEN_SLOT, token),
            None => self.slots.remove(TOKEN_SLOT),
        };
        let profile = match previous.profile {
            Some(ref profile) => serde_json::to_string(profile)
                .map_err(anyhow::Error::from)
                .and_then(|raw| self.slots.write(PROFILE_SLOT, &raw)),
            None => self.slots.remove(PROFILE_SLOT),
        };
        if let Err(e) = token.and(profile) {
            warn!(error = %e, "Failed to restore credential slots");
        }
    }

    /// Replace the token, keeping the profile.
    pub fn set_token(&self, token: &str) -> Result<()> {
        let mut resident = self.write();
        self.slots.write(TOKEN_SLOT, token)?;
        resident.token = Some(token.to_string());
        Ok(())
    }

    /// Replace the profile, keeping the token.
    pub fn set_profile(&self, profile: &UserProfile) -> Result<()> {
        let serialized = serde_json::to_string(profile).context("Failed to serialize profile")?;
        let mut resident = self.write();
        self.slots.write(PROFILE_SLOT, &serialized)?;
        resident.profile = Some(profile.clone());
        Ok(())
    }

    /// Remove token and profile. Safe to call on an empty store.
    pub fn clear(&self) -> Result<()> {
        let mut resident = self.write();
        *resident = Resident::default();
        let token = self.slots.remove(TOKEN_SLOT);
        let profile = self.slots.remove(PROFILE_SLOT);
        token.and(profile)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::auth::slots::MemorySlots;
    use crate::models::Role;

    fn profile(email: &str) -> UserProfile {
        UserProfile {
            id: "u-1".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Okafor".to_string(),
            email: email.to_string(),
            role: Role::Supervisor,
            field_office: Some("Central".to_string()),
            job_title: None,
            active: true,
            last_login: None,
        }
    }

    /// Slots that refuse to write one key while `failing` is set
    struct BrokenSlot {
        inner: Arc<MemorySlots>,
        broken: &'static str,
        failing: Arc<AtomicBool>,
    }

    impl BrokenSlot {
        fn new(broken: &'static str) -> (Self, Arc<MemorySlots>, Arc<AtomicBool>) {
            let inner = Arc::new(MemorySlots::new());
            let failing = Arc::new(AtomicBool::new(false));
            let slots = Self {
                inner: inner.clone(),
                broken,
                failing: failing.clone(),
            };
            (slots, inner, failing)
        }
    }

    impl SlotStore for BrokenSlot {
        fn read(&self, key: &str) -> Result<Option<String>> {
            self.inner.read(key)
        }
        fn write(&self, key: &str, value: &str) -> Result<()> {
            if key == self.broken && self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.write(key, value)
        }
        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_set_session_and_read_back() {
        let store = CredentialStore::open(Box::new(MemorySlots::new())).unwrap();
        assert!(!store.has_token());

        store.set_session("T1", &profile("a@b.com")).unwrap();
        assert_eq!(store.token().as_deref(), Some("T1"));
        assert_eq!(store.profile().unwrap().email, "a@b.com");

        store.set_token("T2").unwrap();
        assert_eq!(store.token().as_deref(), Some("T2"));
        assert_eq!(store.profile().unwrap().email, "a@b.com");
    }

    #[test]
    fn test_open_reads_existing_slots() {
        let slots = MemorySlots::new();
        slots.write(TOKEN_SLOT, "T9").unwrap();
        slots
            .write(PROFILE_SLOT, &serde_json::to_string(&profile("x@y.org")).unwrap())
            .unwrap();

        let store = CredentialStore::open(Box::new(slots)).unwrap();
        assert_eq!(store.token().as_deref(), Some("T9"));
        assert_eq!(store.profile().unwrap().email, "x@y.org");
    }

    #[test]
    fn test_corrupt_profile_is_ignored() {
        let slots = MemorySlots::new();
        slots.write(TOKEN_SLOT, "T9").unwrap();
        slots.write(PROFILE_SLOT, "{not json").unwrap();

        let store = CredentialStore::open(Box::new(slots)).unwrap();
        assert!(store.has_token());
        assert!(store.profile().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = CredentialStore::open(Box::new(MemorySlots::new())).unwrap();
        store.clear().unwrap();
        store.set_session("T1", &profile("a@b.com")).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.token().is_none());
        assert!(store.profile().is_none());
    }

    #[test]
    fn test_failed_write_leaves_no_partial_session() {
        let (slots, inner, failing) = BrokenSlot::new(TOKEN_SLOT);
        failing.store(true, Ordering::SeqCst);
        let store = CredentialStore::open(Box::new(slots)).unwrap();

        assert!(store.set_session("T1", &profile("a@b.com")).is_err());
        assert!(store.token().is_none());
        assert!(store.profile().is_none());
        assert_eq!(inner.read(PROFILE_SLOT).unwrap(), None);
        assert_eq!(inner.read(TOKEN_SLOT).unwrap(), None);
    }

    #[test]
    fn test_failed_write_keeps_previous_session() {
        let (slots, inner, failing) = BrokenSlot::new(TOKEN_SLOT);
        let store = CredentialStore::open(Box::new(slots)).unwrap();
        store.set_session("T0", &profile("old@b.com")).unwrap();

        failing.store(true, Ordering::SeqCst);
        assert!(store.set_session("T1", &profile("new@b.com")).is_err());

        assert_eq!(store.token().as_deref(), Some("T0"));
        assert_eq!(store.profile().unwrap().email, "old@b.com");
        assert_eq!(inner.read(TOKEN_SLOT).unwrap().as_deref(), Some("T0"));
        let persisted: UserProfile =
            serde_json::from_str(&inner.read(PROFILE_SLOT).unwrap().unwrap()).unwrap();
        assert_eq!(persisted.email, "old@b.com");
    }
}
