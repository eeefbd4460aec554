//! Persistent key-value slots behind the credential store.
//!
//! Only `CredentialStore` talks to these; everything else goes through it.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use keyring::Entry;

pub trait SlotStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing slot is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Slots that live only as long as the process.
#[derive(Default)]
pub struct MemorySlots {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySlots {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map still holds consistent strings
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SlotStore for MemorySlots {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values().remove(key);
        Ok(())
    }
}

/// One file per slot, `<dir>/<key>.json`.
pub struct FileSlots {
    dir: PathBuf,
}

impl FileSlots {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create credential directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SlotStore for FileSlots {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.slot_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read credential slot: {}", key))?;
        Ok(Some(contents))
    }

    /// Slot files are readable by the owner only on unix.
    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.slot_path(key);
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&path)
            .with_context(|| format!("Failed to open credential slot: {}", key))?;

        // mode() only applies on create; tighten files left by older builds
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict credential slot: {}", key))?;
        }

        file.write_all(value.as_bytes())
            .with_context(|| format!("Failed to write credential slot: {}", key))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.slot_path(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove credential slot: {}", key))?;
        }
        Ok(())
    }
}

/// Slots kept in the OS keychain under one service name.
pub struct KeyringSlots {
    service: String,
}

impl KeyringSlots {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl SlotStore for KeyringSlots {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve credential from keychain"),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store credential in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}
