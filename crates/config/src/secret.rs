//! Secret storage.

use crate::error::{ErrorKind, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Somewhere to keep small secrets (such as saved account credentials) under
/// a string key.
pub trait SecretStore: Send + Sync {
    /// The secret stored under `key`, or `None` when nothing is.
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    /// Forget `key`. Forgetting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

impl<S: SecretStore + ?Sized> SecretStore for Arc<S> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }
}

/// Secrets kept in the operating system's credential store.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self { service: service.into() }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, key).map_err(|err| keyring_error(key, err))
    }
}

impl SecretStore for KeyringStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => {
                tracing::debug!(service = %self.service, key, "no secret in keyring");
                Ok(None)
            },
            Err(err) => Err(keyring_error(key, err)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?.set_password(value).map_err(|err| keyring_error(key, err))
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(keyring_error(key, err)),
        }
    }
}

fn keyring_error(key: &str, err: keyring::Error) -> crate::error::Error {
    exn::Exn::from(ErrorKind::Secret(format!("{key}: {err}")))
}

/// Secrets kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.secrets.lock().map_err(|_| exn::Exn::from(ErrorKind::Secret("memory store poisoned".to_string())))
    }
}

impl SecretStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
