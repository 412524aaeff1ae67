// carecheck/src/keychain.rs
//
// Secret storage on top of the OS keychain, with a process-local fallback
// for machines (CI, headless Linux) where no keychain service is running.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, Once,
};

use anyhow::{Context, Result};
use keyring::credential::{Credential, CredentialApi, CredentialBuilderApi, CredentialPersistence};
use keyring::Error as KeyringError;
use tracing::warn;

/// Service name for every keychain entry written by carecheck.
pub const KEYCHAIN_SERVICE_NAME: &str = "carecheck";

static KEYCHAIN_INITIALIZED: Once = Once::new();
static FALLBACK_ACTIVE: AtomicBool = AtomicBool::new(false);

type SecretMap = Arc<Mutex<HashMap<EntryKey, Vec<u8>>>>;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct EntryKey {
    target: Option<String>,
    service: String,
    user: String,
}

#[derive(Clone, Debug, Default)]
struct InMemoryCredentialBuilder {
    store: SecretMap,
}

#[derive(Clone, Debug)]
struct InMemoryCredential {
    key: EntryKey,
    store: SecretMap,
}

/// Make sure some keyring backend is usable before touching secrets.
///
/// Probes the OS keychain once; if it fails, or
/// `CARECHECK_USE_IN_MEMORY_KEYCHAIN` is set, switches to an in-memory store
/// whose secrets last only for this process.
pub fn ensure_available() {
    if using_in_memory_fallback() {
        return;
    }

    if should_force_in_memory() {
        install_in_memory_keyring();
        return;
    }

    KEYCHAIN_INITIALIZED.call_once(|| {
        if let Err(err) = probe_system_keyring() {
            warn!(error = %err, "system keychain unavailable, falling back to in-memory keyring");
            install_in_memory_keyring();
        }
    });
}

/// Force the use of the in-memory keyring. This is primarily used by tests.
pub fn force_in_memory_keyring() {
    install_in_memory_keyring();
}

pub fn using_in_memory_fallback() -> bool {
    FALLBACK_ACTIVE.load(Ordering::SeqCst)
}

pub fn store_secret(account: &str, secret: &str) -> Result<()> {
    ensure_available();
    entry(account)?
        .set_password(secret)
        .with_context(|| format!("Failed to write keychain entry '{}'", account))
}

pub fn load_secret(account: &str) -> Result<String> {
    ensure_available();
    entry(account)?
        .get_password()
        .with_context(|| format!("Failed to read keychain entry '{}'", account))
}

/// Deleting an entry that does not exist is not an error.
pub fn delete_secret(account: &str) -> Result<()> {
    ensure_available();
    match entry(account)?.delete_credential() {
        Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to delete keychain entry '{}'", account))
        }
    }
}

fn entry(account: &str) -> Result<keyring::Entry> {
    keyring::Entry::new(KEYCHAIN_SERVICE_NAME, account)
        .with_context(|| format!("Invalid keychain entry '{}'", account))
}

fn should_force_in_memory() -> bool {
    std::env::var("CARECHECK_USE_IN_MEMORY_KEYCHAIN")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false)
}

fn probe_system_keyring() -> keyring::Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE_NAME, "__carecheck_keychain_probe__")?;
    let test_secret = "__probe_secret__";
    entry.set_password(test_secret)?;
    let retrieved = entry.get_password()?;

    if retrieved != test_secret {
        return Err(KeyringError::BadEncoding(retrieved.into_bytes()));
    }

    match entry.delete_credential() {
        Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
        Err(err) => Err(err),
    }
}

fn install_in_memory_keyring() {
    if FALLBACK_ACTIVE.swap(true, Ordering::SeqCst) {
        return;
    }
    keyring::set_default_credential_builder(Box::new(InMemoryCredentialBuilder::default()));
    warn!("using in-memory keyring; secrets will not persist between runs");
}

impl CredentialBuilderApi for InMemoryCredentialBuilder {
    fn build(
        &self,
        target: Option<&str>,
        service: &str,
        user: &str,
    ) -> keyring::Result<Box<Credential>> {
        Ok(Box::new(InMemoryCredential {
            key: EntryKey {
                target: target.map(str::to_string),
                service: service.to_string(),
                user: user.to_string(),
            },
            store: Arc::clone(&self.store),
        }))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn persistence(&self) -> CredentialPersistence {
        CredentialPersistence::ProcessOnly
    }
}

impl InMemoryCredential {
    fn secrets(&self) -> keyring::Result<std::sync::MutexGuard<'_, HashMap<EntryKey, Vec<u8>>>> {
        self.store
            .lock()
            .map_err(|_| KeyringError::PlatformFailure("in-memory keyring lock poisoned".into()))
    }
}

impl CredentialApi for InMemoryCredential {
    fn set_secret(&self, secret: &[u8]) -> keyring::Result<()> {
        self.secrets()?.insert(self.key.clone(), secret.to_vec());
        Ok(())
    }

    fn get_secret(&self) -> keyring::Result<Vec<u8>> {
        self.secrets()?
            .get(&self.key)
            .cloned()
            .ok_or(KeyringError::NoEntry)
    }

    fn delete_credential(&self) -> keyring::Result<()> {
        match self.secrets()?.remove(&self.key) {
            Some(_) => Ok(()),
            None => Err(KeyringError::NoEntry),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
