//! Durable key-value storage for the token pair
//!
//! Stores never fail loudly. When the backing medium is unusable they keep
//! serving from memory, so the session survives until the process (or page)
//! goes away but not beyond.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Key-value persistence used for credentials
pub trait TokenStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value
    fn set(&self, key: &str, value: &str);

    /// Delete a value; deleting a missing key is a no-op
    fn remove(&self, key: &str);

    /// Write several values; stores that can should do it in one operation
    fn set_many(&self, entries: &[(&str, &str)]) {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    /// Delete several values
    fn remove_many(&self, keys: &[&str]) {
        for key in keys {
            self.remove(key);
        }
    }

    /// Whether values written now will outlive the process
    fn is_durable(&self) -> bool {
        true
    }
}

fn lock_entries(entries: &Mutex<HashMap<String, String>>) -> MutexGuard<'_, HashMap<String, String>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-lifetime store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        lock_entries(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        lock_entries(&self.entries).insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        lock_entries(&self.entries).remove(key);
    }

    fn is_durable(&self) -> bool {
        false
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileTokenStore;

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use super::{TokenStore, lock_entries};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tracing::{debug, warn};

    /// JSON file on disk, mirrored in memory
    ///
    /// Every mutation rewrites the whole file through a temporary file and a
    /// rename, so a crash never leaves half a token pair behind.
    #[derive(Debug)]
    pub struct FileTokenStore {
        path: PathBuf,
        entries: Mutex<HashMap<String, String>>,
        durable: AtomicBool,
    }

    impl FileTokenStore {
        /// Open (or lazily create) the store at `path`
        pub fn open(path: impl Into<PathBuf>) -> Self {
            let path = path.into();
            let entries = load(&path);

            let durable = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    match std::fs::create_dir_all(parent) {
                        Ok(()) => true,
                        Err(err) => {
                            warn!(
                                "Token directory {} is unusable, keeping tokens in memory: {err}",
                                parent.display()
                            );
                            false
                        }
                    }
                }
                _ => true,
            };

            Self {
                path,
                entries: Mutex::new(entries),
                durable: AtomicBool::new(durable),
            }
        }

        /// Location of the backing file
        pub fn path(&self) -> &Path {
            &self.path
        }

        fn persist(&self, entries: &HashMap<String, String>) {
            match write_atomically(&self.path, entries) {
                Ok(()) => {
                    self.durable.store(true, Ordering::Relaxed);
                }
                Err(err) => {
                    if self.durable.swap(false, Ordering::Relaxed) {
                        warn!(
                            "Failed to write token file {}, session will not survive a restart: {err}",
                            self.path.display()
                        );
                    }
                }
            }
        }
    }

    fn load(path: &Path) -> HashMap<String, String> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
                warn!("Ignoring unreadable token file {}: {err}", path.display());
                HashMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token file at {}", path.display());
                HashMap::new()
            }
            Err(err) => {
                warn!("Failed to read token file {}: {err}", path.display());
                HashMap::new()
            }
        }
    }

    fn write_atomically(path: &Path, entries: &HashMap<String, String>) -> std::io::Result<()> {
        let content = serde_json::to_string_pretty(entries)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, path)
    }

    impl TokenStore for FileTokenStore {
        fn get(&self, key: &str) -> Option<String> {
            lock_entries(&self.entries).get(key).cloned()
        }

        fn set(&self, key: &str, value: &str) {
            self.set_many(&[(key, value)]);
        }

        fn remove(&self, key: &str) {
            self.remove_many(&[key]);
        }

        fn set_many(&self, pairs: &[(&str, &str)]) {
            let mut entries = lock_entries(&self.entries);
            for (key, value) in pairs {
                entries.insert((*key).to_string(), (*value).to_string());
            }
            self.persist(&entries);
        }

        fn remove_many(&self, keys: &[&str]) {
            let mut entries = lock_entries(&self.entries);
            let before = entries.len();
            for key in keys {
                entries.remove(*key);
            }
            if entries.len() != before {
                self.persist(&entries);
            }
        }

        fn is_durable(&self) -> bool {
            self.durable.load(Ordering::Relaxed)
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use browser::BrowserTokenStore;

#[cfg(target_arch = "wasm32")]
mod browser {
    use super::TokenStore;
    use gloo::storage::{LocalStorage, Storage};
    use tracing::warn;

    /// `window.localStorage`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct BrowserTokenStore;

    impl BrowserTokenStore {
        /// `localStorage` exists and can be opened (it cannot in some
        /// private browsing modes)
        pub fn available() -> bool {
            web_sys::window()
                .and_then(|window| window.local_storage().ok().flatten())
                .is_some()
        }
    }

    impl TokenStore for BrowserTokenStore {
        fn get(&self, key: &str) -> Option<String> {
            LocalStorage::raw().get_item(key).ok().flatten()
        }

        fn set(&self, key: &str, value: &str) {
            if LocalStorage::raw().set_item(key, value).is_err() {
                warn!("localStorage rejected write of {key}");
            }
        }

        fn remove(&self, key: &str) {
            LocalStorage::delete(key);
        }
    }
}

/// Pick the durable store for this platform, falling back to memory
#[cfg(not(target_arch = "wasm32"))]
pub fn open_token_store(path: Option<std::path::PathBuf>) -> Arc<dyn TokenStore> {
    if let Some(path) = path {
        return Arc::new(FileTokenStore::open(path));
    }
    warn!("No token file configured, session will not survive a restart");
    Arc::new(MemoryTokenStore::new())
}

/// Pick the durable store for this platform, falling back to memory
#[cfg(target_arch = "wasm32")]
pub fn open_token_store(_path: Option<std::path::PathBuf>) -> Arc<dyn TokenStore> {
    if BrowserTokenStore::available() {
        return Arc::new(BrowserTokenStore);
    }
    warn!("localStorage unavailable, session will not survive a reload");
    Arc::new(MemoryTokenStore::new())
}
