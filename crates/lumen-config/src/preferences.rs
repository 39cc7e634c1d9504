//! Observable user preferences persisted through a [`KeyValueStore`].
//!
//! Every setting is stored under its own key and persisted independently:
//! there is no transaction spanning several settings, and a failed write of
//! one setting never blocks the others.

use std::sync::Arc;

use lumen_core::{Observable, Subscription};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError};
use crate::PreferencesConfig;

pub const DARK_MODE_KEY: &str = "ui.darkMode";
pub const DENSE_MODE_KEY: &str = "ui.denseMode";
pub const VM_DEVELOPER_MODE_KEY: &str = "ui.vmDeveloperMode";
pub const HOVER_EVAL_MODE_KEY: &str = "inspector.hoverEvalMode";
pub const CUSTOM_PUB_ROOTS_KEY: &str = "inspector.customPubRootDirectories";

/// A single persisted, observable setting.
pub struct Preference<T> {
    key: &'static str,
    value: Observable<T>,
    store: Arc<dyn KeyValueStore>,
}

impl<T> Preference<T>
where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Hydrate the setting from `store`, falling back to `default` when the key
    /// is missing, unreadable or holds a value of the wrong shape.
    async fn load(store: Arc<dyn KeyValueStore>, key: &'static str, default: T) -> Self {
        let value = match store.get_value(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(
                        target: "lumen.config",
                        key,
                        error = %err,
                        "ignoring malformed stored preference"
                    );
                    default
                }
            },
            Ok(None) => default,
            Err(err) => {
                tracing::warn!(
                    target: "lumen.config",
                    key,
                    error = %err,
                    "failed to read preference; using default"
                );
                default
            }
        };

        Self {
            key,
            value: Observable::new(value),
            store,
        }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn get(&self) -> T {
        self.value.get()
    }

    /// Observable handle for presentation code.
    pub fn observable(&self) -> Observable<T> {
        self.value.clone()
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.value.subscribe(listener)
    }

    /// Update the in-memory value (notifying subscribers) and persist it.
    ///
    /// The in-memory value stays updated even when persisting fails; the error
    /// is logged and returned so callers can surface it.
    pub async fn set(&self, value: T) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&value)
            .map_err(|err| StoreError::Other(format!("failed to encode {}: {err}", self.key)))?;
        if !self.value.set(value) {
            return Ok(());
        }

        let result = self.store.set_value(self.key, &encoded).await;
        if let Err(err) = &result {
            tracing::warn!(
                target: "lumen.config",
                key = self.key,
                error = %err,
                "failed to persist preference"
            );
        }
        result
    }
}

/// Preferences for one front-end instance.
///
/// Construct once with [`Preferences::load`] and pass it to the components that
/// need it.
pub struct Preferences {
    pub dark_mode: Preference<bool>,
    pub dense_mode: Preference<bool>,
    pub vm_developer_mode: Preference<bool>,
    pub hover_eval_mode: Preference<bool>,
    pub custom_pub_roots: Preference<Vec<String>>,
    /// Serializes read-modify-write edits of `custom_pub_roots`.
    pub_roots_edit: Mutex<()>,
}

impl Preferences {
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            dark_mode: Preference::load(Arc::clone(&store), DARK_MODE_KEY, true).await,
            dense_mode: Preference::load(Arc::clone(&store), DENSE_MODE_KEY, false).await,
            vm_developer_mode: Preference::load(Arc::clone(&store), VM_DEVELOPER_MODE_KEY, false)
                .await,
            hover_eval_mode: Preference::load(Arc::clone(&store), HOVER_EVAL_MODE_KEY, true).await,
            custom_pub_roots: Preference::load(store, CUSTOM_PUB_ROOTS_KEY, Vec::new()).await,
            pub_roots_edit: Mutex::new(()),
        }
    }

    /// Preferences backed by the JSON file named in `config`, or kept in memory
    /// when no file is configured.
    pub async fn from_config(config: &PreferencesConfig) -> Result<Self, StoreError> {
        match &config.path {
            Some(path) => {
                let store = JsonFileStore::open(path).await?;
                tracing::debug!(
                    target: "lumen.config",
                    path = %store.path().display(),
                    "loading preferences"
                );
                Ok(Self::load(Arc::new(store)).await)
            }
            None => Ok(Self::in_memory().await),
        }
    }

    /// Preferences that are never written anywhere.
    pub async fn in_memory() -> Self {
        Self::load(Arc::new(MemoryStore::new())).await
    }

    pub async fn add_pub_root(&self, directory: &str) -> Result<(), StoreError> {
        let _edit = self.pub_roots_edit.lock().await;
        let mut roots = self.custom_pub_roots.get();
        if roots.iter().any(|root| root == directory) {
            return Ok(());
        }
        roots.push(directory.to_string());
        self.custom_pub_roots.set(roots).await
    }

    pub async fn remove_pub_root(&self, directory: &str) -> Result<(), StoreError> {
        let _edit = self.pub_roots_edit.lock().await;
        let mut roots = self.custom_pub_roots.get();
        roots.retain(|root| root != directory);
        self.custom_pub_roots.set(roots).await
    }
}
