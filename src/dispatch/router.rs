use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::model::alert::ClassifiedAlert;

pub const DEFAULT_DESTINATION: &str = "default";

/// A resolved delivery target: the key it was found under and its webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedDestinations {
    webhooks: BTreeMap<String, String>,
    #[serde(default)]
    notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationSnapshot {
    pub webhooks: BTreeMap<String, String>,
    pub total_symbols: usize,
    pub has_default: bool,
}

/// Symbol → webhook mapping with a `default` fallback entry, optionally
/// backed by a JSON file that is rewritten on every change. Free-form
/// `notes` found in the file are carried through rewrites untouched.
pub struct DestinationBook {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, String>>,
    notes: BTreeMap<String, String>,
}

fn validate_url(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    let parsed = url::Url::parse(trimmed).map_err(|e| AppError::InvalidDestination {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(AppError::InvalidDestination {
            url: trimmed.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

fn normalize_key(symbol: &str) -> String {
    let key = symbol.trim();
    if key.eq_ignore_ascii_case(DEFAULT_DESTINATION) {
        DEFAULT_DESTINATION.to_string()
    } else {
        key.to_ascii_uppercase()
    }
}

impl DestinationBook {
    pub fn in_memory(entries: BTreeMap<String, String>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (normalize_key(&k), v))
            .collect();
        Self {
            path: None,
            entries: RwLock::new(entries),
            notes: BTreeMap::new(),
        }
    }

    /// Load from `path`; a missing file yields an empty book that will be
    /// created on the first write.
    pub fn load_from_path(path: &Path) -> Result<Self, AppError> {
        let persisted = if path.exists() {
            let payload = std::fs::read_to_string(path)?;
            serde_json::from_str::<PersistedDestinations>(&payload)?
        } else {
            PersistedDestinations::default()
        };
        let entries: BTreeMap<String, String> = persisted
            .webhooks
            .into_iter()
            .map(|(k, v)| (normalize_key(&k), v))
            .collect();
        tracing::info!(
            path = %path.display(),
            destinations = entries.len(),
            "Loaded destination book"
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: RwLock::new(entries),
            notes: persisted.notes,
        })
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let payload = PersistedDestinations {
            webhooks: entries.clone(),
            notes: self.notes.clone(),
        };
        let json = serde_json::to_string_pretty(&payload)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Symbol entry first, then `default`. Empty values count as unset.
    pub fn resolve(&self, symbol: &str) -> Option<Destination> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let key = normalize_key(symbol);
        let found = [key.as_str(), DEFAULT_DESTINATION]
            .into_iter()
            .find_map(|k| {
                entries
                    .get(k)
                    .filter(|url| !url.trim().is_empty())
                    .map(|url| Destination {
                        key: k.to_string(),
                        url: url.clone(),
                    })
            });
        found
    }

    /// Set or replace a destination. Returns `true` if an entry was replaced.
    pub fn set(&self, symbol: &str, url: &str) -> Result<bool, AppError> {
        let url = validate_url(url)?;
        let key = normalize_key(symbol);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let replaced = entries.insert(key.clone(), url).is_some();
        self.persist(&entries)?;
        tracing::info!(key = %key, replaced, "Destination updated");
        Ok(replaced)
    }

    /// Seed `default` when the book has none. Returns `true` if seeded.
    pub fn seed_default(&self, url: &str) -> Result<bool, AppError> {
        if self.resolve_default().is_some() {
            return Ok(false);
        }
        self.set(DEFAULT_DESTINATION, url)?;
        Ok(true)
    }

    fn resolve_default(&self) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(DEFAULT_DESTINATION)
            .filter(|url| !url.trim().is_empty())
            .cloned()
    }

    /// Remove a symbol's destination. The `default` entry is protected.
    pub fn remove(&self, symbol: &str) -> Result<bool, AppError> {
        let key = normalize_key(symbol);
        if key == DEFAULT_DESTINATION {
            return Err(AppError::ProtectedDestination(key));
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let removed = entries.remove(&key).is_some();
        if removed {
            self.persist(&entries)?;
            tracing::info!(key = %key, "Destination removed");
        }
        Ok(removed)
    }

    /// Configured symbols, excluding `default`.
    pub fn symbols(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .keys()
            .filter(|k| k.as_str() != DEFAULT_DESTINATION)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> DestinationSnapshot {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        DestinationSnapshot {
            webhooks: entries.clone(),
            total_symbols: entries
                .keys()
                .filter(|k| k.as_str() != DEFAULT_DESTINATION)
                .count(),
            has_default: entries.contains_key(DEFAULT_DESTINATION),
        }
    }
}

/// Resolves classified alerts to destinations.
#[derive(Clone)]
pub struct DispatchRouter {
    book: Arc<DestinationBook>,
}

impl DispatchRouter {
    pub fn new(book: Arc<DestinationBook>) -> Self {
        Self { book }
    }

    pub fn route(&self, alert: &ClassifiedAlert) -> Option<Destination> {
        self.route_symbol(&alert.symbol)
    }

    pub fn route_symbol(&self, symbol: &str) -> Option<Destination> {
        self.book.resolve(symbol)
    }
}
