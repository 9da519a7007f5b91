//! The document store: one JSON file per concern under the data directory.
//!
//! Layout:
//!
//! ```text
//! <data_dir>/
//!   maps/<goal-slug>.json    one habit map per goal
//!   board.json
//!   history.json
//!   topics.json
//!   rewards.json
//! ```
//!
//! Writes are atomic (temp file + rename). Every document carries a
//! `schema` number; map documents additionally fall back to the legacy
//! two-pass shape on read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use habitgrid_core::board::{Board, ShuffleHistory};
use habitgrid_core::map::HabitMap;
use habitgrid_core::state::{AppState, RewardLedger};

use crate::config::StoreConfig;
use crate::legacy;

/// Current schema for map documents. Schema 1 was the two-pass shape.
pub const MAP_SCHEMA: u32 = 2;

/// Schema for every other document type.
pub const DOC_SCHEMA: u32 = 1;

/// Errors from reading or writing documents.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document at {path}: {detail}")]
    Malformed { path: PathBuf, detail: String },

    #[error("unsupported schema {found} at {path} (expected {expected})")]
    UnsupportedSchema {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

/// Versioned envelope around every persisted document.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    schema: u32,
    payload: T,
}

/// On-disk shapes a map file may hold. The current envelope is attempted
/// first; a bare legacy document falls through to the second variant.
#[derive(Deserialize)]
#[serde(untagged)]
enum MapDocument {
    Current(Envelope<HabitMap>),
    Legacy(legacy::LegacyMapDoc),
}

/// Filesystem-backed document store.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Open a store at the configured data directory, creating it (and the
    /// maps subdirectory) as needed.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let store = Self {
            root: config.data_dir.clone(),
        };
        std::fs::create_dir_all(store.maps_dir()).map_err(|e| StoreError::Io {
            path: store.maps_dir(),
            source: e,
        })?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn maps_dir(&self) -> PathBuf {
        self.root.join("maps")
    }

    fn map_path(&self, goal: &str) -> PathBuf {
        self.maps_dir().join(format!("{}.json", slug(goal)))
    }

    // -- maps --------------------------------------------------------------

    /// Load one goal's map, decoding the legacy shape when needed.
    /// `Ok(None)` when no document exists.
    pub fn load_map(&self, goal: &str) -> Result<Option<HabitMap>, StoreError> {
        let path = self.map_path(goal);
        let Some(text) = read_optional(&path)? else {
            return Ok(None);
        };

        let document: MapDocument =
            serde_json::from_str(&text).map_err(|e| StoreError::Malformed {
                path: path.clone(),
                detail: e.to_string(),
            })?;

        match document {
            MapDocument::Current(envelope) => {
                if envelope.schema != MAP_SCHEMA {
                    return Err(StoreError::UnsupportedSchema {
                        path,
                        found: envelope.schema,
                        expected: MAP_SCHEMA,
                    });
                }
                let mut map = envelope.payload;
                map.reparent_actions();
                Ok(Some(map))
            }
            MapDocument::Legacy(doc) => {
                debug!(path = %path.display(), "decoding legacy map document");
                let map = legacy::decode(doc).map_err(|e| StoreError::Malformed {
                    path,
                    detail: e.to_string(),
                })?;
                Ok(Some(map))
            }
        }
    }

    pub fn save_map(&self, map: &HabitMap) -> Result<(), StoreError> {
        write_doc(&self.map_path(&map.goal), MAP_SCHEMA, map)
    }

    pub fn delete_map(&self, goal: &str) -> Result<bool, StoreError> {
        let path = self.map_path(goal);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io { path, source: e }),
        }
    }

    /// Load every stored map, keyed by goal.
    pub fn load_all_maps(&self) -> Result<BTreeMap<String, HabitMap>, StoreError> {
        let dir = self.maps_dir();
        let entries = std::fs::read_dir(&dir).map_err(|e| StoreError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let mut maps = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io {
                path: dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = read_optional(&path)?.unwrap_or_default();
            let document: MapDocument =
                serde_json::from_str(&text).map_err(|e| StoreError::Malformed {
                    path: path.clone(),
                    detail: e.to_string(),
                })?;
            let map = match document {
                MapDocument::Current(envelope) => {
                    if envelope.schema != MAP_SCHEMA {
                        return Err(StoreError::UnsupportedSchema {
                            path,
                            found: envelope.schema,
                            expected: MAP_SCHEMA,
                        });
                    }
                    let mut map = envelope.payload;
                    map.reparent_actions();
                    map
                }
                MapDocument::Legacy(doc) => {
                    legacy::decode(doc).map_err(|e| StoreError::Malformed {
                        path,
                        detail: e.to_string(),
                    })?
                }
            };
            maps.insert(map.goal.clone(), map);
        }
        Ok(maps)
    }

    // -- singleton documents ----------------------------------------------

    pub fn load_board(&self) -> Result<Option<Board>, StoreError> {
        read_doc(&self.root.join("board.json"), DOC_SCHEMA)
    }

    pub fn save_board(&self, board: &Board) -> Result<(), StoreError> {
        write_doc(&self.root.join("board.json"), DOC_SCHEMA, board)
    }

    pub fn load_history(&self) -> Result<Option<ShuffleHistory>, StoreError> {
        read_doc(&self.root.join("history.json"), DOC_SCHEMA)
    }

    pub fn save_history(&self, history: &ShuffleHistory) -> Result<(), StoreError> {
        write_doc(&self.root.join("history.json"), DOC_SCHEMA, history)
    }

    pub fn load_topics(&self) -> Result<Option<Vec<String>>, StoreError> {
        read_doc(&self.root.join("topics.json"), DOC_SCHEMA)
    }

    pub fn save_topics(&self, topics: &[String]) -> Result<(), StoreError> {
        write_doc(&self.root.join("topics.json"), DOC_SCHEMA, &topics.to_vec())
    }

    pub fn load_rewards(&self) -> Result<Option<RewardLedger>, StoreError> {
        read_doc(&self.root.join("rewards.json"), DOC_SCHEMA)
    }

    pub fn save_rewards(&self, rewards: &RewardLedger) -> Result<(), StoreError> {
        write_doc(&self.root.join("rewards.json"), DOC_SCHEMA, rewards)
    }

    // -- whole state ------------------------------------------------------

    /// Assemble an [`AppState`] from everything on disk, with defaults for
    /// missing documents.
    pub fn load_state(&self) -> Result<AppState, StoreError> {
        let maps = self.load_all_maps()?;
        let board = self
            .load_board()?
            .unwrap_or_else(|| Board::new(habitgrid_core::board::DEFAULT_BOARD_SIZE));
        let history = self.load_history()?.unwrap_or_default();
        let topics = self.load_topics()?.unwrap_or_default();
        let rewards = self.load_rewards()?.unwrap_or_default();
        Ok(AppState::from_documents(maps, board, history, topics, rewards))
    }

    /// Persist every document of an [`AppState`].
    pub fn save_state(&self, state: &AppState) -> Result<(), StoreError> {
        for map in state.maps().values() {
            self.save_map(map)?;
        }
        self.save_board(&state.board)?;
        self.save_history(&state.history)?;
        self.save_topics(&state.blocked_topics)?;
        self.save_rewards(&state.rewards)
    }
}

/// Goal key to filename slug: lowercase alphanumerics, dashes elsewhere.
fn slug(goal: &str) -> String {
    let mut out = String::with_capacity(goal.len());
    let mut last_dash = true;
    for c in goal.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "goal".to_string()
    } else {
        trimmed.to_string()
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn read_doc<T: DeserializeOwned>(path: &Path, expected: u32) -> Result<Option<T>, StoreError> {
    let Some(text) = read_optional(path)? else {
        return Ok(None);
    };
    let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| StoreError::Malformed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    if envelope.schema != expected {
        return Err(StoreError::UnsupportedSchema {
            path: path.to_path_buf(),
            found: envelope.schema,
            expected,
        });
    }
    Ok(Some(envelope.payload))
}

/// Atomic write: serialize to a sibling temp file, then rename over the
/// target.
fn write_doc<T: Serialize>(path: &Path, schema: u32, payload: &T) -> Result<(), StoreError> {
    let envelope = Envelope { schema, payload };
    let text = serde_json::to_string_pretty(&envelope).map_err(|e| StoreError::Malformed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &text).map_err(|e| StoreError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
