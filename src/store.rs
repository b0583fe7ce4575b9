//! Read-only entity source: contacts and the tag registry from a JSON export.

use crate::graph::types::{Entity, Tag};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoreFile {
    contacts: Vec<Entity>,
    /// Absent means the registry was never customised
    tags: Option<Vec<Tag>>,
}

/// Live contacts and known tags
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityStore {
    pub entities: Vec<Entity>,
    pub tags: Vec<Tag>,
}

impl EntityStore {
    /// Parse a `{contacts, tags}` document. Soft-deleted contacts are dropped.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: StoreFile =
            serde_json::from_str(json).map_err(|e| format!("Failed to parse contacts: {}", e))?;

        let total = file.contacts.len();
        let entities: Vec<Entity> = file
            .contacts
            .into_iter()
            .filter(|c| c.deleted_at.is_none())
            .collect();
        if entities.len() < total {
            tracing::debug!("Skipped {} deleted contacts", total - entities.len());
        }

        Ok(Self {
            entities,
            tags: file.tags.unwrap_or_else(initial_tags),
        })
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let store = Self::from_json(&contents)?;
        tracing::info!(
            "Loaded {} contacts and {} tags from {:?}",
            store.entities.len(),
            store.tags.len(),
            path
        );
        Ok(store)
    }
}

/// Registry used before the user has defined any tags
pub fn initial_tags() -> Vec<Tag> {
    [
        ("t1", "Friend"),
        ("t2", "Colleague"),
        ("t3", "Investor"),
        ("t4", "Family"),
        ("t5", "Lead"),
    ]
    .into_iter()
    .map(|(id, name)| Tag {
        id: id.to_string(),
        name: name.to_string(),
    })
    .collect()
}
