//! Access to the externally owned character, episode and edge collections.

mod memory;

pub use memory::InMemoryStore;
pub use memory::Seed;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;

pub use crate::error::StoreError;

/// A stored character document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRecord {
    /// The document key.
    #[serde(rename = "_key")]
    pub id: String,

    /// The stored species discriminator, `human` or `droid` for valid documents.
    #[serde(rename = "$type", default)]
    pub discriminator: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_planet: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_function: Option<String>,
}

/// A stored episode document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    #[serde(rename = "_key")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Lookup and traversal operations over the stored graph.
///
/// Implementations are read-only from the executor's point of view and may be
/// shared between concurrent requests.
#[cfg_attr(test, automock)]
pub trait EntityStore: Send + Sync {
    /// Fetches a character document by key.
    fn get_entity_by_id(&self, id: &str) -> Result<Option<CharacterRecord>, StoreError>;

    /// Fetches an episode document by key.
    fn get_episode_by_id(&self, id: &str) -> Result<Option<EpisodeRecord>, StoreError>;

    /// Keys of the characters sharing a friendship edge with `entity_id`, in
    /// either direction. One entry per edge, unordered.
    fn friend_edges_of(&self, entity_id: &str) -> Result<Vec<String>, StoreError>;

    /// Keys of the episodes `entity_id` has an outbound appearance edge to.
    /// One entry per edge, unordered.
    fn appearance_edges_from(&self, entity_id: &str) -> Result<Vec<String>, StoreError>;
}
