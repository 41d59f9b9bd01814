use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::CharacterRecord;
use super::EntityStore;
use super::EpisodeRecord;
use crate::error::StoreError;

/// The documents and edges provisioned into a store.
///
/// The layout follows the provisioning script of the Star Wars dataset:
/// friendships are key pairs, appearances list the episodes of each character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Seed {
    #[serde(default)]
    pub episodes: Vec<EpisodeRecord>,
    #[serde(default)]
    pub characters: Vec<CharacterRecord>,
    /// Undirected friendship edges.
    #[serde(default)]
    pub friends: Vec<(String, String)>,
    /// Appearance edges, grouped by character.
    #[serde(default)]
    pub appears_in: Vec<(String, Vec<String>)>,
}

const STARWARS: &str = include_str!("../testdata/starwars.json");

impl Seed {
    pub fn from_json(seed: &str) -> Result<Self, StoreError> {
        serde_json::from_str(seed).map_err(|error| StoreError::MalformedSeed {
            reason: error.to_string(),
        })
    }

    pub fn from_yaml(seed: &str) -> Result<Self, StoreError> {
        serde_yaml::from_str(seed).map_err(|error| StoreError::MalformedSeed {
            reason: error.to_string(),
        })
    }

    /// The Star Wars dataset.
    pub fn starwars() -> Result<Self, StoreError> {
        Self::from_json(STARWARS)
    }
}

/// A store holding every document in memory.
///
/// Edges are kept exactly as seeded, duplicates included, and indexed once by
/// endpoint.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    characters: BTreeMap<String, CharacterRecord>,
    episodes: BTreeMap<String, EpisodeRecord>,
    friends: HashMap<String, Vec<String>>,
    appearances: HashMap<String, Vec<String>>,
}

fn insert_unique<T>(
    collection: &str,
    map: &mut BTreeMap<String, T>,
    key: String,
    value: T,
) -> Result<(), StoreError> {
    if map.contains_key(&key) {
        return Err(StoreError::DuplicateKey {
            collection: collection.to_string(),
            key,
        });
    }
    map.insert(key, value);
    Ok(())
}

impl InMemoryStore {
    /// Builds the store, rejecting documents that share a key.
    ///
    /// Edges are not checked against the documents: an edge to a missing
    /// document is a dangling edge the traversal skips.
    pub fn from_seed(seed: Seed) -> Result<Self, StoreError> {
        let mut store = InMemoryStore::default();

        for episode in seed.episodes {
            insert_unique("episodes", &mut store.episodes, episode.id.clone(), episode)?;
        }
        for character in seed.characters {
            insert_unique(
                "characters",
                &mut store.characters,
                character.id.clone(),
                character,
            )?;
        }

        for (from, to) in seed.friends {
            if from == to {
                store.friends.entry(from).or_default().push(to);
                continue;
            }
            store
                .friends
                .entry(from.clone())
                .or_default()
                .push(to.clone());
            store.friends.entry(to).or_default().push(from);
        }
        for (from, episodes) in seed.appears_in {
            store
                .appearances
                .entry(from)
                .or_default()
                .extend(episodes);
        }

        tracing::debug!(
            characters = store.characters.len(),
            episodes = store.episodes.len(),
            "in-memory store built"
        );
        Ok(store)
    }

    /// A store holding the Star Wars dataset.
    pub fn starwars() -> Result<Self, StoreError> {
        Self::from_seed(Seed::starwars()?)
    }
}

impl EntityStore for InMemoryStore {
    fn get_entity_by_id(&self, id: &str) -> Result<Option<CharacterRecord>, StoreError> {
        Ok(self.characters.get(id).cloned())
    }

    fn get_episode_by_id(&self, id: &str) -> Result<Option<EpisodeRecord>, StoreError> {
        Ok(self.episodes.get(id).cloned())
    }

    fn friend_edges_of(&self, entity_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.friends.get(entity_id).cloned().unwrap_or_default())
    }

    fn appearance_edges_from(&self, entity_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.appearances.get(entity_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(id: &str, discriminator: &str) -> CharacterRecord {
        CharacterRecord {
            id: id.to_string(),
            discriminator: Some(discriminator.to_string()),
            name: None,
            home_planet: None,
            primary_function: None,
        }
    }

    #[test]
    fn starwars_dataset() {
        let store = InMemoryStore::starwars().unwrap();

        let luke = store.get_entity_by_id("1000").unwrap().unwrap();
        assert_eq!(luke.name.as_deref(), Some("Luke Skywalker"));
        assert_eq!(luke.discriminator.as_deref(), Some("human"));
        assert_eq!(luke.home_planet.as_deref(), Some("Tatooine"));

        let r2 = store.get_entity_by_id("2001").unwrap().unwrap();
        assert_eq!(r2.primary_function.as_deref(), Some("Astromech"));
        assert!(store.get_entity_by_id("9999").unwrap().is_none());

        let new_hope = store.get_episode_by_id("NewHope").unwrap().unwrap();
        assert_eq!(new_hope.title.as_deref(), Some("A New Hope"));
    }

    #[test]
    fn friendship_edges_are_undirected() {
        let store = InMemoryStore::starwars().unwrap();
        let mut friends = store.friend_edges_of("2001").unwrap();
        friends.sort();
        assert_eq!(friends, ["1000", "1002", "1003", "2000", "2002"]);
        assert!(store.friend_edges_of("1000").unwrap().contains(&"2001".to_string()));
        assert!(store.friend_edges_of("9999").unwrap().is_empty());
    }

    #[test]
    fn appearance_edges_are_outbound() {
        let store = InMemoryStore::starwars().unwrap();
        assert_eq!(store.appearance_edges_from("1004").unwrap(), ["NewHope"]);
        assert!(store.appearance_edges_from("NewHope").unwrap().is_empty());
    }

    #[test]
    fn duplicate_edges_are_kept() {
        let seed = Seed {
            characters: vec![character("1", "human"), character("2", "droid")],
            friends: vec![
                ("1".to_string(), "2".to_string()),
                ("2".to_string(), "1".to_string()),
            ],
            ..Default::default()
        };
        let store = InMemoryStore::from_seed(seed).unwrap();
        assert_eq!(store.friend_edges_of("1").unwrap(), ["2", "2"]);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let seed = Seed {
            characters: vec![character("1", "human"), character("1", "droid")],
            ..Default::default()
        };
        assert_eq!(
            InMemoryStore::from_seed(seed).unwrap_err(),
            StoreError::DuplicateKey {
                collection: "characters".to_string(),
                key: "1".to_string(),
            }
        );
    }

    #[test]
    fn yaml_seed() {
        let seed = Seed::from_yaml(
            r#"
characters:
  - _key: "3000"
    $type: wookiee
    name: Chewbacca
friends:
  - ["3000", "1002"]
"#,
        )
        .unwrap();
        assert_eq!(seed.characters[0].discriminator.as_deref(), Some("wookiee"));
        assert_eq!(seed.friends, [("3000".to_string(), "1002".to_string())]);

        let error = Seed::from_json(r#"{"planets": []}"#).unwrap_err();
        assert!(matches!(error, StoreError::MalformedSeed { .. }));
    }
}
