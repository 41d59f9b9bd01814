//! Relation lookups with filtering and deterministic ordering.

use crate::error::ResolveError;
use crate::registry::Kind;
use crate::store::CharacterRecord;
use crate::store::EntityStore;
use crate::store::EpisodeRecord;

/// Walks the friendship and appearance edges of the store.
///
/// Every operation is read-only, so calling it twice against an unchanged
/// store yields the same list.
#[derive(Clone, Copy)]
pub struct Traversal<'a> {
    store: &'a dyn EntityStore,
    deduplicate_friends: bool,
}

impl<'a> Traversal<'a> {
    pub fn new(store: &'a dyn EntityStore, deduplicate_friends: bool) -> Self {
        Self {
            store,
            deduplicate_friends,
        }
    }

    /// The friends of `entity_id` across edges of either direction, sorted by id.
    ///
    /// With a `species` filter only friends whose stored discriminator is the
    /// one of that kind are kept. An unknown entity has no friends.
    pub fn friends_of(
        &self,
        entity_id: &str,
        species: Option<Kind>,
    ) -> Result<Vec<CharacterRecord>, ResolveError> {
        if self.store.get_entity_by_id(entity_id)?.is_none() {
            tracing::debug!(entity_id, "no such character, no friends");
            return Ok(Vec::new());
        }

        let mut friends = Vec::new();
        for friend_id in self.store.friend_edges_of(entity_id)? {
            let Some(friend) = self.store.get_entity_by_id(&friend_id)? else {
                tracing::warn!(entity_id, %friend_id, "skipping dangling friendship edge");
                continue;
            };
            let keep = match species {
                Some(kind) => friend.discriminator.as_deref() == Some(kind.discriminator()),
                None => true,
            };
            if keep {
                friends.push(friend);
            }
        }

        // String ordering is byte ordering
        friends.sort_by(|a, b| a.id.cmp(&b.id));
        if self.deduplicate_friends {
            friends.dedup_by(|a, b| a.id == b.id);
        }
        Ok(friends)
    }

    /// The episodes `entity_id` appears in, following outbound edges only, sorted by id.
    pub fn appearances_of(&self, entity_id: &str) -> Result<Vec<EpisodeRecord>, ResolveError> {
        let mut episodes = Vec::new();
        for episode_id in self.store.appearance_edges_from(entity_id)? {
            match self.store.get_episode_by_id(&episode_id)? {
                Some(episode) => episodes.push(episode),
                None => {
                    tracing::warn!(entity_id, %episode_id, "skipping dangling appearance edge")
                }
            }
        }

        episodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(episodes)
    }
}
