//! Field resolvers.
//!
//! Every field of every concrete kind has exactly one resolver, looked up in a
//! table built once per process. Resolvers are pure functions of the record,
//! the field arguments and the store.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::configuration::Heroes;
use crate::error::ResolveError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::registry::Kind;
use crate::registry::TypeRegistry;
use crate::registry::QUERY;
use crate::spec::SpecError;
use crate::store::CharacterRecord;
use crate::store::EntityStore;
use crate::store::EpisodeRecord;
use crate::traversal::Traversal;

/// What a resolver produced, before completion against the field type.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Resolved {
    Null,
    Leaf(Value),
    Character(CharacterRecord),
    Episode(EpisodeRecord),
    List(Vec<Resolved>),
}

impl From<Option<String>> for Resolved {
    fn from(value: Option<String>) -> Self {
        value
            .map(|value| Resolved::Leaf(Value::String(value.into())))
            .unwrap_or(Resolved::Null)
    }
}

pub(crate) type Resolver =
    fn(Kind, &CharacterRecord, &Object, &Traversal<'_>) -> Result<Resolved, ResolveError>;

static RESOLVERS: Lazy<HashMap<Kind, HashMap<&'static str, Resolver>>> = Lazy::new(|| {
    let registry = TypeRegistry::global();
    let mut table: HashMap<Kind, HashMap<&'static str, Resolver>> = HashMap::new();
    for kind in Kind::ALL {
        for field in registry.fields_of(kind) {
            match resolver_for(kind, field) {
                Some(resolver) => {
                    table.entry(kind).or_default().insert(*field, resolver);
                }
                None => tracing::error!(%field, kind = kind.type_name(), "field has no resolver"),
            }
        }
    }
    table
});

fn resolver_for(kind: Kind, field: &str) -> Option<Resolver> {
    let resolver: Resolver = match (kind, field) {
        (_, "id") => resolve_id,
        (_, "species") => resolve_species,
        (_, "name") => resolve_name,
        (_, "friends") => resolve_friends,
        (_, "appearsIn") => resolve_appears_in,
        (Kind::Human, "homePlanet") => resolve_home_planet,
        (Kind::Droid, "primaryFunction") => resolve_primary_function,
        _ => return None,
    };
    Some(resolver)
}

/// The resolver of `field` on `kind`, if the kind has such a field.
pub(crate) fn resolver(kind: Kind, field: &str) -> Option<Resolver> {
    RESOLVERS
        .get(&kind)
        .and_then(|fields| fields.get(field))
        .copied()
}

fn resolve_id(
    _: Kind,
    record: &CharacterRecord,
    _: &Object,
    _: &Traversal<'_>,
) -> Result<Resolved, ResolveError> {
    Ok(Resolved::Leaf(Value::String(record.id.as_str().into())))
}

fn resolve_species(
    kind: Kind,
    _: &CharacterRecord,
    _: &Object,
    _: &Traversal<'_>,
) -> Result<Resolved, ResolveError> {
    Ok(Resolved::Leaf(Value::String(kind.enum_value().into())))
}

fn resolve_name(
    _: Kind,
    record: &CharacterRecord,
    _: &Object,
    _: &Traversal<'_>,
) -> Result<Resolved, ResolveError> {
    Ok(record.name.clone().into())
}

fn resolve_home_planet(
    _: Kind,
    record: &CharacterRecord,
    _: &Object,
    _: &Traversal<'_>,
) -> Result<Resolved, ResolveError> {
    Ok(record.home_planet.clone().into())
}

fn resolve_primary_function(
    _: Kind,
    record: &CharacterRecord,
    _: &Object,
    _: &Traversal<'_>,
) -> Result<Resolved, ResolveError> {
    Ok(record.primary_function.clone().into())
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Parses the `species` argument of `friends`.
fn species_argument(arguments: &Object) -> Result<Option<Kind>, ResolveError> {
    match arguments.get("species") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(species)) => Kind::from_enum_value(species.as_str())
            .map(Some)
            .ok_or_else(|| ResolveError::InvalidArgument {
                argument: "species".to_string(),
                reason: format!("expected HUMAN or DROID, got '{}'", species.as_str()),
            }),
        Some(other) => Err(ResolveError::InvalidArgument {
            argument: "species".to_string(),
            reason: format!("expected HUMAN or DROID, got {}", describe(other)),
        }),
    }
}

fn resolve_friends(
    _: Kind,
    record: &CharacterRecord,
    arguments: &Object,
    traversal: &Traversal<'_>,
) -> Result<Resolved, ResolveError> {
    let species = species_argument(arguments)?;
    Ok(Resolved::List(
        traversal
            .friends_of(&record.id, species)?
            .into_iter()
            .map(Resolved::Character)
            .collect(),
    ))
}

fn resolve_appears_in(
    _: Kind,
    record: &CharacterRecord,
    _: &Object,
    traversal: &Traversal<'_>,
) -> Result<Resolved, ResolveError> {
    Ok(Resolved::List(
        traversal
            .appearances_of(&record.id)?
            .into_iter()
            .map(Resolved::Episode)
            .collect(),
    ))
}

/// Projects a field of an episode.
pub(crate) fn episode_field(episode: &EpisodeRecord, field: &str) -> Option<Resolved> {
    Some(match field {
        "id" => Resolved::Leaf(Value::String(episode.id.as_str().into())),
        "title" => episode.title.clone().into(),
        "description" => episode.description.clone().into(),
        _ => return None,
    })
}

fn string_argument(arguments: &Object, argument: &str) -> Result<Option<String>, ResolveError> {
    match arguments.get(argument) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.as_str().to_string())),
        Some(other) => Err(ResolveError::InvalidArgument {
            argument: argument.to_string(),
            reason: format!("expected a string, got {}", describe(other)),
        }),
    }
}

/// Resolves a root field of the `Query` type to the record it starts from.
pub(crate) fn resolve_root(
    field: &str,
    arguments: &Object,
    store: &dyn EntityStore,
    heroes: &Heroes,
) -> Result<Option<CharacterRecord>, ResolveError> {
    match field {
        "hero" => {
            let episode = string_argument(arguments, "episode")?;
            let id = heroes.hero_id(episode.as_deref());
            store
                .get_entity_by_id(id)?
                .map(Some)
                .ok_or_else(|| ResolveError::NotFound { id: id.to_string() })
        }
        "human" => lookup_kind(Kind::Human, arguments, store),
        "droid" => lookup_kind(Kind::Droid, arguments, store),
        _ => Err(SpecError::InvalidField(field.to_string(), QUERY.to_string()).into()),
    }
}

fn lookup_kind(
    kind: Kind,
    arguments: &Object,
    store: &dyn EntityStore,
) -> Result<Option<CharacterRecord>, ResolveError> {
    let id = string_argument(arguments, "id")?.ok_or_else(|| ResolveError::InvalidArgument {
        argument: "id".to_string(),
        reason: "expected a non-null string".to_string(),
    })?;

    match store.get_entity_by_id(&id)? {
        Some(record) if record.discriminator.as_deref() == Some(kind.discriminator()) => {
            Ok(Some(record))
        }
        Some(record) => {
            tracing::debug!(
                %id,
                discriminator = ?record.discriminator,
                expected = kind.discriminator(),
                "character is of another kind"
            );
            Ok(None)
        }
        None => {
            tracing::debug!(%id, "no such character");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::error::StoreError;
    use crate::store::InMemoryStore;
    use crate::store::MockEntityStore;

    fn arguments(value: Value) -> Object {
        match value {
            Value::Object(object) => object,
            _ => panic!("arguments must be an object"),
        }
    }

    fn ids(resolved: Resolved) -> Vec<String> {
        let Resolved::List(items) = resolved else {
            panic!("expected a list");
        };
        items
            .into_iter()
            .map(|item| match item {
                Resolved::Character(record) => record.id,
                Resolved::Episode(episode) => episode.id,
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn every_field_has_a_resolver() {
        let registry = TypeRegistry::global();
        for kind in Kind::ALL {
            for field in registry.fields_of(kind) {
                assert!(resolver(kind, field).is_some(), "{kind:?}.{field}");
            }
        }
        assert!(resolver(Kind::Human, "primaryFunction").is_none());
        assert!(resolver(Kind::Droid, "homePlanet").is_none());
    }

    #[test]
    fn scalar_projections() {
        let store = InMemoryStore::starwars().unwrap();
        let traversal = Traversal::new(&store, false);
        let threepio = store.get_entity_by_id("2000").unwrap().unwrap();
        let none = Object::new();

        let project = |field: &str| {
            resolver(Kind::Droid, field).unwrap()(Kind::Droid, &threepio, &none, &traversal).unwrap()
        };
        assert_eq!(project("id"), Resolved::Leaf(json!("2000")));
        assert_eq!(project("species"), Resolved::Leaf(json!("DROID")));
        assert_eq!(project("name"), Resolved::Leaf(json!("C-3PO")));
        assert_eq!(project("primaryFunction"), Resolved::Leaf(json!("Protocol")));

        let han = store.get_entity_by_id("1002").unwrap().unwrap();
        let home_planet = resolver(Kind::Human, "homePlanet").unwrap();
        assert_eq!(
            home_planet(Kind::Human, &han, &none, &traversal).unwrap(),
            Resolved::Null
        );
    }

    #[test]
    fn friends_species_argument() {
        let store = InMemoryStore::starwars().unwrap();
        let traversal = Traversal::new(&store, false);
        let luke = store.get_entity_by_id("1000").unwrap().unwrap();
        let friends = resolver(Kind::Human, "friends").unwrap();

        for species in [json!("DROID"), json!("droid")] {
            let resolved = friends(
                Kind::Human,
                &luke,
                &arguments(json!({ "species": species })),
                &traversal,
            )
            .unwrap();
            assert_eq!(ids(resolved), ["2000", "2001"]);
        }

        let error = friends(
            Kind::Human,
            &luke,
            &arguments(json!({"species": "PLANT"})),
            &traversal,
        )
        .unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid value for argument 'species': expected HUMAN or DROID, got 'PLANT'"
        );
    }

    #[test]
    fn appears_in() {
        let store = InMemoryStore::starwars().unwrap();
        let traversal = Traversal::new(&store, false);
        let finn = store.get_entity_by_id("1005").unwrap().unwrap();
        let appears_in = resolver(Kind::Human, "appearsIn").unwrap();
        assert_eq!(
            ids(appears_in(Kind::Human, &finn, &Object::new(), &traversal).unwrap()),
            ["Awakens"]
        );
    }

    #[test]
    fn hero_by_episode() {
        let store = InMemoryStore::starwars().unwrap();
        let heroes = Heroes::default();
        let hero = |episode: Value| {
            resolve_root("hero", &arguments(json!({ "episode": episode })), &store, &heroes)
                .unwrap()
                .unwrap()
                .id
        };
        assert_eq!(hero(json!("NewHope")), "1000");
        assert_eq!(hero(json!("Awakens")), "2002");
        assert_eq!(hero(json!("Empire")), "2001");
        assert_eq!(hero(json!(null)), "2001");
        assert_eq!(
            resolve_root("hero", &Object::new(), &store, &heroes)
                .unwrap()
                .unwrap()
                .id,
            "2001"
        );
    }

    #[test]
    fn hero_not_found() {
        let mut store = MockEntityStore::new();
        store.expect_get_entity_by_id().returning(|_| Ok(None));
        let error = resolve_root("hero", &Object::new(), &store, &Heroes::default()).unwrap_err();
        assert_eq!(
            error,
            ResolveError::NotFound {
                id: "2001".to_string()
            }
        );
    }

    #[test]
    fn lookup_by_kind() {
        let store = InMemoryStore::starwars().unwrap();
        let heroes = Heroes::default();
        let lookup = |field: &str, id: &str| {
            resolve_root(field, &arguments(json!({ "id": id })), &store, &heroes)
                .unwrap()
                .map(|record| record.id)
        };
        assert_eq!(lookup("human", "1000").as_deref(), Some("1000"));
        assert_eq!(lookup("droid", "2001").as_deref(), Some("2001"));
        assert_eq!(lookup("human", "2001"), None);
        assert_eq!(lookup("droid", "1000"), None);
        assert_eq!(lookup("human", "not a valid id"), None);
    }

    #[test]
    fn store_errors_are_returned() {
        let mut store = MockEntityStore::new();
        store.expect_get_entity_by_id().returning(|_| {
            Err(StoreError::Unavailable {
                reason: "timeout".to_string(),
            })
        });
        let error = resolve_root(
            "human",
            &arguments(json!({"id": "1000"})),
            &store,
            &Heroes::default(),
        )
        .unwrap_err();
        assert!(matches!(error, ResolveError::Store(_)));
    }
}
