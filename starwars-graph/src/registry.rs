//! The type system selections are bound against.
//!
//! The registry is built once and never mutated afterwards, so a single
//! instance is shared by every request through [`TypeRegistry::global`].

use indexmap::IndexMap;
use indexmap::IndexSet;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ResolveError;
use crate::spec::FieldType;
use crate::store::CharacterRecord;

pub(crate) const TYPENAME: &str = "__typename";

pub(crate) const QUERY: &str = "Query";
pub(crate) const CHARACTER: &str = "Character";
pub(crate) const HUMAN: &str = "Human";
pub(crate) const DROID: &str = "Droid";
pub(crate) const EPISODE: &str = "Episode";
pub(crate) const SPECIES: &str = "Species";

static REGISTRY: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::new);

/// The concrete kind of a character.
///
/// This is a closed set: every match over it is exhaustive, adding a kind
/// means revisiting every resolver table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    Human,
    Droid,
}

impl Kind {
    pub const ALL: [Kind; 2] = [Kind::Human, Kind::Droid];

    /// The GraphQL object type implementing `Character` for this kind.
    pub fn type_name(self) -> &'static str {
        match self {
            Kind::Human => HUMAN,
            Kind::Droid => DROID,
        }
    }

    /// The discriminator value as it is stored on character documents.
    pub fn discriminator(self) -> &'static str {
        match self {
            Kind::Human => "human",
            Kind::Droid => "droid",
        }
    }

    /// The `Species` enum value exposed to clients.
    pub fn enum_value(self) -> &'static str {
        match self {
            Kind::Human => "HUMAN",
            Kind::Droid => "DROID",
        }
    }

    /// Exact match on the stored discriminator.
    pub fn from_discriminator(value: &str) -> Option<Kind> {
        Kind::ALL
            .into_iter()
            .find(|kind| kind.discriminator() == value)
    }

    /// Parses a `species` argument: the enum value or the stored discriminator,
    /// in any case.
    pub fn from_enum_value(value: &str) -> Option<Kind> {
        Kind::ALL
            .into_iter()
            .find(|kind| kind.enum_value().eq_ignore_ascii_case(value))
    }

    pub fn from_type_name(name: &str) -> Option<Kind> {
        Kind::ALL.into_iter().find(|kind| kind.type_name() == name)
    }
}

/// An argument accepted by a field.
#[derive(Debug, Clone)]
pub struct ArgumentDefinition {
    pub name: &'static str,
    pub ty: FieldType,
}

impl ArgumentDefinition {
    fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty }
    }

    pub fn is_required(&self) -> bool {
        self.ty.is_non_null()
    }
}

/// A field of a composite type.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: &'static str,
    pub ty: FieldType,
    pub arguments: Vec<ArgumentDefinition>,
}

impl FieldDefinition {
    fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            arguments: Vec::new(),
        }
    }

    fn argument(mut self, name: &'static str, ty: FieldType) -> Self {
        self.arguments.push(ArgumentDefinition::new(name, ty));
        self
    }

    pub fn argument_definition(&self, name: &str) -> Option<&ArgumentDefinition> {
        self.arguments.iter().find(|argument| argument.name == name)
    }
}

/// An object or interface type.
#[derive(Debug, Clone)]
pub struct CompositeType {
    pub name: &'static str,
    pub is_interface: bool,
    pub implements: Vec<&'static str>,
    fields: IndexMap<&'static str, FieldDefinition>,
}

impl CompositeType {
    fn object(name: &'static str, fields: Vec<FieldDefinition>) -> Self {
        Self {
            name,
            is_interface: false,
            implements: Vec::new(),
            fields: fields.into_iter().map(|field| (field.name, field)).collect(),
        }
    }

    fn interface(name: &'static str, fields: Vec<FieldDefinition>) -> Self {
        Self {
            is_interface: true,
            ..Self::object(name, fields)
        }
    }

    fn implementing(mut self, interface: &'static str) -> Self {
        self.implements.push(interface);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }
}

/// Declares the polymorphic entity kinds, their fields, and the
/// discriminator used to pick a concrete kind at runtime.
#[derive(Debug)]
pub struct TypeRegistry {
    types: IndexMap<&'static str, CompositeType>,
    enums: IndexMap<&'static str, Vec<&'static str>>,
    kind_fields: IndexMap<Kind, IndexSet<&'static str>>,
}

fn named(name: &str) -> FieldType {
    FieldType::Named(name.to_string())
}

fn non_null(ty: FieldType) -> FieldType {
    FieldType::NonNull(Box::new(ty))
}

fn list(ty: FieldType) -> FieldType {
    FieldType::List(Box::new(ty))
}

fn character_fields() -> Vec<FieldDefinition> {
    vec![
        FieldDefinition::new("id", non_null(FieldType::String)),
        FieldDefinition::new("species", non_null(named(SPECIES))),
        FieldDefinition::new("name", FieldType::String),
        FieldDefinition::new("friends", list(named(CHARACTER))).argument("species", named(SPECIES)),
        FieldDefinition::new("appearsIn", list(named(EPISODE))),
    ]
}

impl TypeRegistry {
    fn new() -> Self {
        let query = CompositeType::object(
            QUERY,
            vec![
                FieldDefinition::new("hero", named(CHARACTER))
                    .argument("episode", FieldType::String),
                FieldDefinition::new("human", named(HUMAN))
                    .argument("id", non_null(FieldType::String)),
                FieldDefinition::new("droid", named(DROID))
                    .argument("id", non_null(FieldType::String)),
            ],
        );

        let character = CompositeType::interface(CHARACTER, character_fields());

        let mut human_fields = character_fields();
        human_fields.push(FieldDefinition::new("homePlanet", FieldType::String));
        let human = CompositeType::object(HUMAN, human_fields).implementing(CHARACTER);

        let mut droid_fields = character_fields();
        droid_fields.push(FieldDefinition::new("primaryFunction", FieldType::String));
        let droid = CompositeType::object(DROID, droid_fields).implementing(CHARACTER);

        let episode = CompositeType::object(
            EPISODE,
            vec![
                FieldDefinition::new("id", non_null(FieldType::String)),
                FieldDefinition::new("title", FieldType::String),
                FieldDefinition::new("description", FieldType::String),
            ],
        );

        let types: IndexMap<_, _> = [query, character, human, droid, episode]
            .into_iter()
            .map(|ty| (ty.name, ty))
            .collect();

        let kind_fields = Kind::ALL
            .into_iter()
            .map(|kind| {
                let fields = types
                    .get(kind.type_name())
                    .map(|ty| ty.fields.keys().copied().collect())
                    .unwrap_or_default();
                (kind, fields)
            })
            .collect();

        let mut enums = IndexMap::new();
        enums.insert(
            SPECIES,
            Kind::ALL.into_iter().map(Kind::enum_value).collect(),
        );

        TypeRegistry {
            types,
            enums,
            kind_fields,
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static TypeRegistry {
        &REGISTRY
    }

    /// Determines the concrete kind of a stored character.
    ///
    /// This only ever looks at the discriminator.
    pub fn classify(&self, record: &CharacterRecord) -> Result<Kind, ResolveError> {
        record
            .discriminator
            .as_deref()
            .and_then(Kind::from_discriminator)
            .ok_or_else(|| ResolveError::UnknownKind {
                id: record.id.clone(),
                discriminator: record.discriminator.clone(),
            })
    }

    /// The fields that can be requested on a concrete kind.
    pub fn fields_of(&self, kind: Kind) -> &IndexSet<&'static str> {
        &self.kind_fields[&kind]
    }

    pub fn get(&self, type_name: &str) -> Option<&CompositeType> {
        self.types.get(type_name)
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        self.get(type_name).and_then(|ty| ty.field(field_name))
    }

    pub fn is_interface(&self, type_name: &str) -> bool {
        self.get(type_name).map(|ty| ty.is_interface).unwrap_or(false)
    }

    pub fn is_composite(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn enum_values(&self, type_name: &str) -> Option<&[&'static str]> {
        self.enums.get(type_name).map(Vec::as_slice)
    }

    /// The object types a value at a `type_name` position may have at runtime.
    pub fn possible_types(&self, type_name: &str) -> Vec<&'static str> {
        match self.get(type_name) {
            Some(ty) if ty.is_interface => self
                .types
                .values()
                .filter(|candidate| candidate.implements.iter().any(|name| *name == type_name))
                .map(|candidate| candidate.name)
                .collect(),
            Some(ty) => vec![ty.name],
            None => Vec::new(),
        }
    }

    /// Whether a fragment with `type_condition` applies to an object of `runtime_type`.
    pub fn does_fragment_type_apply(&self, runtime_type: &str, type_condition: &str) -> bool {
        runtime_type == type_condition
            || self
                .get(runtime_type)
                .map(|ty| ty.implements.iter().any(|name| *name == type_condition))
                .unwrap_or(false)
    }

    /// Whether a fragment on `type_condition` can ever match inside a selection on `parent_type`.
    pub fn is_fragment_possible(&self, parent_type: &str, type_condition: &str) -> bool {
        let parent = self.possible_types(parent_type);
        self.possible_types(type_condition)
            .iter()
            .any(|ty| parent.contains(ty))
    }
}
