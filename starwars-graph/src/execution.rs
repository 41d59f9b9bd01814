//! Query execution.
//!
//! The executor walks the bound selection tree of an operation, picks the
//! concrete kind of every character it meets, dispatches to the field
//! resolvers and assembles the response. A failing field only nulls its own
//! branch: the error is recorded against the field's path and siblings keep
//! resolving.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json_bytes::ByteString;

use crate::configuration::Configuration;
use crate::error::ResolveError;
use crate::graphql::Error;
use crate::graphql::Location;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::registry::Kind;
use crate::registry::TypeRegistry;
use crate::registry::EPISODE;
use crate::registry::QUERY;
use crate::registry::TYPENAME;
use crate::resolvers;
use crate::resolvers::Resolved;
use crate::spec::FieldType;
use crate::spec::InvalidValue;
use crate::spec::Query;
use crate::spec::Selection;
use crate::spec::SpecError;
use crate::store::CharacterRecord;
use crate::store::EntityStore;
use crate::store::EpisodeRecord;
use crate::traversal::Traversal;

/// Executes GraphQL requests against an [`EntityStore`].
///
/// The executor holds no per-request state and can be shared between threads.
#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn EntityStore>,
    configuration: Arc<Configuration>,
}

impl Executor {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            configuration: Arc::new(Configuration::default()),
        }
    }

    pub fn with_configuration(mut self, configuration: Configuration) -> Self {
        self.configuration = Arc::new(configuration);
        self
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Parses, binds and executes a request.
    ///
    /// Failures that prevent execution altogether (no query string, syntax
    /// errors, unknown operation, bad variables) produce a response without
    /// data.
    #[tracing::instrument(skip_all, level = "trace", fields(operation_name = ?request.operation_name))]
    pub fn execute(&self, request: &Request) -> Response {
        let Some(query) = request.query.as_deref() else {
            return request_error(vec![
                SpecError::MissingQuery.to_graphql_error(None, Vec::new())
            ]);
        };

        match Query::parse(query, TypeRegistry::global(), &self.configuration) {
            Ok(query) => {
                self.execute_query(&query, request.operation_name.as_deref(), &request.variables)
            }
            Err(error) => request_error(vec![error.to_graphql_error(None, Vec::new())]),
        }
    }

    /// Executes an operation of an already parsed query.
    #[tracing::instrument(skip_all, level = "trace")]
    pub fn execute_query(
        &self,
        query: &Query,
        operation_name: Option<&str>,
        variables: &Object,
    ) -> Response {
        let registry = TypeRegistry::global();
        let operation = match query.operation(operation_name) {
            Ok(operation) => operation,
            Err(error) => {
                failfast_debug!("can't find operation for {:?}", operation_name);
                return request_error(vec![error.to_graphql_error(None, Vec::new())]);
            }
        };

        let variables = match operation.coerce_variables(variables, registry) {
            Ok(variables) => variables,
            Err(errors) => return request_error(errors),
        };

        let mut parameters = ExecutionParameters {
            registry,
            store: self.store.as_ref(),
            configuration: &self.configuration,
            traversal: Traversal::new(
                self.store.as_ref(),
                self.configuration.traversal.deduplicate_friends,
            ),
            variables: &variables,
            errors: operation.validation_errors().to_vec(),
        };

        let data = parameters.execute_root(operation.selection_set());

        Response::builder()
            .data(data)
            .errors(parameters.errors)
            .build()
    }
}

fn request_error(errors: Vec<Error>) -> Response {
    Response::builder().errors(errors).build()
}

/// The response keys of a selection set, each with every field selected under it.
type CollectedFields<'s> = IndexMap<ByteString, Vec<&'s Selection>>;

struct ExecutionParameters<'a> {
    registry: &'a TypeRegistry,
    store: &'a dyn EntityStore,
    configuration: &'a Configuration,
    traversal: Traversal<'a>,
    variables: &'a Object,
    errors: Vec<Error>,
}

/// The parts of the first field selected under a response key.
struct FieldInfo<'s> {
    name: &'s str,
    arguments: Object,
    field_type: &'s FieldType,
    locations: Vec<Location>,
}

impl<'a> ExecutionParameters<'a> {
    fn field_info<'s>(&self, fields: &[&'s Selection]) -> Option<FieldInfo<'s>> {
        match *fields.first()? {
            Selection::Field {
                name,
                arguments,
                field_type,
                location,
                ..
            } => Some(FieldInfo {
                name: name.as_str(),
                arguments: arguments
                    .iter()
                    .map(|(name, value)| (name.as_str().into(), value.evaluate(self.variables)))
                    .collect(),
                field_type,
                locations: location.iter().copied().collect(),
            }),
            Selection::InlineFragment { .. } => None,
        }
    }

    // Spec: https://spec.graphql.org/draft/#CollectFields()
    fn collect_fields<'s>(
        &self,
        selection_set: &'s [Selection],
        runtime_type: &str,
        fields: &mut CollectedFields<'s>,
    ) {
        for selection in selection_set {
            if selection.include_skip().should_skip(self.variables) {
                continue;
            }
            match selection {
                Selection::Field { .. } => {
                    if let Some(response_key) = selection.response_key() {
                        fields
                            .entry(response_key.clone())
                            .or_default()
                            .push(selection);
                    }
                }
                Selection::InlineFragment {
                    type_condition,
                    selection_set,
                    ..
                } => {
                    if self
                        .registry
                        .does_fragment_type_apply(runtime_type, type_condition)
                    {
                        self.collect_fields(selection_set, runtime_type, fields);
                    }
                }
            }
        }
    }

    /// Collects the sub-selections of every field merged under one response key.
    fn collect_subfields<'s>(
        &self,
        fields: &[&'s Selection],
        runtime_type: &str,
    ) -> CollectedFields<'s> {
        let mut collected = IndexMap::new();
        for &field in fields {
            if let Selection::Field {
                selection_set: Some(selection_set),
                ..
            } = field
            {
                self.collect_fields(selection_set, runtime_type, &mut collected);
            }
        }
        collected
    }

    fn record(&mut self, error: &ResolveError, path: &Path, locations: Vec<Location>) {
        match error {
            ResolveError::UnknownKind { .. } | ResolveError::Store(_) => {
                failfast_error!(%path, %error, "resolution failed");
            }
            _ => tracing::debug!(%path, %error, "resolution failed"),
        }
        self.errors
            .push(error.to_graphql_error(Some(path.clone()), locations));
    }

    fn has_error_under(&self, path: &Path) -> bool {
        self.errors.iter().any(|error| {
            error
                .path
                .as_ref()
                .map(|error_path| error_path.0.starts_with(&path.0))
                .unwrap_or(false)
        })
    }

    fn execute_root(&mut self, selection_set: &[Selection]) -> Value {
        let mut fields = IndexMap::new();
        self.collect_fields(selection_set, QUERY, &mut fields);

        let mut output = Object::new();
        for (response_key, fields) in fields {
            let path = Path::empty().join(response_key.as_str());
            match self.execute_root_field(&fields, &path) {
                Ok(value) => {
                    output.insert(response_key, value);
                }
                // a non-null root field was null
                Err(InvalidValue) => return Value::Null,
            }
        }
        Value::Object(output)
    }

    fn execute_root_field(
        &mut self,
        fields: &[&Selection],
        path: &Path,
    ) -> Result<Value, InvalidValue> {
        let Some(info) = self.field_info(fields) else {
            return Ok(Value::Null);
        };
        if info.name == TYPENAME {
            return Ok(Value::String(QUERY.into()));
        }

        let resolved = match resolvers::resolve_root(
            info.name,
            &info.arguments,
            self.store,
            &self.configuration.heroes,
        ) {
            Ok(Some(record)) => Resolved::Character(record),
            Ok(None) => Resolved::Null,
            Err(error) => {
                self.record(&error, path, info.locations);
                return null_or_invalid(info.field_type);
            }
        };

        self.complete_value(QUERY, &info, resolved, fields, path)
    }

    /// Completes a resolved value against the field type.
    ///
    /// Returns `Err(InvalidValue)` when a null reaches a non-null position, so
    /// that the null bubbles up to the nearest nullable parent.
    fn complete_value(
        &mut self,
        parent_type: &str,
        info: &FieldInfo<'_>,
        resolved: Resolved,
        fields: &[&Selection],
        path: &Path,
    ) -> Result<Value, InvalidValue> {
        self.complete_typed(info.field_type, parent_type, info, resolved, fields, path)
    }

    fn complete_typed(
        &mut self,
        field_type: &FieldType,
        parent_type: &str,
        info: &FieldInfo<'_>,
        resolved: Resolved,
        fields: &[&Selection],
        path: &Path,
    ) -> Result<Value, InvalidValue> {
        match field_type {
            // for non null types, we complete with the inner type, then if we get a null
            // we immediately return an error instead of Ok(()), because we
            // want the error to go up until the next nullable parent
            FieldType::NonNull(inner_type) => {
                match self.complete_typed(inner_type, parent_type, info, resolved, fields, path)? {
                    Value::Null => {
                        if !self.has_error_under(path) {
                            let error = ResolveError::NonNullViolation {
                                type_name: parent_type.to_string(),
                                field: info.name.to_string(),
                            };
                            self.record(&error, path, info.locations.clone());
                        }
                        Err(InvalidValue)
                    }
                    value => Ok(value),
                }
            }

            // if the list contains nonnullable types, we will receive a Err(InvalidValue)
            // and should replace the entire list with null
            FieldType::List(inner_type) => match resolved {
                Resolved::List(items) => {
                    let mut output = Vec::with_capacity(items.len());
                    for (index, item) in items.into_iter().enumerate() {
                        let item_path = path.join(index);
                        match self.complete_typed(
                            inner_type,
                            parent_type,
                            info,
                            item,
                            fields,
                            &item_path,
                        ) {
                            Ok(value) => output.push(value),
                            Err(InvalidValue) => return Ok(Value::Null),
                        }
                    }
                    Ok(Value::Array(output))
                }
                _ => Ok(Value::Null),
            },

            FieldType::Named(_)
            | FieldType::String
            | FieldType::Int
            | FieldType::Float
            | FieldType::Id
            | FieldType::Boolean => match resolved {
                Resolved::Null | Resolved::List(_) => Ok(Value::Null),
                Resolved::Leaf(value) => Ok(value),
                // an object that failed to complete is null for its (nullable) parent
                Resolved::Character(record) => Ok(self
                    .complete_character(record, field_type, fields, path)
                    .unwrap_or(Value::Null)),
                Resolved::Episode(episode) => Ok(self
                    .complete_episode(episode, fields, path)
                    .unwrap_or(Value::Null)),
            },
        }
    }

    fn complete_character(
        &mut self,
        record: CharacterRecord,
        field_type: &FieldType,
        fields: &[&Selection],
        path: &Path,
    ) -> Result<Value, InvalidValue> {
        // object positions know their kind, interface positions classify
        let known_kind = field_type.inner_type_name().and_then(Kind::from_type_name);
        let kind = match known_kind {
            Some(kind) => kind,
            None => match self.registry.classify(&record) {
                Ok(kind) => kind,
                Err(error) => {
                    let locations = self
                        .field_info(fields)
                        .map(|info| info.locations)
                        .unwrap_or_default();
                    self.record(&error, path, locations);
                    return Ok(Value::Null);
                }
            },
        };
        let runtime_type = kind.type_name();

        let mut output = Object::new();
        for (response_key, subfields) in self.collect_subfields(fields, runtime_type) {
            let field_path = path.join(response_key.as_str());
            let Some(info) = self.field_info(&subfields) else {
                continue;
            };

            if info.name == TYPENAME {
                output.insert(response_key, Value::String(runtime_type.into()));
                continue;
            }

            let resolved = match resolvers::resolver(kind, info.name) {
                Some(resolver) => resolver(kind, &record, &info.arguments, &self.traversal),
                None => Err(SpecError::InvalidField(
                    info.name.to_string(),
                    runtime_type.to_string(),
                )
                .into()),
            };
            let value = match resolved {
                Ok(resolved) => {
                    self.complete_value(runtime_type, &info, resolved, &subfields, &field_path)?
                }
                Err(error) => {
                    self.record(&error, &field_path, info.locations.clone());
                    null_or_invalid(info.field_type)?
                }
            };
            output.insert(response_key, value);
        }

        Ok(Value::Object(output))
    }

    fn complete_episode(
        &mut self,
        episode: EpisodeRecord,
        fields: &[&Selection],
        path: &Path,
    ) -> Result<Value, InvalidValue> {
        let mut output = Object::new();
        for (response_key, subfields) in self.collect_subfields(fields, EPISODE) {
            let field_path = path.join(response_key.as_str());
            let Some(info) = self.field_info(&subfields) else {
                continue;
            };

            if info.name == TYPENAME {
                output.insert(response_key, Value::String(EPISODE.into()));
                continue;
            }

            let value = match resolvers::episode_field(&episode, info.name) {
                Some(resolved) => {
                    self.complete_value(EPISODE, &info, resolved, &subfields, &field_path)?
                }
                None => {
                    let error: ResolveError =
                        SpecError::InvalidField(info.name.to_string(), EPISODE.to_string()).into();
                    self.record(&error, &field_path, info.locations.clone());
                    null_or_invalid(info.field_type)?
                }
            };
            output.insert(response_key, value);
        }

        Ok(Value::Object(output))
    }
}

/// The value of a field whose resolver failed: null, which bubbles for non-null fields.
fn null_or_invalid(field_type: &FieldType) -> Result<Value, InvalidValue> {
    if field_type.is_non_null() {
        Err(InvalidValue)
    } else {
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::error::StoreError;
    use crate::store::InMemoryStore;
    use crate::store::MockEntityStore;
    use crate::store::Seed;

    fn starwars() -> Executor {
        Executor::new(Arc::new(InMemoryStore::starwars().unwrap()))
    }

    fn run(executor: &Executor, query: &str) -> Value {
        let response = executor.execute(&Request::builder().query(query).build());
        serde_json_bytes::to_value(&response).unwrap()
    }

    fn record(id: &str, discriminator: Option<&str>) -> CharacterRecord {
        CharacterRecord {
            id: id.to_string(),
            discriminator: discriminator.map(str::to_string),
            name: Some(format!("character {id}")),
            home_planet: None,
            primary_function: None,
        }
    }

    #[test]
    fn hero_friends_in_id_order() {
        assert_eq!(
            run(&starwars(), "{ hero { id friends { id name } } }"),
            json!({
                "data": {
                    "hero": {
                        "id": "2001",
                        "friends": [
                            {"id": "1000", "name": "Luke Skywalker"},
                            {"id": "1002", "name": "Han Solo"},
                            {"id": "1003", "name": "Leia Organa"},
                            {"id": "2000", "name": "C-3PO"},
                            {"id": "2002", "name": "BB-8"}
                        ]
                    }
                }
            })
        );
    }

    #[test]
    fn merges_fields_with_the_same_response_key() {
        let value = run(
            &starwars(),
            "{ hero { name } hero { id ... on Droid { name primaryFunction } } }",
        );
        let expected = json!({
            "data": {
                "hero": {"name": "R2-D2", "id": "2001", "primaryFunction": "Astromech"}
            }
        });
        assert!(crate::json_ext::ValueExt::eq_and_ordered(&value, &expected));
    }

    #[test]
    fn skip_and_include() {
        let executor = starwars();
        let request = Request::builder()
            .query("query ($withFriends: Boolean!) { hero { name friends @include(if: $withFriends) { name } id @skip(if: true) } }")
            .variable("withFriends", false)
            .build();
        assert_eq!(
            serde_json_bytes::to_value(executor.execute(&request)).unwrap(),
            json!({"data": {"hero": {"name": "R2-D2"}}})
        );
    }

    #[test]
    fn unknown_kind_only_nulls_its_subtree() {
        let seed = Seed {
            characters: vec![
                record("2001", Some("droid")),
                record("1000", Some("human")),
                record("3000", Some("wookiee")),
            ],
            friends: vec![
                ("2001".to_string(), "1000".to_string()),
                ("2001".to_string(), "3000".to_string()),
            ],
            ..Default::default()
        };
        let executor = Executor::new(Arc::new(InMemoryStore::from_seed(seed).unwrap()));

        insta::assert_json_snapshot!(
            executor.execute(&Request::builder().query("{ hero { friends { name } } }").build()),
            @r###"
        {
          "data": {
            "hero": {
              "friends": [
                {
                  "name": "character 1000"
                },
                null
              ]
            }
          },
          "errors": [
            {
              "message": "character '3000' has a missing or unrecognized species discriminator",
              "locations": [
                {
                  "line": 1,
                  "column": 10
                }
              ],
              "path": [
                "hero",
                "friends",
                1
              ],
              "extensions": {
                "id": "3000",
                "discriminator": "wookiee",
                "code": "UNKNOWN_KIND"
              }
            }
          ]
        }
        "###
        );
    }

    #[test]
    fn store_failure_is_local_to_its_path() {
        let mut store = MockEntityStore::new();
        store
            .expect_get_entity_by_id()
            .returning(|id| Ok(Some(record(id, Some("droid")))));
        store.expect_friend_edges_of().returning(|_| {
            Err(StoreError::Unavailable {
                reason: "edge collection offline".to_string(),
            })
        });
        store.expect_appearance_edges_from().returning(|_| Ok(vec!["NewHope".to_string()]));
        store.expect_get_episode_by_id().returning(|id| {
            Ok(Some(EpisodeRecord {
                id: id.to_string(),
                title: Some("A New Hope".to_string()),
                description: None,
            }))
        });

        let executor = Executor::new(Arc::new(store));
        let value = run(
            &executor,
            "{ hero { name friends { name } appearsIn { title } } }",
        );
        assert_eq!(
            value,
            json!({
                "data": {
                    "hero": {
                        "name": "character 2001",
                        "friends": null,
                        "appearsIn": [{"title": "A New Hope"}]
                    }
                },
                "errors": [{
                    "message": "store lookup failed: edge collection offline",
                    "locations": [{"line": 1, "column": 15}],
                    "path": ["hero", "friends"],
                    "extensions": {"code": "STORE_ERROR"}
                }]
            })
        );
    }

    #[test]
    fn missing_optional_attributes_are_null() {
        let mut store = MockEntityStore::new();
        store
            .expect_get_entity_by_id()
            .returning(|id| Ok(Some(record(id, Some("droid")))));
        store
            .expect_appearance_edges_from()
            .returning(|_| Ok(vec!["Empire".to_string()]));
        store.expect_get_episode_by_id().returning(|id| {
            Ok(Some(EpisodeRecord {
                id: id.to_string(),
                title: None,
                description: None,
            }))
        });

        let executor = Executor::new(Arc::new(store));
        let value = run(&executor, "{ hero { id appearsIn { id title } } }");
        assert_eq!(
            value,
            json!({
                "data": {
                    "hero": {
                        "id": "2001",
                        "appearsIn": [{"id": "Empire", "title": null}]
                    }
                }
            })
        );
    }

    #[test]
    fn non_null_violation_bubbles_to_the_nearest_nullable_parent() {
        let store = InMemoryStore::default();
        let mut parameters = ExecutionParameters {
            registry: TypeRegistry::global(),
            store: &store,
            configuration: &Configuration::default(),
            traversal: Traversal::new(&store, false),
            variables: &Object::new(),
            errors: Vec::new(),
        };
        let non_null_string = FieldType::NonNull(Box::new(FieldType::String));
        let info = FieldInfo {
            name: "nicknames",
            arguments: Object::new(),
            field_type: &FieldType::List(Box::new(non_null_string)),
            locations: Vec::new(),
        };
        let path = Path::from_keys(&["hero", "nicknames"]);

        let value = parameters.complete_value(
            "Droid",
            &info,
            Resolved::List(vec![Resolved::Leaf(json!("Artoo")), Resolved::Null]),
            &[],
            &path,
        );
        assert_eq!(value.unwrap(), Value::Null);
        assert_eq!(parameters.errors.len(), 1);
        assert_eq!(
            parameters.errors[0].path,
            Some(Path::from_keys(&["hero", "nicknames"]).join(1))
        );
        assert_eq!(
            parameters.errors[0].message,
            "cannot return null for non-nullable field 'Droid.nicknames'"
        );
    }

    #[test]
    fn hero_not_found() {
        let mut store = MockEntityStore::new();
        store.expect_get_entity_by_id().returning(|_| Ok(None));
        let executor = Executor::new(Arc::new(store));

        assert_eq!(
            run(&executor, "{ hero { name } droid(id: \"2001\") { name } }"),
            json!({
                "data": {"hero": null, "droid": null},
                "errors": [{
                    "message": "no character found for the canonical id '2001'",
                    "locations": [{"line": 1, "column": 3}],
                    "path": ["hero"],
                    "extensions": {"id": "2001", "code": "NOT_FOUND"}
                }]
            })
        );
    }

    #[test]
    fn invalid_species_argument() {
        let value = run(
            &starwars(),
            r#"{ human(id: "1000") { name friends(species: "PLANT") { name } } }"#,
        );
        assert_eq!(
            value["data"],
            json!({"human": {"name": "Luke Skywalker", "friends": null}})
        );
        assert_eq!(value["errors"][0]["path"], json!(["human", "friends"]));
        assert_eq!(
            value["errors"][0]["extensions"]["code"],
            json!("INVALID_ARGUMENT")
        );
    }

    #[test]
    fn request_level_errors_have_no_data() {
        let executor = starwars();
        let value = run(&executor, "{ hero { name }");
        assert_eq!(value["data"], Value::Null);
        assert_eq!(
            value["errors"][0]["extensions"],
            json!({"code": "GRAPHQL_PARSE_FAILED"})
        );
        assert!(value["errors"][0].get("path").is_none());

        let response = executor.execute(&Request::builder().build());
        assert_eq!(response.data, None);
        assert_eq!(response.errors[0].message, "must provide query string");

        let response = executor.execute(
            &Request::builder()
                .query("query A { hero { name } }")
                .operation_name("B")
                .build(),
        );
        assert_eq!(response.data, None);
        assert_eq!(
            response.errors[0].extension_code().as_deref(),
            Some("GRAPHQL_UNKNOWN_OPERATION_NAME")
        );
    }

    #[test]
    fn deduplicated_friends() {
        let seed = Seed {
            characters: vec![record("2001", Some("droid")), record("1000", Some("human"))],
            friends: vec![
                ("2001".to_string(), "1000".to_string()),
                ("1000".to_string(), "2001".to_string()),
            ],
            ..Default::default()
        };
        let store = Arc::new(InMemoryStore::from_seed(seed).unwrap());

        let executor = Executor::new(store.clone());
        assert_eq!(
            run(&executor, "{ hero { friends { id } } }"),
            json!({"data": {"hero": {"friends": [{"id": "1000"}, {"id": "1000"}]}}})
        );

        let executor = Executor::new(store).with_configuration(
            Configuration::builder()
                .traversal(
                    crate::configuration::Traversal::builder()
                        .deduplicate_friends(true)
                        .build(),
                )
                .build(),
        );
        assert_eq!(
            run(&executor, "{ hero { friends { id } } }"),
            json!({"data": {"hero": {"friends": [{"id": "1000"}]}}})
        );
    }
}
