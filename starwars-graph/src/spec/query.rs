//! Query parsing and binding.
//!
//! A [`Query`] holds one bound [`Operation`] per operation definition.
//! Binding resolves every selection against the [`TypeRegistry`], expands
//! named fragments at their use site and records validation errors with the
//! response path of the offending selection.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;

use apollo_parser::cst;
use apollo_parser::cst::CstNode;
use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;

use super::selection::name_of;
use super::InputValue;
use super::IncludeSkip;
use crate::configuration::Configuration;
use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::registry::TypeRegistry;
use crate::registry::QUERY;
use crate::registry::TYPENAME;
use crate::spec::FieldType;
use crate::spec::Selection;
use crate::spec::SpecError;

/// A parsed and bound GraphQL document.
#[derive(Debug, Clone)]
pub struct Query {
    operations: Vec<Operation>,
}

/// The kind of an operation definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<cst::OperationType> for OperationKind {
    // Spec: https://spec.graphql.org/draft/#OperationType
    fn from(operation_type: cst::OperationType) -> Self {
        if operation_type.mutation_token().is_some() {
            OperationKind::Mutation
        } else if operation_type.subscription_token().is_some() {
            OperationKind::Subscription
        } else {
            OperationKind::Query
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VariableDefinition {
    pub(crate) ty: FieldType,
    pub(crate) default_value: Option<Value>,
}

/// A bound operation.
#[derive(Debug, Clone)]
pub struct Operation {
    pub(crate) name: Option<String>,
    pub(crate) kind: OperationKind,
    pub(crate) selection_set: Vec<Selection>,
    pub(crate) variables: IndexMap<String, VariableDefinition>,
    /// Validation errors for the selections that were left out, in document order.
    pub(crate) errors: Vec<Error>,
}

impl Operation {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn selection_set(&self) -> &[Selection] {
        &self.selection_set
    }

    /// Validation errors recorded while binding the operation.
    pub fn validation_errors(&self) -> &[Error] {
        &self.errors
    }

    /// Applies defaults and checks the provided variables against their definitions.
    ///
    /// Variables that are not defined by the operation are dropped.
    pub(crate) fn coerce_variables(
        &self,
        provided: &Object,
        registry: &TypeRegistry,
    ) -> Result<Object, Vec<Error>> {
        let mut coerced = Object::new();
        let mut errors = Vec::new();

        for (name, definition) in &self.variables {
            match provided.get(name.as_str()) {
                Some(value) => {
                    if definition.ty.validate_input_value(value, registry).is_err() {
                        errors.push(
                            SpecError::InvalidVariable(name.clone())
                                .to_graphql_error(None, Vec::new()),
                        );
                    } else {
                        coerced.insert(name.as_str(), value.clone());
                    }
                }
                None => match &definition.default_value {
                    Some(default_value) => {
                        coerced.insert(name.as_str(), default_value.clone());
                    }
                    None if definition.ty.is_non_null() => errors.push(
                        SpecError::MissingVariable(name.clone(), definition.ty.to_string())
                            .to_graphql_error(None, Vec::new()),
                    ),
                    None => {}
                },
            }
        }

        if errors.is_empty() {
            Ok(coerced)
        } else {
            Err(errors)
        }
    }
}

impl SpecError {
    pub(crate) fn to_graphql_error(&self, path: Option<Path>, locations: Vec<Location>) -> Error {
        Error::builder()
            .message(self.to_string())
            .locations(locations)
            .and_path(path)
            .extension_code(self.extension_code())
            .extensions(self.custom_extension_details().unwrap_or_default())
            .build()
    }
}

impl Query {
    #[tracing::instrument(skip_all, level = "trace")]
    pub fn parse(
        query: impl Into<String>,
        registry: &TypeRegistry,
        configuration: &Configuration,
    ) -> Result<Self, SpecError> {
        let string = query.into();

        let parser = apollo_parser::Parser::new(string.as_str())
            .recursion_limit(configuration.limits.parser_recursion_limit);
        let tree = parser.parse();

        // Trace log recursion limit data
        let recursion_limit = tree.recursion_limit();
        tracing::trace!(?recursion_limit, "recursion limit data");

        let errors = tree
            .errors()
            .map(|err| err.message().to_string())
            .collect::<Vec<_>>();

        if !errors.is_empty() {
            let errors = errors.join(", ");
            failfast_debug!("parsing error(s): {}", errors);
            return Err(SpecError::ParsingError(errors));
        }

        let document = tree.document();
        let fragments: HashMap<String, cst::FragmentDefinition> = document
            .definitions()
            .filter_map(|definition| match definition {
                // Spec: https://spec.graphql.org/draft/#FragmentDefinition
                cst::Definition::FragmentDefinition(fragment) => {
                    let name = name_of(fragment.fragment_name()?.name())?;
                    Some((name, fragment))
                }
                _ => None,
            })
            .collect();

        let operations = document
            .definitions()
            .filter_map(|definition| match definition {
                cst::Definition::OperationDefinition(operation) => Some(operation),
                _ => None,
            })
            .map(|operation| {
                let mut binder = Binder {
                    registry,
                    source: string.as_str(),
                    fragments: &fragments,
                    max_depth: configuration.limits.max_depth,
                    max_selections: configuration.limits.max_selections,
                    selections: 0,
                    variables: HashSet::new(),
                    spreading: Vec::new(),
                    errors: Vec::new(),
                };
                binder.bind_operation(operation)
            })
            .collect::<Result<Vec<_>, SpecError>>()?;

        Ok(Query { operations })
    }

    /// Picks the operation to execute.
    ///
    /// Without a name the first operation of the document is executed.
    pub fn operation(&self, operation_name: Option<&str>) -> Result<&Operation, SpecError> {
        let operation = match operation_name {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name))
                .ok_or_else(|| SpecError::UnknownOperation(name.to_string()))?,
            None => self.operations.first().ok_or(SpecError::NoOperation)?,
        };

        match operation.kind {
            OperationKind::Query => Ok(operation),
            kind => Err(SpecError::UnsupportedOperation(kind.to_string())),
        }
    }
}

/// Computes the 1-based line and column of a node, skipping leading ignored tokens.
fn location_of(source: &str, node: &impl CstNode) -> Location {
    let start = u32::from(node.syntax().text_range().start()) as usize;
    let start = source
        .get(start..)
        .and_then(|rest| {
            rest.char_indices()
                .find(|(_, c)| !c.is_whitespace() && *c != ',' && *c != '\u{feff}')
                .map(|(index, _)| start + index)
        })
        .unwrap_or(start);

    let before = source.get(..start).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map(|current_line| current_line.chars().count())
        .unwrap_or_default()
        + 1;

    Location {
        line: line as u32,
        column: column as u32,
    }
}

/// A field already selected under a response key.
struct SelectedField {
    name: String,
    parent_type: String,
    field_type: FieldType,
    arguments: IndexMap<String, InputValue>,
    location: Location,
    /// Sub-selections of every field merged under this one.
    selections: MergedFields,
}

/// Fields of one selection set once fragments are flattened, by response key.
#[derive(Default)]
struct MergedFields(HashMap<String, Vec<SelectedField>>);

impl MergedFields {
    /// Finds the field `field` merges with, or records it under `response_key`.
    ///
    /// On a conflict returns the reason and the location of the field already selected.
    // Spec: https://spec.graphql.org/draft/#sec-Field-Selection-Merging
    fn merge(
        &mut self,
        registry: &TypeRegistry,
        response_key: &str,
        field: SelectedField,
    ) -> Result<&mut SelectedField, (String, Location)> {
        let fields = self.0.entry(response_key.to_string()).or_default();
        let mut merged_with = None;
        for (index, selected) in fields.iter().enumerate() {
            // two distinct object types never apply to the same value
            let exclusive = selected.parent_type != field.parent_type
                && !registry.is_interface(&selected.parent_type)
                && !registry.is_interface(&field.parent_type);
            if exclusive {
                if selected.field_type != field.field_type {
                    return Err((
                        format!(
                            "they return conflicting types '{}' and '{}'",
                            selected.field_type, field.field_type
                        ),
                        selected.location,
                    ));
                }
                continue;
            }
            if selected.name != field.name {
                return Err((
                    format!("'{}' and '{}' are different fields", selected.name, field.name),
                    selected.location,
                ));
            }
            if selected.arguments != field.arguments {
                return Err(("they have differing arguments".to_string(), selected.location));
            }
            merged_with.get_or_insert(index);
        }

        let index = match merged_with {
            Some(index) => index,
            None => {
                fields.push(field);
                fields.len() - 1
            }
        };
        Ok(&mut fields[index])
    }
}

struct Binder<'a> {
    registry: &'a TypeRegistry,
    source: &'a str,
    fragments: &'a HashMap<String, cst::FragmentDefinition>,
    max_depth: usize,
    max_selections: usize,
    /// Selections bound so far, fragment expansions included.
    selections: usize,
    /// Variables declared by the operation.
    variables: HashSet<String>,
    /// Names of the fragments currently being expanded.
    spreading: Vec<String>,
    errors: Vec<Error>,
}

impl<'a> Binder<'a> {
    fn bind_operation(&mut self, operation: cst::OperationDefinition) -> Result<Operation, SpecError> {
        let name = name_of(operation.name());
        let kind = operation
            .operation_type()
            .map(OperationKind::from)
            .unwrap_or(OperationKind::Query);

        let variables = operation
            .variable_definitions()
            .iter()
            .flat_map(|definitions| definitions.variable_definitions())
            .filter_map(|definition| {
                let name = name_of(definition.variable()?.name())?;
                Some((name, definition))
            })
            .map(|(name, definition)| {
                let ty = definition
                    .ty()
                    .ok_or_else(|| {
                        SpecError::InvalidType("node Type is not optional in the spec; qed".to_string())
                    })?
                    .try_into()?;
                let default_value = definition
                    .default_value()
                    .and_then(|default_value| default_value.value())
                    .map(|value| InputValue::from_cst(value).evaluate(&Object::new()));
                Ok((name, VariableDefinition { ty, default_value }))
            })
            .collect::<Result<IndexMap<_, _>, SpecError>>()?;
        self.variables = variables.keys().cloned().collect();

        // only queries have a root type to bind against
        let selection_set = if kind == OperationKind::Query {
            self.bind_selection_set(
                operation.selection_set(),
                QUERY,
                &Path::empty(),
                0,
                &mut MergedFields::default(),
            )?
        } else {
            Vec::new()
        };

        Ok(Operation {
            name,
            kind,
            selection_set,
            variables,
            errors: std::mem::take(&mut self.errors),
        })
    }

    fn validation_error(&mut self, error: SpecError, path: &Path, locations: Vec<Location>) {
        tracing::debug!(%path, %error, "invalid selection");
        let path = (!path.is_empty()).then(|| path.clone());
        self.errors.push(error.to_graphql_error(path, locations));
    }

    /// Returns the first variable in `names` the operation does not declare.
    fn undefined_variable<'v>(&self, mut names: impl Iterator<Item = &'v str>) -> Option<String> {
        names
            .find(|name| !self.variables.contains(*name))
            .map(str::to_string)
    }

    /// Records `field` under `response_key`, or a conflict error if it cannot share the key.
    fn merge_field<'m>(
        &mut self,
        merged: &'m mut MergedFields,
        response_key: &str,
        field: SelectedField,
        path: &Path,
    ) -> Option<&'m mut SelectedField> {
        let location = field.location;
        match merged.merge(self.registry, response_key, field) {
            Ok(selected) => Some(selected),
            Err((reason, first)) => {
                self.validation_error(
                    SpecError::FieldsConflict(response_key.to_string(), reason),
                    path,
                    vec![first, location],
                );
                None
            }
        }
    }

    fn bind_selection_set(
        &mut self,
        selection_set: Option<cst::SelectionSet>,
        parent_type: &str,
        path: &Path,
        depth: usize,
        merged: &mut MergedFields,
    ) -> Result<Vec<Selection>, SpecError> {
        if depth > self.max_depth {
            failfast_error!("selection processing recursion limit({}) exceeded", self.max_depth);
            return Err(SpecError::RecursionLimitExceeded);
        }

        let mut selections = Vec::new();
        for selection in selection_set.iter().flat_map(|set| set.selections()) {
            if let Some(selection) =
                self.bind_selection(selection, parent_type, path, depth + 1, merged)?
            {
                selections.push(selection);
            }
        }
        Ok(selections)
    }

    fn bind_selection(
        &mut self,
        selection: cst::Selection,
        parent_type: &str,
        path: &Path,
        depth: usize,
        merged: &mut MergedFields,
    ) -> Result<Option<Selection>, SpecError> {
        // Fragments are bound again at every use site, so nesting alone does not bound the work.
        self.selections += 1;
        if self.selections > self.max_selections {
            failfast_error!("selection limit({}) exceeded", self.max_selections);
            return Err(SpecError::SelectionLimitExceeded);
        }

        match selection {
            // Spec: https://spec.graphql.org/draft/#Field
            cst::Selection::Field(field) => self.bind_field(field, parent_type, path, depth, merged),
            // Spec: https://spec.graphql.org/draft/#InlineFragment
            cst::Selection::InlineFragment(inline_fragment) => {
                let include_skip = IncludeSkip::parse(inline_fragment.directives());
                if include_skip.statically_skipped() {
                    return Ok(None);
                }
                let location = location_of(self.source, &inline_fragment);
                let type_condition = inline_fragment
                    .type_condition()
                    .and_then(|condition| condition.named_type())
                    .and_then(|named| name_of(named.name()))
                    .unwrap_or_else(|| parent_type.to_string());

                self.bind_fragment(
                    type_condition,
                    include_skip,
                    inline_fragment.selection_set(),
                    parent_type,
                    path,
                    location,
                    depth,
                    merged,
                )
            }
            // Spec: https://spec.graphql.org/draft/#FragmentSpread
            cst::Selection::FragmentSpread(fragment_spread) => {
                let include_skip = IncludeSkip::parse(fragment_spread.directives());
                if include_skip.statically_skipped() {
                    return Ok(None);
                }
                let location = location_of(self.source, &fragment_spread);
                let Some(name) = fragment_spread
                    .fragment_name()
                    .and_then(|fragment_name| name_of(fragment_name.name()))
                else {
                    return Ok(None);
                };

                let fragments = self.fragments;
                let Some(definition) = fragments.get(&name) else {
                    self.validation_error(SpecError::UnknownFragment(name), path, vec![location]);
                    return Ok(None);
                };
                if self.spreading.contains(&name) {
                    return Err(SpecError::FragmentCycle(name));
                }

                let type_condition = definition
                    .type_condition()
                    .and_then(|condition| condition.named_type())
                    .and_then(|named| name_of(named.name()))
                    .unwrap_or_else(|| parent_type.to_string());

                self.spreading.push(name);
                let selection = self.bind_fragment(
                    type_condition,
                    include_skip,
                    definition.selection_set(),
                    parent_type,
                    path,
                    location,
                    depth,
                    merged,
                );
                self.spreading.pop();
                selection
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_fragment(
        &mut self,
        type_condition: String,
        include_skip: IncludeSkip,
        selection_set: Option<cst::SelectionSet>,
        parent_type: &str,
        path: &Path,
        location: Location,
        depth: usize,
        merged: &mut MergedFields,
    ) -> Result<Option<Selection>, SpecError> {
        let registry = self.registry;
        if !registry.is_composite(&type_condition) {
            self.validation_error(SpecError::UnknownType(type_condition), path, vec![location]);
            return Ok(None);
        }
        if !registry.is_fragment_possible(parent_type, &type_condition) {
            self.validation_error(
                SpecError::InapplicableFragment(type_condition, parent_type.to_string()),
                path,
                vec![location],
            );
            return Ok(None);
        }
        if let Some(name) = self.undefined_variable(include_skip.variables()) {
            self.validation_error(SpecError::UndefinedVariable(name), path, vec![location]);
            return Ok(None);
        }

        // Fields inside the fragment are checked against its own type condition, even
        // when the enclosing type is more precise.
        let selection_set =
            self.bind_selection_set(selection_set, &type_condition, path, depth, merged)?;

        // Can be empty with a statically skipped selection set
        if selection_set.is_empty() {
            return Ok(None);
        }

        Ok(Some(Selection::InlineFragment {
            type_condition,
            include_skip,
            selection_set,
        }))
    }

    fn unknown_field(&self, field_name: &str, parent_type: &str) -> SpecError {
        let registry = self.registry;
        if registry.is_interface(parent_type) {
            let implementations: Vec<&str> = registry
                .possible_types(parent_type)
                .into_iter()
                .filter(|ty| registry.field(ty, field_name).is_some())
                .collect();
            if !implementations.is_empty() {
                return SpecError::AbstractField(
                    field_name.to_string(),
                    parent_type.to_string(),
                    implementations.join("' or '"),
                );
            }
        }
        SpecError::InvalidField(field_name.to_string(), parent_type.to_string())
    }

    fn bind_field(
        &mut self,
        field: cst::Field,
        parent_type: &str,
        path: &Path,
        depth: usize,
        merged: &mut MergedFields,
    ) -> Result<Option<Selection>, SpecError> {
        let include_skip = IncludeSkip::parse(field.directives());
        if include_skip.statically_skipped() {
            return Ok(None);
        }
        let Some(name) = name_of(field.name()) else {
            return Ok(None);
        };
        let alias = field.alias().and_then(|alias| name_of(alias.name()));
        let response_key = alias.clone().unwrap_or_else(|| name.clone());
        let field_path = path.join(response_key.as_str());
        let location = location_of(self.source, &field);

        if let Some(variable) = self.undefined_variable(include_skip.variables()) {
            self.validation_error(
                SpecError::UndefinedVariable(variable),
                &field_path,
                vec![location],
            );
            return Ok(None);
        }

        if name == TYPENAME {
            if field.selection_set().is_some() {
                self.validation_error(
                    SpecError::LeafSelection(name, FieldType::String.to_string()),
                    &field_path,
                    vec![location],
                );
                return Ok(None);
            }
            let field_type = FieldType::NonNull(Box::new(FieldType::String));
            let selected = SelectedField {
                name: name.clone(),
                parent_type: parent_type.to_string(),
                field_type: field_type.clone(),
                arguments: IndexMap::new(),
                location,
                selections: MergedFields::default(),
            };
            if self
                .merge_field(merged, &response_key, selected, &field_path)
                .is_none()
            {
                return Ok(None);
            }
            return Ok(Some(Selection::Field {
                name: name.into(),
                alias: alias.map(Into::into),
                arguments: IndexMap::new(),
                selection_set: None,
                field_type,
                include_skip,
                location: Some(location),
            }));
        }

        let registry = self.registry;
        let Some(definition) = registry.field(parent_type, &name) else {
            let error = self.unknown_field(&name, parent_type);
            self.validation_error(error, &field_path, vec![location]);
            return Ok(None);
        };

        let mut arguments = IndexMap::new();
        for argument in field.arguments().iter().flat_map(|list| list.arguments()) {
            let Some(argument_name) = name_of(argument.name()) else {
                continue;
            };
            if definition.argument_definition(&argument_name).is_none() {
                self.validation_error(
                    SpecError::UnknownArgument(argument_name, name),
                    &field_path,
                    vec![location],
                );
                return Ok(None);
            }
            if let Some(value) = argument.value() {
                arguments.insert(argument_name, InputValue::from_cst(value));
            }
        }
        if let Some(missing) = definition
            .arguments
            .iter()
            .find(|argument| argument.is_required() && !arguments.contains_key(argument.name))
        {
            self.validation_error(
                SpecError::MissingArgument(name, missing.name.to_string(), missing.ty.to_string()),
                &field_path,
                vec![location],
            );
            return Ok(None);
        }
        if let Some(variable) =
            self.undefined_variable(arguments.values().flat_map(InputValue::variables))
        {
            self.validation_error(
                SpecError::UndefinedVariable(variable),
                &field_path,
                vec![location],
            );
            return Ok(None);
        }

        let field_type = definition.ty.clone();
        let inner_type = definition
            .ty
            .inner_type_name()
            .filter(|inner_type| registry.is_composite(inner_type));
        match inner_type {
            Some(_)
                if !field
                    .selection_set()
                    .is_some_and(|selection_set| selection_set.selections().next().is_some()) =>
            {
                self.validation_error(
                    SpecError::MissingSelectionSet(name, field_type.to_string()),
                    &field_path,
                    vec![location],
                );
                return Ok(None);
            }
            None if field.selection_set().is_some() => {
                self.validation_error(
                    SpecError::LeafSelection(name, field_type.to_string()),
                    &field_path,
                    vec![location],
                );
                return Ok(None);
            }
            _ => {}
        }

        let selected = SelectedField {
            name: name.clone(),
            parent_type: parent_type.to_string(),
            field_type: field_type.clone(),
            arguments: arguments.clone(),
            location,
            selections: MergedFields::default(),
        };
        let Some(selected) = self.merge_field(merged, &response_key, selected, &field_path) else {
            return Ok(None);
        };

        // same-keyed fields share one merged scope for their sub-selections
        let selection_set = match inner_type {
            Some(inner_type) => Some(self.bind_selection_set(
                field.selection_set(),
                inner_type,
                &field_path,
                depth,
                &mut selected.selections,
            )?),
            None => None,
        };

        Ok(Some(Selection::Field {
            name: name.into(),
            alias: alias.map(Into::into),
            arguments,
            selection_set,
            field_type,
            include_skip,
            location: Some(location),
        }))
    }
}
