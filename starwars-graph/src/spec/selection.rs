use apollo_parser::cst;
use apollo_parser::cst::CstNode;
use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;

use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::FieldType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    Field {
        name: ByteString,
        alias: Option<ByteString>,
        arguments: IndexMap<String, InputValue>,
        selection_set: Option<Vec<Selection>>,
        field_type: FieldType,
        include_skip: IncludeSkip,
        location: Option<Location>,
    },
    InlineFragment {
        // Optional in the document but we fill it with the current type if not specified.
        // Named fragment spreads are expanded into this variant.
        type_condition: String,
        include_skip: IncludeSkip,
        selection_set: Vec<Selection>,
    },
}

impl Selection {
    /// The key under which the selection lands in the response, for fields.
    pub(crate) fn response_key(&self) -> Option<&ByteString> {
        match self {
            Selection::Field { name, alias, .. } => Some(alias.as_ref().unwrap_or(name)),
            Selection::InlineFragment { .. } => None,
        }
    }

    pub(crate) fn include_skip(&self) -> &IncludeSkip {
        match self {
            Selection::Field { include_skip, .. }
            | Selection::InlineFragment { include_skip, .. } => include_skip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncludeSkip {
    include: Condition,
    skip: Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) enum Condition {
    Yes,
    No,
    Variable(String),
}

pub(crate) fn name_of(name: Option<cst::Name>) -> Option<String> {
    name.map(|name| name.text().to_string())
}

impl IncludeSkip {
    pub(crate) fn parse(directives: Option<cst::Directives>) -> Self {
        let mut include = None;
        let mut skip = None;
        for directive in directives.iter().flat_map(|d| d.directives()) {
            match name_of(directive.name()).as_deref() {
                Some("include") if include.is_none() => include = Condition::parse(&directive),
                Some("skip") if skip.is_none() => skip = Condition::parse(&directive),
                _ => {}
            }
        }
        Self {
            include: include.unwrap_or(Condition::Yes),
            skip: skip.unwrap_or(Condition::No),
        }
    }

    pub(crate) fn statically_skipped(&self) -> bool {
        matches!(self.skip, Condition::Yes) || matches!(self.include, Condition::No)
    }

    pub(crate) fn should_skip(&self, variables: &Object) -> bool {
        // Using .unwrap_or is legit here because
        // variable coercion should have already checked that
        // the variable is present and it is of the correct type
        self.skip.eval(variables).unwrap_or(false) || !self.include.eval(variables).unwrap_or(true)
    }

    /// Names of the variables the conditions refer to.
    pub(crate) fn variables(&self) -> impl Iterator<Item = &str> {
        [&self.include, &self.skip]
            .into_iter()
            .filter_map(|condition| match condition {
                Condition::Variable(name) => Some(name.as_str()),
                Condition::Yes | Condition::No => None,
            })
    }
}

impl Condition {
    pub(crate) fn parse(directive: &cst::Directive) -> Option<Self> {
        let argument = directive
            .arguments()?
            .arguments()
            .find(|argument| name_of(argument.name()).as_deref() == Some("if"))?;
        match argument.value()? {
            cst::Value::BooleanValue(boolean) if boolean.true_token().is_some() => {
                Some(Condition::Yes)
            }
            cst::Value::BooleanValue(_) => Some(Condition::No),
            cst::Value::Variable(variable) => name_of(variable.name()).map(Condition::Variable),
            _ => None,
        }
    }

    pub(crate) fn eval(&self, variables: &Object) -> Option<bool> {
        match self {
            Condition::Yes => Some(true),
            Condition::No => Some(false),
            Condition::Variable(variable_name) => variables
                .get(variable_name.as_str())
                .and_then(|v| v.as_bool()),
        }
    }
}

/// An argument value as written in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputValue {
    Variable(String),
    Const(Value),
    List(Vec<InputValue>),
    Object(Vec<(String, InputValue)>),
}

fn number_literal(node: &impl CstNode) -> Value {
    let text = node.syntax().text().to_string();
    let text = text.trim();
    if let Ok(int) = text.parse::<i64>() {
        return Value::Number(int.into());
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

impl InputValue {
    pub(crate) fn from_cst(value: cst::Value) -> Self {
        match value {
            cst::Value::Variable(variable) => {
                InputValue::Variable(name_of(variable.name()).unwrap_or_default())
            }
            cst::Value::StringValue(string) => {
                InputValue::Const(Value::String(String::from(string).into()))
            }
            cst::Value::IntValue(int) => InputValue::Const(number_literal(&int)),
            cst::Value::FloatValue(float) => InputValue::Const(number_literal(&float)),
            cst::Value::BooleanValue(boolean) => {
                InputValue::Const(Value::Bool(boolean.true_token().is_some()))
            }
            cst::Value::NullValue(_) => InputValue::Const(Value::Null),
            cst::Value::EnumValue(enum_value) => InputValue::Const(
                name_of(enum_value.name())
                    .map(|name| Value::String(name.into()))
                    .unwrap_or(Value::Null),
            ),
            cst::Value::ListValue(list) => {
                InputValue::List(list.values().map(InputValue::from_cst).collect())
            }
            cst::Value::ObjectValue(object) => InputValue::Object(
                object
                    .object_fields()
                    .filter_map(|field| {
                        Some((name_of(field.name())?, InputValue::from_cst(field.value()?)))
                    })
                    .collect(),
            ),
        }
    }

    /// Names of the variables used anywhere in the value.
    pub(crate) fn variables(&self) -> Vec<&str> {
        match self {
            InputValue::Variable(name) => vec![name.as_str()],
            InputValue::Const(_) => Vec::new(),
            InputValue::List(values) => values.iter().flat_map(InputValue::variables).collect(),
            InputValue::Object(fields) => fields
                .iter()
                .flat_map(|(_, value)| value.variables())
                .collect(),
        }
    }

    /// Replaces variables with their (already coerced) values.
    ///
    /// A variable absent from `variables` evaluates to null.
    pub(crate) fn evaluate(&self, variables: &Object) -> Value {
        match self {
            InputValue::Variable(name) => variables
                .get(name.as_str())
                .cloned()
                .unwrap_or(Value::Null),
            InputValue::Const(value) => value.clone(),
            InputValue::List(values) => Value::Array(
                values
                    .iter()
                    .map(|value| value.evaluate(variables))
                    .collect(),
            ),
            InputValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.as_str().into(), value.evaluate(variables)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    fn first_field(query: &str) -> cst::Field {
        let tree = apollo_parser::Parser::new(query).parse();
        assert_eq!(tree.errors().len(), 0);
        let document = tree.document();
        let Some(cst::Definition::OperationDefinition(operation)) =
            document.definitions().next()
        else {
            panic!("expected an operation");
        };
        let Some(cst::Selection::Field(field)) =
            operation.selection_set().unwrap().selections().next()
        else {
            panic!("expected a field");
        };
        field
    }

    #[test]
    fn include_skip_conditions() {
        let field = first_field("query($withName: Boolean) { hero @include(if: $withName) @skip(if: false) { id } }");
        let include_skip = IncludeSkip::parse(field.directives());
        assert!(!include_skip.statically_skipped());

        let mut variables = Object::new();
        assert!(include_skip.should_skip(&variables));
        variables.insert("withName", Value::Bool(true));
        assert!(!include_skip.should_skip(&variables));

        let field = first_field("{ hero @skip(if: true) { id } }");
        assert!(IncludeSkip::parse(field.directives()).statically_skipped());
    }

    #[test]
    fn referenced_variables() {
        let field = first_field(
            r#"{ hero(a: $episode, b: [1, $id], c: {x: {y: $nested}}, d: "$text") @skip(if: $hidden) { id } }"#,
        );
        let variables: Vec<_> = field
            .arguments()
            .unwrap()
            .arguments()
            .map(|argument| InputValue::from_cst(argument.value().unwrap()))
            .flat_map(|value| {
                value
                    .variables()
                    .into_iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(variables, ["episode", "id", "nested"]);

        let include_skip = IncludeSkip::parse(field.directives());
        assert_eq!(include_skip.variables().collect::<Vec<_>>(), ["hidden"]);
    }

    #[test]
    fn argument_values() {
        let field = first_field(
            r#"{ hero(a: "NewHope", b: 3, c: 1.5, d: DROID, e: null, f: [$id, true], g: {x: "y"}) { id } }"#,
        );
        let arguments: Vec<_> = field
            .arguments()
            .unwrap()
            .arguments()
            .map(|argument| InputValue::from_cst(argument.value().unwrap()))
            .collect();

        let mut variables = Object::new();
        variables.insert("id", json!("1000"));
        let values: Vec<_> = arguments
            .iter()
            .map(|value| value.evaluate(&variables))
            .collect();
        assert_eq!(
            Value::Array(values),
            json!(["NewHope", 3, 1.5, "DROID", null, ["1000", true], {"x": "y"}])
        );
    }
}
