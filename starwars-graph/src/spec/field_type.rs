use apollo_parser::cst;
use serde::Deserialize;
use serde::Serialize;

use crate::json_ext::Value;
use crate::registry::Kind;
use crate::registry::TypeRegistry;
use crate::spec::SpecError;

#[derive(Debug)]
pub(crate) struct InvalidValue;

// Primitives are taken from scalars: https://spec.graphql.org/draft/#sec-Scalars
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Named type {0}
    Named(String),
    /// List type {0}
    List(Box<FieldType>),
    /// Non null type {0}
    NonNull(Box<FieldType>),
    /// String
    String,
    /// Int
    Int,
    /// Float
    Float,
    /// Id
    Id,
    /// Boolean
    Boolean,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Named(ty) => write!(f, "{ty}"),
            FieldType::List(ty) => write!(f, "[{ty}]"),
            FieldType::NonNull(ty) => write!(f, "{ty}!"),
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Id => write!(f, "ID"),
            FieldType::Boolean => write!(f, "Boolean"),
        }
    }
}

fn is_valid_int_input(value: &Value) -> bool {
    // GraphQL Int is a signed 32-bit integer
    value
        .as_i64()
        .map(|int| i32::try_from(int).is_ok())
        .unwrap_or(false)
}

impl FieldType {
    // This function validates input values according to the graphql specification.
    // Each of the values are validated against the "input coercion" rules.
    pub(crate) fn validate_input_value(
        &self,
        value: &Value,
        registry: &TypeRegistry,
    ) -> Result<(), InvalidValue> {
        match (self, value) {
            (FieldType::NonNull(inner_ty), value) => {
                if value.is_null() {
                    Err(InvalidValue)
                } else {
                    inner_ty.validate_input_value(value, registry)
                }
            }
            // NOTE: graphql's types are all optional by default
            (_, Value::Null) => Ok(()),
            (FieldType::String, Value::String(_)) => Ok(()),
            // Spec: https://spec.graphql.org/June2018/#sec-Int
            (FieldType::Int, maybe_int) if is_valid_int_input(maybe_int) => Ok(()),
            // Spec: https://spec.graphql.org/draft/#sec-Float.Input-Coercion
            (FieldType::Float, Value::Number(_)) => Ok(()),
            (FieldType::Id, Value::String(_)) => Ok(()),
            (FieldType::Id, maybe_int) if is_valid_int_input(maybe_int) => Ok(()),
            (FieldType::Boolean, Value::Bool(_)) => Ok(()),
            (FieldType::List(inner_ty), Value::Array(vec)) => vec
                .iter()
                .try_for_each(|x| inner_ty.validate_input_value(x, registry)),
            // For coercion from single value to list
            (FieldType::List(inner_ty), val) => inner_ty.validate_input_value(val, registry),
            (FieldType::Named(name), Value::String(s)) if registry.enum_values(name).is_some() => {
                // `Species` values may arrive as the stored discriminator too
                if Kind::from_enum_value(s.as_str()).is_some() {
                    Ok(())
                } else {
                    Err(InvalidValue)
                }
            }
            _ => Err(InvalidValue),
        }
    }

    /// return the name of the type on which selections happen
    ///
    /// Example if we get the field `friends: [Character]`, it will return "Character"
    pub(crate) fn inner_type_name(&self) -> Option<&str> {
        match self {
            FieldType::Named(name) => Some(name.as_str()),
            FieldType::List(inner) | FieldType::NonNull(inner) => inner.inner_type_name(),
            FieldType::String
            | FieldType::Int
            | FieldType::Float
            | FieldType::Id
            | FieldType::Boolean => None,
        }
    }

    pub(crate) fn is_non_null(&self) -> bool {
        matches!(self, FieldType::NonNull(_))
    }
}

impl TryFrom<cst::Type> for FieldType {
    type Error = SpecError;
    // Spec: https://spec.graphql.org/draft/#sec-Type-References
    fn try_from(ty: cst::Type) -> Result<Self, Self::Error> {
        match ty {
            cst::Type::NamedType(named) => named.try_into(),
            cst::Type::ListType(list) => list.try_into(),
            cst::Type::NonNullType(non_null) => non_null.try_into(),
        }
    }
}

impl TryFrom<cst::NamedType> for FieldType {
    type Error = SpecError;
    // Spec: https://spec.graphql.org/draft/#NamedType
    fn try_from(named: cst::NamedType) -> Result<Self, Self::Error> {
        let name = named
            .name()
            .ok_or_else(|| {
                SpecError::InvalidType("the node Name is not optional in the spec; qed".to_string())
            })?
            .text()
            .to_string();
        Ok(match name.as_str() {
            "String" => Self::String,
            "Int" => Self::Int,
            "Float" => Self::Float,
            "ID" => Self::Id,
            "Boolean" => Self::Boolean,
            _ => Self::Named(name),
        })
    }
}

impl TryFrom<cst::ListType> for FieldType {
    type Error = SpecError;

    // Spec: https://spec.graphql.org/draft/#ListType
    fn try_from(list: cst::ListType) -> Result<Self, Self::Error> {
        Ok(Self::List(Box::new(
            list.ty()
                .ok_or_else(|| {
                    SpecError::InvalidType("node Type is not optional in the spec; qed".to_string())
                })?
                .try_into()?,
        )))
    }
}

impl TryFrom<cst::NonNullType> for FieldType {
    type Error = SpecError;

    // Spec: https://spec.graphql.org/draft/#NonNullType
    fn try_from(non_null: cst::NonNullType) -> Result<Self, Self::Error> {
        if let Some(list) = non_null.list_type() {
            Ok(Self::NonNull(Box::new(list.try_into()?)))
        } else if let Some(named) = non_null.named_type() {
            Ok(Self::NonNull(Box::new(named.try_into()?)))
        } else {
            Err(SpecError::InvalidType(
                "either the NamedType node is provided, either the ListType node; qed".to_string(),
            ))
        }
    }
}
