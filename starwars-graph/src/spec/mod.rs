#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod field_type;
pub(crate) mod query;
mod selection;

use displaydoc::Display;
pub use field_type::*;
pub use query::Operation;
pub use query::OperationKind;
pub use query::Query;
pub use selection::*;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::graphql::ErrorExtension;
use crate::json_ext::Object;

/// GraphQL parsing and validation errors.
#[derive(Error, Debug, Display, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SpecError {
    /// parsing error: {0}
    ParsingError(String),
    /// selection processing recursion limit exceeded
    RecursionLimitExceeded,
    /// Maximum selections limit exceeded in this operation
    SelectionLimitExceeded,
    /// cannot spread fragment '{0}' within itself
    FragmentCycle(String),
    /// cannot query field '{0}' on type '{1}'
    InvalidField(String, String),
    /// cannot query field '{0}' on type '{1}', did you mean to use an inline fragment on '{2}'?
    AbstractField(String, String, String),
    /// field '{0}' of type '{1}' must have a selection of subfields
    MissingSelectionSet(String, String),
    /// field '{0}' must not have a selection since type '{1}' has no subfields
    LeafSelection(String, String),
    /// unknown argument '{0}' on field '{1}'
    UnknownArgument(String, String),
    /// field '{0}' argument '{1}' of type '{2}' is required but not provided
    MissingArgument(String, String, String),
    /// unknown fragment '{0}'
    UnknownFragment(String),
    /// unknown type '{0}'
    UnknownType(String),
    /// fragment on '{0}' can never be spread within type '{1}'
    InapplicableFragment(String, String),
    /// Unknown operation named "{0}"
    UnknownOperation(String),
    /// must provide an operation
    NoOperation,
    /// must provide query string
    MissingQuery,
    /// {0} operations are not supported
    UnsupportedOperation(String),
    /// variable '${0}' of required type '{1}' was not provided
    MissingVariable(String, String),
    /// invalid type for variable: '{0}'
    InvalidVariable(String),
    /// variable '${0}' is not defined
    UndefinedVariable(String),
    /// fields '{0}' conflict because {1}
    FieldsConflict(String, String),
    /// invalid type error: {0}
    InvalidType(String),
}

pub(crate) const GRAPHQL_VALIDATION_FAILURE_ERROR_CODE: &str = "GRAPHQL_VALIDATION_FAILED";

impl ErrorExtension for SpecError {
    fn extension_code(&self) -> String {
        match self {
            SpecError::ParsingError(_) => "GRAPHQL_PARSE_FAILED",
            SpecError::RecursionLimitExceeded => "RECURSION_LIMIT_EXCEEDED",
            SpecError::SelectionLimitExceeded => "MAX_SELECTIONS_LIMIT",
            SpecError::UnknownOperation(_) => "GRAPHQL_UNKNOWN_OPERATION_NAME",
            SpecError::UnsupportedOperation(_) => "OPERATION_NOT_SUPPORTED",
            SpecError::MissingQuery => "MISSING_QUERY_STRING",
            SpecError::MissingVariable(..) | SpecError::InvalidVariable(_) => {
                "VALIDATION_INVALID_TYPE_VARIABLE"
            }
            SpecError::FragmentCycle(_)
            | SpecError::InvalidField(..)
            | SpecError::AbstractField(..)
            | SpecError::MissingSelectionSet(..)
            | SpecError::LeafSelection(..)
            | SpecError::UnknownArgument(..)
            | SpecError::MissingArgument(..)
            | SpecError::UnknownFragment(_)
            | SpecError::UnknownType(_)
            | SpecError::InapplicableFragment(..)
            | SpecError::UndefinedVariable(_)
            | SpecError::FieldsConflict(..)
            | SpecError::InvalidType(_)
            | SpecError::NoOperation => GRAPHQL_VALIDATION_FAILURE_ERROR_CODE,
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut obj = Object::new();
        match self {
            SpecError::InvalidField(field, ty) | SpecError::AbstractField(field, ty, _) => {
                obj.insert("type", ty.clone().into());
                obj.insert("field", field.clone().into());
            }
            SpecError::MissingVariable(name, _)
            | SpecError::InvalidVariable(name)
            | SpecError::UndefinedVariable(name) => {
                obj.insert("name", name.clone().into());
            }
            _ => (),
        }

        (!obj.is_empty()).then_some(obj)
    }
}
