//! Resolution errors.
use displaydoc::Display;
use thiserror::Error;

use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::spec::SpecError;

/// Error types for the resolution of a single field or branch.
///
/// Note that these are not actually returned to the client, but are instead converted to JSON for
/// [`struct@Error`] and attached to the path of the failing branch.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ResolveError {
    /// {0}
    Validation(SpecError),

    /// no character found for the canonical id '{id}'
    NotFound {
        /// The id that was expected to exist.
        id: String,
    },

    /// character '{id}' has a missing or unrecognized species discriminator
    UnknownKind {
        /// The id of the offending record.
        id: String,
        /// The discriminator value as stored, if any.
        discriminator: Option<String>,
    },

    /// {0}
    Store(#[from] StoreError),

    /// invalid value for argument '{argument}': {reason}
    InvalidArgument {
        /// Name of the argument.
        argument: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// cannot return null for non-nullable field '{type_name}.{field}'
    NonNullViolation {
        /// The parent type of the field.
        type_name: String,
        /// The field name.
        field: String,
    },
}

impl ResolveError {
    /// Convert the resolution error to a GraphQL error.
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

impl ErrorExtension for ResolveError {
    fn extension_code(&self) -> String {
        match self {
            ResolveError::Validation(error) => return error.extension_code(),
            ResolveError::NotFound { .. } => "NOT_FOUND",
            ResolveError::UnknownKind { .. } => "UNKNOWN_KIND",
            ResolveError::Store(_) => "STORE_ERROR",
            ResolveError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            ResolveError::NonNullViolation { .. } => "NON_NULL_VIOLATION",
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut obj = Object::new();
        match self {
            ResolveError::Validation(error) => return error.custom_extension_details(),
            ResolveError::NotFound { id } => {
                obj.insert("id", id.clone().into());
            }
            ResolveError::UnknownKind { id, discriminator } => {
                obj.insert("id", id.clone().into());
                if let Some(discriminator) = discriminator {
                    obj.insert("discriminator", discriminator.clone().into());
                }
            }
            ResolveError::InvalidArgument { argument, .. } => {
                obj.insert("argument", argument.clone().into());
            }
            ResolveError::Store(_) | ResolveError::NonNullViolation { .. } => (),
        }

        (!obj.is_empty()).then_some(obj)
    }
}

impl From<SpecError> for ResolveError {
    fn from(error: SpecError) -> Self {
        ResolveError::Validation(error)
    }
}

/// Errors raised by an [`crate::EntityStore`] implementation.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum StoreError {
    /// store lookup failed: {reason}
    Unavailable {
        /// The failure reason.
        reason: String,
    },

    /// duplicate key '{key}' in collection '{collection}'
    DuplicateKey {
        /// The collection holding the duplicate.
        collection: String,
        /// The duplicated key.
        key: String,
    },

    /// malformed seed document: {reason}
    MalformedSeed {
        /// The failure reason.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn unknown_kind_carries_the_discriminator() {
        let error = ResolveError::UnknownKind {
            id: "3000".to_string(),
            discriminator: Some("wookiee".to_string()),
        }
        .to_graphql_error(Some(Path::from_keys(&["hero"])), Vec::new());

        assert_eq!(
            serde_json_bytes::to_value(&error).unwrap(),
            json!({
                "message": "character '3000' has a missing or unrecognized species discriminator",
                "path": ["hero"],
                "extensions": {
                    "id": "3000",
                    "discriminator": "wookiee",
                    "code": "UNKNOWN_KIND"
                }
            })
        );
    }

    #[test]
    fn store_errors_convert() {
        let error: ResolveError = StoreError::Unavailable {
            reason: "connection reset".to_string(),
        }
        .into();
        assert_eq!(error.to_string(), "store lookup failed: connection reset");
        assert_eq!(error.extension_code(), "STORE_ERROR");
    }
}
