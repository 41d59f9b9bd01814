//! Typed GraphQL query execution over a graph of Star Wars characters and episodes.
//!
//! Requests are parsed and bound against the [`TypeRegistry`], then executed by
//! an [`Executor`] over any [`EntityStore`]:
//!
//! ```ignore
//! let executor = Executor::new(Arc::new(InMemoryStore::starwars()?));
//! let response = executor.execute(
//!     &graphql::Request::builder()
//!         .query(r#"{ hero(episode: "NewHope") { name } }"#)
//!         .build(),
//! );
//! ```

#![cfg_attr(feature = "failfast", allow(unreachable_code))]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod json_ext;

pub mod configuration;
pub mod error;
mod execution;
pub mod graphql;
pub mod registry;
mod resolvers;
pub mod spec;
pub mod store;
pub mod traversal;

pub use configuration::Configuration;
pub use error::ResolveError;
pub use error::StoreError;
pub use execution::Executor;
pub use registry::Kind;
pub use registry::TypeRegistry;
pub use spec::Query;
pub use spec::SpecError;
pub use store::CharacterRecord;
pub use store::EntityStore;
pub use store::EpisodeRecord;
pub use store::InMemoryStore;
pub use store::Seed;
pub use traversal::Traversal;
