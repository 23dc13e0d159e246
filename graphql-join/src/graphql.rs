//! GraphQL resolvers which delegate to the statement compiler.
//!
//! The schema is built with the dynamic API of [`async_graphql`], so the same resolvers can
//! serve whichever argument schema the configured pagination mode calls for. Each field backed
//! by the database is described by a [`FieldSpec`](crate::sql::FieldSpec), and resolved by
//! compiling a statement for it, running the statement through the [`Backend`] and shaping the
//! rows for the GraphQL engine.

use crate::sql::{
    execute::{Callback, Direct, Driver, Execute, Spawn},
    CompilerOptions, Convention,
};
use async_std::sync::Arc;

pub mod resolver;
pub mod schema;

// Re-export commonly used `async_graphql` types.
pub use async_graphql::{dynamic::Schema, value, Request, Result};

// Re-export `async_graphql` directly as an escape hatch.
pub extern crate async_graphql;

/// The database behind a GraphQL schema.
///
/// The backend is stored in the schema data, and shared by all requests. It holds one
/// [`Execute`] implementation for each calling convention.
pub struct Backend {
    direct: Arc<dyn Execute>,
    callback: Arc<dyn Execute>,
    options: CompilerOptions,
}

impl Backend {
    /// A backend running statements on `driver`.
    ///
    /// Fields using the callback convention run their statements on `driver` in a separate
    /// task.
    pub fn new<D: Driver + 'static>(driver: D, options: CompilerOptions) -> Self {
        let driver = Arc::new(driver);
        Self::with_executors(
            Direct::from(driver.clone()),
            Callback::from(Spawn::from(driver)),
            options,
        )
    }

    /// A backend with a separate implementation for each calling convention.
    pub fn with_executors(
        direct: impl Execute + 'static,
        callback: impl Execute + 'static,
        options: CompilerOptions,
    ) -> Self {
        Self {
            direct: Arc::new(direct),
            callback: Arc::new(callback),
            options,
        }
    }

    /// The executor for statements using `convention`.
    pub fn executor(&self, convention: Convention) -> &dyn Execute {
        match convention {
            Convention::Direct => self.direct.as_ref(),
            Convention::Callback => self.callback.as_ref(),
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// A short description of the database.
    pub fn describe(&self) -> String {
        self.direct.describe()
    }
}
