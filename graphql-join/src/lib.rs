//! GraphQL resolvers backed by compiled SQL statements.
//!
//! Rather than resolving a GraphQL query field by field, each field backed by the database is
//! compiled into a single SQL statement, and the rows it returns are shaped into the response.
//! Around the [compiler](sql::compile) sit a few pieces which make this work for any query:
//!
//! * A [pagination strategy](pagination), chosen once from the [configuration](config), which
//!   decides whether connections are paginated in the database (by offset or by keyset) or in
//!   memory, over the complete result set.
//! * [Predicate builders](sql::predicate), which turn caller arguments into filters embedded in
//!   the statement. Filters are always parameterized: caller input is bound, never interpolated.
//! * An [execution adapter](sql::execute), which runs statements through drivers that either
//!   return rows from an awaited call or report them through a callback, with the same result.
//! * A [reconciler](connection::reconcile), which shapes compiled results into Relay-style
//!   connections.
//!
//! The [graphql] module puts these together into a dynamic [`async_graphql`] schema. This crate
//! comes with a PostgreSQL driver as well as a mock database, which is useful for lightweight
//! testing.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod connection;
pub mod error;
pub mod graphql;
pub mod pagination;
pub mod prelude;
pub mod request;
pub mod sql;

pub use error::Error;

/// Initialize tracing.
pub fn init_logging() {
    static ONCE: Once = Once::new();

    ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_ansi(true)
            .with_env_filter(EnvFilter::from_default_env())
            .init();
        if let Err(err) = color_eyre::install() {
            tracing::warn!("unable to install error report handler: {err}");
        }
    });
}
