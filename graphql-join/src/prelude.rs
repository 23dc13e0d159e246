//! Common items that you will always want in scope when serving GraphQL.

pub use crate::{
    config::Options,
    connection::{Connection, Edge, PageInfo},
    graphql::{async_graphql, schema, value, Backend, Request, Schema},
    pagination::{Pagination, PaginationMode},
    request::{Arguments, RequestContext},
    sql::{
        db::Dialect,
        execute::{CallbackDriver, Completion, Driver, Execute},
        predicate::PredicateBuilder,
        CompilerOptions, FieldSpec,
    },
    Error,
};
