//! Caller-controlled filters embedded into compiled statements.
//!
//! A [`PredicateBuilder`] is consulted once per field resolution. It is given the alias the
//! compiler chose for the field's table, so the filter it builds can only refer to that table.
//! Caller input becomes a bound [`Value`](super::db::Value) in the resulting [`WhereClause`] and
//! is never spliced into statement text.

use super::db::{Boolean, Column, WhereClause};
use crate::request::{Arguments, RequestContext};

/// Builds an optional filter for one field resolution.
pub trait PredicateBuilder: Send + Sync {
    /// Build a filter over the table aliased as `alias`.
    ///
    /// Returns [`None`] when the arguments do not call for any filtering.
    fn build(
        &self,
        alias: &str,
        args: &Arguments,
        context: &RequestContext,
    ) -> Option<WhereClause<'static>>;
}

impl<F> PredicateBuilder for F
where
    F: Fn(&str, &Arguments, &RequestContext) -> Option<WhereClause<'static>> + Send + Sync,
{
    fn build(
        &self,
        alias: &str,
        args: &Arguments,
        context: &RequestContext,
    ) -> Option<WhereClause<'static>> {
        self(alias, args, context)
    }
}

/// Case-insensitive substring search across several columns.
///
/// A row matches if any of the columns contains the value of the search argument.
#[derive(Clone, Debug)]
pub struct Search {
    argument: &'static str,
    columns: Vec<&'static str>,
}

impl Search {
    pub fn new(argument: &'static str, columns: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            argument,
            columns: columns.into_iter().collect(),
        }
    }
}

impl PredicateBuilder for Search {
    fn build(
        &self,
        alias: &str,
        args: &Arguments,
        _context: &RequestContext,
    ) -> Option<WhereClause<'static>> {
        let term = args.text(self.argument).filter(|term| !term.is_empty())?;
        let pattern = format!("%{term}%");
        Some(WhereClause::any(self.columns.iter().map(|col| {
            Boolean::like(
                Column::qualified(alias.to_string(), *col),
                pattern.as_str(),
            )
        })))
    }
}

/// Equality between a column and an identifier argument.
#[derive(Clone, Debug)]
pub struct MatchId {
    argument: &'static str,
    column: &'static str,
}

impl MatchId {
    pub fn new(argument: &'static str, column: &'static str) -> Self {
        Self { argument, column }
    }
}

impl PredicateBuilder for MatchId {
    fn build(
        &self,
        alias: &str,
        args: &Arguments,
        _context: &RequestContext,
    ) -> Option<WhereClause<'static>> {
        let id = args.get(self.argument)?;
        Some(
            Boolean::cmp(
                Column::qualified(alias.to_string(), self.column),
                "=",
                id.clone(),
            )
            .into(),
        )
    }
}
