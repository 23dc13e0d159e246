//! Compilation of GraphQL field requests into SQL statements.
//!
//! Each resolvable field is described by a [`FieldSpec`]: the table it reads, how its GraphQL
//! fields map onto columns, the shape of its result and, for connection fields, its
//! [`Pagination`] strategy. A [`FieldRequest`] pairs a spec with the arguments and selection of
//! one incoming query. [`compile`] turns the request into a single statement, runs it through an
//! [`Execute`] implementation and shapes the rows into a [`Payload`].

use super::db::{Boolean, Column, Dialect, Order, Row, Select, Type, Value};
use super::execute::Execute;
use super::predicate::PredicateBuilder;
use crate::connection::{
    cursor_to_key, cursor_to_offset, key_to_cursor, offset_to_cursor, Connection, Edge,
};
use crate::pagination::{OrderDirective, PageRequest, Pagination, PaginationMode, SortKey};
use crate::request::{Arguments, RequestContext};
use crate::Error;
use async_std::sync::Arc;
use convert_case::{Case, Casing};
use derivative::Derivative;
use itertools::Itertools;
use std::borrow::Cow;

/// Options controlling the text of generated statements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    pub dialect: Dialect,
    /// Render statements on a single line with short table aliases.
    pub minify: bool,
}

/// The shape of the result of a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    /// At most one row.
    Entity,
    /// A flat list of rows.
    List,
    /// A paginated connection of rows.
    Connection(Pagination),
}

/// How a field's statements reach the database.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Convention {
    /// Through a driver which returns rows from an awaited call.
    #[default]
    Direct,
    /// Through a driver which reports rows through a completion handle.
    Callback,
}

/// A GraphQL field of the resolved type and the columns it is computed from.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Selection {
    field: &'static str,
    columns: Vec<Cow<'static, str>>,
}

/// The description of a field resolved by a single-table statement.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct FieldSpec {
    name: &'static str,
    table: &'static str,
    key: Option<&'static str>,
    key_type: Option<Type>,
    shape: Shape,
    convention: Convention,
    selections: Vec<Selection>,
    #[derivative(Debug = "ignore")]
    predicate: Option<Arc<dyn PredicateBuilder>>,
}

impl FieldSpec {
    fn new(name: &'static str, table: &'static str, shape: Shape) -> Self {
        Self {
            name,
            table,
            key: None,
            key_type: None,
            shape,
            convention: Convention::Direct,
            selections: vec![],
            predicate: None,
        }
    }

    /// A field resolving to at most one row of `table`.
    pub fn entity(name: &'static str, table: &'static str) -> Self {
        Self::new(name, table, Shape::Entity)
    }

    /// A field resolving to a list of rows of `table`.
    pub fn list(name: &'static str, table: &'static str) -> Self {
        Self::new(name, table, Shape::List)
    }

    /// A field resolving to a connection over the rows of `table`, identified by `key`.
    ///
    /// The pagination strategy is selected for `mode`.
    pub fn connection(
        name: &'static str,
        table: &'static str,
        key: Option<&'static str>,
        mode: PaginationMode,
    ) -> Result<Self, Error> {
        let pagination = Pagination::select(mode, key)?;
        let mut spec = Self::new(name, table, Shape::Connection(pagination));
        spec.key = key;
        Ok(spec)
    }

    /// Identify rows by the `key` column, which is always selected.
    pub fn key(mut self, key: &'static str) -> Self {
        self.key = Some(key);
        self
    }

    /// Declare the SQL type of the key column.
    ///
    /// Keyset cursors holding a key of a different type are then rejected before they reach the
    /// database.
    pub fn key_type(mut self, ty: Type) -> Self {
        self.key_type = Some(ty);
        self
    }

    /// A GraphQL field stored in the column of the same name, in snake case.
    pub fn field(self, field: &'static str) -> Self {
        let column = to_snake_case(field);
        self.computed(field, [column])
    }

    /// A GraphQL field stored in the column `column`.
    pub fn field_as(self, field: &'static str, column: &'static str) -> Self {
        self.computed(field, [column])
    }

    /// A GraphQL field computed from the values of `columns`.
    pub fn computed<I>(mut self, field: &'static str, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Cow<'static, str>>,
    {
        self.selections.push(Selection {
            field,
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Filter the rows of this field with `predicate`.
    pub fn filter(mut self, predicate: impl PredicateBuilder + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Run the statements of this field through a callback driver.
    pub fn via_callback(mut self) -> Self {
        self.convention = Convention::Callback;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    /// The pagination strategy, if this is a connection field.
    pub fn pagination(&self) -> Option<&Pagination> {
        match &self.shape {
            Shape::Connection(pagination) => Some(pagination),
            _ => None,
        }
    }

    /// The GraphQL fields of the resolved type which are backed by columns.
    pub fn fields(&self) -> impl '_ + Iterator<Item = &'static str> {
        self.selections.iter().map(|selection| selection.field)
    }

    /// The alias of this field's table in generated statements.
    fn alias(&self, options: &CompilerOptions) -> &'static str {
        if options.minify {
            "a"
        } else {
            self.name
        }
    }

    /// The columns needed to resolve `requested` GraphQL fields.
    ///
    /// The key column always comes first. If nothing in particular is requested, every known
    /// column is selected.
    fn columns(&self, requested: &[String]) -> Vec<Cow<'static, str>> {
        let selections = self.selections.iter().filter(|selection| {
            requested.is_empty() || requested.iter().any(|field| field == selection.field)
        });
        self.key
            .map(Cow::Borrowed)
            .into_iter()
            .chain(selections.flat_map(|selection| selection.columns.iter().cloned()))
            .unique()
            .collect()
    }
}

/// A request to resolve one field in one query.
#[derive(Clone, Debug)]
pub struct FieldRequest<'a> {
    spec: &'a FieldSpec,
    args: Arguments,
    selection: Vec<String>,
    context: RequestContext,
}

impl<'a> FieldRequest<'a> {
    pub fn new(spec: &'a FieldSpec, args: Arguments) -> Self {
        Self {
            spec,
            args,
            selection: vec![],
            context: RequestContext::default(),
        }
    }

    /// Request only the given GraphQL fields of the resolved type.
    pub fn select<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.selection = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve the field with the given request-scoped state.
    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }

    pub fn spec(&self) -> &'a FieldSpec {
        self.spec
    }

    pub fn args(&self) -> &Arguments {
        &self.args
    }

    /// The validated pagination arguments of this request.
    ///
    /// Fields which are not connections have no pagination arguments.
    pub fn page(&self) -> Result<PageRequest, Error> {
        match self.spec.pagination() {
            Some(pagination) => pagination.arguments().parse(&self.args),
            None => Ok(PageRequest::default()),
        }
    }
}

/// The compiled result of a field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Entity(Option<Row>),
    List(Vec<Row>),
    Connection(Connection<Row>),
}

impl Payload {
    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::Entity(_) => "entity",
            Self::List(_) => "list",
            Self::Connection(_) => "connection",
        }
    }
}

/// Compile `request` into a statement, run it, and shape the rows.
pub async fn compile<E>(
    request: &FieldRequest<'_>,
    execute: &E,
    options: &CompilerOptions,
) -> Result<Payload, Error>
where
    E: Execute + ?Sized,
{
    let spec = request.spec;
    let alias = spec.alias(options);

    let mut select = Select::new(spec.table, alias);
    for column in spec.columns(&request.selection) {
        select = select.column(Column::qualified(alias, column));
    }
    if let Some(predicate) = &spec.predicate {
        if let Some(clause) = predicate.build(alias, &request.args, &request.context) {
            select = select.filter(clause);
        }
    }

    match &spec.shape {
        Shape::Entity => {
            let rows = run(spec, execute, select, options).await?;
            Ok(Payload::Entity(rows.into_iter().next()))
        }
        Shape::List => Ok(Payload::List(run(spec, execute, select, options).await?)),
        Shape::Connection(pagination) => match pagination.order() {
            // Without an order directive, pagination happens after the fact, over every matching
            // row.
            None => Ok(Payload::List(run(spec, execute, select, options).await?)),
            Some(OrderDirective::OrderBy { column, order }) => {
                let column = Column::qualified(alias, column);
                offset_page(request, execute, select, column, order, options).await
            }
            Some(OrderDirective::Seek(sort_key)) => {
                keyset_page(request, execute, select, alias, sort_key, options).await
            }
        },
    }
}

/// Fetch one page of a connection ordered by `column`, skipping rows by position.
async fn offset_page<E>(
    request: &FieldRequest<'_>,
    execute: &E,
    select: Select<'static>,
    column: Column<'static>,
    order: Order,
    options: &CompilerOptions,
) -> Result<Payload, Error>
where
    E: Execute + ?Sized,
{
    let page = request.page()?;
    let offset = match &page.after {
        // The offset must also be representable as a SQL `bigint`.
        Some(after) => cursor_to_offset(after)
            .and_then(|after| after.checked_add(1))
            .filter(|offset| i64::try_from(*offset).is_ok())
            .ok_or_else(|| Error::invalid_argument("after", "malformed cursor"))?,
        None => 0,
    };
    let mut select = select.order_by(column, order).offset(offset);
    if let Some(first) = page.first {
        // Fetch one extra row to find out if there is a next page.
        select = select.limit(first.saturating_add(1));
    }

    let mut rows = run(request.spec, execute, select, options).await?;
    let has_next_page = page.first.map_or(false, |first| rows.len() > first);
    if let Some(first) = page.first {
        rows.truncate(first);
    }
    let edges = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| Edge::new(offset_to_cursor(offset + i), row))
        .collect();
    Ok(Payload::Connection(Connection::new(
        edges,
        offset > 0,
        has_next_page,
    )))
}

/// Fetch one page of a connection by seeking past the sort key of a cursor.
async fn keyset_page<E>(
    request: &FieldRequest<'_>,
    execute: &E,
    select: Select<'static>,
    alias: &'static str,
    sort_key: SortKey,
    options: &CompilerOptions,
) -> Result<Payload, Error>
where
    E: Execute + ?Sized,
{
    let spec = request.spec;
    let page = request.page()?;
    let SortKey { order, key } = sort_key;
    if page.first.is_some() && page.last.is_some() {
        return Err(Error::invalid_argument(
            "last",
            "cannot be combined with first under keyset pagination",
        ));
    }

    let key_column = Column::qualified(alias, key.clone());
    let (after_op, before_op) = match order {
        Order::Asc => (">", "<"),
        Order::Desc => ("<", ">"),
    };
    let mut select = select;
    if let Some(after) = &page.after {
        let after = decode_key(spec, after, "after")?;
        select = select.filter(Boolean::cmp(key_column.clone(), after_op, after));
    }
    if let Some(before) = &page.before {
        let before = decode_key(spec, before, "before")?;
        select = select.filter(Boolean::cmp(key_column.clone(), before_op, before));
    }

    // Paginating backwards, read the rows nearest `before` first and flip them back afterwards.
    let backward = page.last.is_some();
    let (direction, limit) = if backward {
        (order.reverse(), page.last)
    } else {
        (order, page.first)
    };
    select = select.order_by(key_column, direction);
    if let Some(limit) = limit {
        select = select.limit(limit.saturating_add(1));
    }

    let mut rows = run(spec, execute, select, options).await?;
    let more = limit.map_or(false, |limit| rows.len() > limit);
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    if backward {
        rows.reverse();
    }
    let edges = rows
        .into_iter()
        .map(|row| {
            let cursor = row.get(&key).and_then(key_to_cursor).ok_or_else(|| {
                Error::compilation(spec.name, format!("row has no value for key {key}"))
            })?;
            Ok(Edge::new(cursor, row))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    let (has_previous_page, has_next_page) = if backward {
        (more, page.before.is_some())
    } else {
        (page.after.is_some(), more)
    };
    Ok(Payload::Connection(Connection::new(
        edges,
        has_previous_page,
        has_next_page,
    )))
}

async fn run<E>(
    spec: &FieldSpec,
    execute: &E,
    select: Select<'_>,
    options: &CompilerOptions,
) -> Result<Vec<Row>, Error>
where
    E: Execute + ?Sized,
{
    let statement = select.render(options.dialect, options.minify);
    tracing::debug!(field = spec.name, sql = statement.sql(), "compiled field");
    execute.execute(statement).await
}

/// Decode the sort key of a cursor, checking it against the type of the key column.
fn decode_key(spec: &FieldSpec, cursor: &str, argument: &str) -> Result<Value, Error> {
    let key = cursor_to_key(cursor)
        .ok_or_else(|| Error::invalid_argument(argument, "malformed cursor"))?;
    match spec.key_type {
        Some(ty) => {
            let found = key.type_name();
            ty.coerce(key).ok_or_else(|| {
                Error::invalid_argument(
                    argument,
                    format!("cursor holds a {found} key but the key column is {ty}"),
                )
            })
        }
        None => Ok(key),
    }
}

/// Convert a string to snake case.
fn to_snake_case(s: &str) -> String {
    use convert_case::Boundary::*;
    s.with_boundaries(&[Hyphen, Underscore, Space, LowerUpper])
        .to_case(Case::Snake)
}
