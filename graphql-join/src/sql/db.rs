//! Abstract interface to a SQL database.
//!
//! This module describes statements in a structured form ([`Select`] and [`WhereClause`]) which
//! can be rendered into statement text for a particular [`Dialect`]. Rendering never interpolates
//! values into the text: every [`Value`] in a statement is replaced by a placeholder and carried
//! alongside the text as a bound parameter.

use clap::ValueEnum;
use derive_more::{Display, From};
use itertools::Itertools;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

pub mod mock;
pub mod postgres;

/// Errors returned by the database.
pub trait Error: Sized + Send + Sync + std::error::Error + 'static {
    /// Wrap a custom message into this error type.
    fn custom(msg: impl Display) -> Self;
}

/// The flavor of SQL to generate.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash, ValueEnum)]
pub enum Dialect {
    #[default]
    #[display(fmt = "postgres")]
    Postgres,
    #[display(fmt = "mysql")]
    #[value(name = "mysql")]
    MySql,
    #[display(fmt = "mariadb")]
    #[value(name = "mariadb")]
    MariaDb,
}

impl Dialect {
    /// Escape an identifier (table name, column name, etc.) for inclusion in a SQL query.
    pub fn quote(&self, ident: impl AsRef<str>) -> String {
        match self {
            Self::Postgres => escape_ident(ident),
            Self::MySql | Self::MariaDb => format!("`{}`", ident.as_ref().replace('`', "``")),
        }
    }

    /// The placeholder referencing the `n`th bound parameter (1-indexed).
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${n}"),
            Self::MySql | Self::MariaDb => "?".into(),
        }
    }
}

/// A column in a schema.
///
/// This describes the structure and format of each entry in the column, along with column-level
/// metadata like the name.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "{name} {ty}")]
pub struct SchemaColumn<'a> {
    name: Cow<'a, str>,
    ty: Type,
}

impl<'a> SchemaColumn<'a> {
    /// Create a column given a name and type.
    pub fn new(name: impl Into<Cow<'a, str>>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// The name of this column
    pub fn name(&self) -> Cow<'a, str> {
        self.name.clone()
    }

    /// The type of this column
    pub fn ty(&self) -> Type {
        self.ty
    }
}

/// A SQL primitive data type.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    #[display(fmt = "bool")]
    Bool,
    #[display(fmt = "text")]
    Text,
    #[display(fmt = "int4")]
    Int4,
    #[display(fmt = "int8")]
    Int8,
    #[display(fmt = "serial")]
    Serial,
}

impl Type {
    /// Convert `value` to this type, if it has this type or is an integer which fits in it.
    ///
    /// Returns [`None`] for `NULL` and for values of any other type.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (Self::Bool, value @ Value::Bool(_)) | (Self::Text, value @ Value::Text(_)) => {
                Some(value)
            }
            (Self::Int4 | Self::Serial, value) => {
                i32::try_from(value.as_i64()?).ok().map(Value::Int4)
            }
            (Self::Int8, value) => value.as_i64().map(Value::Int8),
            _ => None,
        }
    }
}

/// A primitive value supported by a SQL database.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, From)]
pub enum Value {
    /// The absence of a value.
    #[display(fmt = "NULL")]
    #[from(ignore)]
    Null,
    /// A boolean.
    #[display(fmt = "{}", _0)]
    Bool(bool),
    /// A text string.
    #[display(fmt = "{}", _0)]
    Text(String),
    /// A 4-byte signed integer.
    #[display(fmt = "{}", _0)]
    Int4(i32),
    /// An 8-byte signed integer.
    #[display(fmt = "{}", _0)]
    Int8(i64),
}

impl TryFrom<Value> for String {
    type Error = String;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Text(s) => Ok(s),
            v => Err(format!("type mismatch (expected string, got {})", v.type_name())),
        }
    }
}

macro_rules! try_from_int_value {
    ($t:ty) => {
        impl TryFrom<Value> for $t {
            type Error = String;

            fn try_from(v: Value) -> Result<Self, Self::Error> {
                match v {
                    Value::Int4(x) => x
                        .try_into()
                        .map_err(|err| format!("out of range for type {}: {err}", stringify!($t))),
                    Value::Int8(x) => x
                        .try_into()
                        .map_err(|err| format!("out of range for type {}: {err}", stringify!($t))),
                    _ => Err(format!(
                        "type mismatch (expected {}, got {})",
                        stringify!($t),
                        v.type_name()
                    )),
                }
            }
        }
    };
}

try_from_int_value!(i32);
try_from_int_value!(i64);

impl Value {
    /// The SQL type of this value, or [`None`] for `NULL`.
    pub fn ty(&self) -> Option<Type> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(Type::Bool),
            Self::Text(_) => Some(Type::Text),
            Self::Int4(_) => Some(Type::Int4),
            Self::Int8(_) => Some(Type::Int8),
        }
    }

    /// A human readable name for the type of this value.
    pub fn type_name(&self) -> String {
        self.ty()
            .map(|ty| ty.to_string())
            .unwrap_or_else(|| "null".into())
    }

    /// Interpret this value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int4(x) => Some((*x).into()),
            Self::Int8(x) => Some(*x),
            _ => None,
        }
    }

    /// Compare two values the way SQL would.
    ///
    /// Integers of different widths compare by value. `NULL` and values of unrelated types are
    /// incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(l), Self::Bool(r)) => Some(l.cmp(r)),
            (Self::Text(l), Self::Text(r)) => Some(l.cmp(r)),
            (l, r) => Some(l.as_i64()?.cmp(&r.as_i64()?)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.into())
    }
}

/// A row returned by a query: an ordered mapping from column names to values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Create a row with the given named entries, in order.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }

    /// Get the value of the named column.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, value)| value)
    }

    /// Get the value of the named column, converted to a Rust type.
    pub fn try_get<T>(&self, name: &str) -> Result<T, String>
    where
        T: TryFrom<Value, Error = String>,
    {
        self.get(name)
            .cloned()
            .ok_or_else(|| format!("no such column {name}"))?
            .try_into()
    }
}

/// An identifier of a column in a SQL query.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Column<'a> {
    table: Option<Cow<'a, str>>,
    name: Cow<'a, str>,
}

impl<'a> Column<'a> {
    /// A named column.
    pub fn named(name: impl Into<Cow<'a, str>>) -> Self {
        Self {
            name: name.into(),
            table: None,
        }
    }

    /// A named column, qualified by a table name.
    pub fn qualified(table: impl Into<Cow<'a, str>>, name: impl Into<Cow<'a, str>>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    /// The unqualified name of this column.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The table qualifying this column, if any.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Escape this column name for interpolation into a SQL query.
    pub fn escape(&self, dialect: Dialect) -> String {
        match &self.table {
            Some(table) => format!("{}.{}", dialect.quote(table), dialect.quote(&self.name)),
            None => dialect.quote(&self.name),
        }
    }

    /// Remove the lifetime requirement from `self` by cloning and taking ownership of borrowed
    /// data.
    pub fn into_static(self) -> Column<'static> {
        Column {
            table: self.table.map(|table| Cow::Owned(table.into_owned())),
            name: Cow::Owned(self.name.into_owned()),
        }
    }
}

impl<'a> Display for Column<'a> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if let Some(table) = &self.table {
            write!(f, "{table}.")?;
        }
        write!(f, "{}", self.name)
    }
}

impl<'a> From<&'a str> for Column<'a> {
    fn from(name: &'a str) -> Self {
        Self::named(name)
    }
}

impl<'a> From<String> for Column<'a> {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

/// Sort direction.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Order {
    #[default]
    #[display(fmt = "ASC")]
    Asc,
    #[display(fmt = "DESC")]
    Desc,
}

impl Order {
    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// A `WHERE` clause.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WhereClause<'a> {
    /// A `WHERE` clause which holds on any row where all of the sub-clauses hold.
    All(Vec<WhereClause<'a>>),
    /// A `WHERE` clause which holds on any row where any of the sub-clauses hold.
    Any(Vec<WhereClause<'a>>),
    /// A `WHERE` clause which holds on any row where a boolean expression is true.
    Predicate(Boolean<'a>),
}

impl<'a> From<Boolean<'a>> for WhereClause<'a> {
    fn from(b: Boolean<'a>) -> Self {
        Self::Predicate(b)
    }
}

impl<'a> WhereClause<'a> {
    /// A `WHERE` clause which holds on any row where all of the sub-clauses hold.
    pub fn all<I>(clauses: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<WhereClause<'a>>,
    {
        let mut clauses = clauses
            .into_iter()
            .map(|clause| clause.into())
            .collect::<Vec<_>>();
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Self::All(clauses)
        }
    }

    /// A `WHERE` clause which holds on any row where any of the sub-clauses hold.
    pub fn any<I>(clauses: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<WhereClause<'a>>,
    {
        let mut clauses = clauses
            .into_iter()
            .map(|clause| clause.into())
            .collect::<Vec<_>>();
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Self::Any(clauses)
        }
    }

    /// Render this clause as a boolean expression, binding its values to `params`.
    pub fn render(&self, params: &mut Params) -> String {
        match self {
            Self::All(clauses) if clauses.is_empty() => "TRUE".into(),
            Self::Any(clauses) if clauses.is_empty() => "FALSE".into(),
            Self::All(clauses) => format!(
                "({})",
                clauses.iter().map(|clause| clause.render(params)).join(" AND ")
            ),
            Self::Any(clauses) => format!(
                "({})",
                clauses.iter().map(|clause| clause.render(params)).join(" OR ")
            ),
            Self::Predicate(b) => b.render(params),
        }
    }

    /// Render this clause on its own, returning the expression text and its bound parameters.
    pub fn to_sql(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Params::new(dialect);
        let text = self.render(&mut params);
        (text, params.into_values())
    }

    /// Remove the lifetime requirement from `self` by cloning and taking ownership of borrowed
    /// data.
    pub fn into_static(self) -> WhereClause<'static> {
        match self {
            Self::All(clauses) => {
                WhereClause::All(clauses.into_iter().map(Self::into_static).collect())
            }
            Self::Any(clauses) => {
                WhereClause::Any(clauses.into_iter().map(Self::into_static).collect())
            }
            Self::Predicate(b) => WhereClause::Predicate(b.into_static()),
        }
    }
}

/// A boolean expression in a `WHERE` clause.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Boolean<'a> {
    Cmp {
        /// The column to filter.
        column: Column<'a>,
        /// The operation used to filter values of `column`.
        op: Cow<'a, str>,
        /// Parameter to `op`.
        param: Value,
    },
    /// Case-insensitive `LIKE` pattern match.
    Like {
        /// The column to filter.
        column: Column<'a>,
        /// A `LIKE` pattern, where `%` matches any run of characters and `_` any one character.
        pattern: Value,
    },
}

impl<'a> Boolean<'a> {
    /// A boolean expression which compares the value of a column to a constant.
    pub fn cmp(
        column: impl Into<Column<'a>>,
        op: impl Into<Cow<'a, str>>,
        param: impl Into<Value>,
    ) -> Self {
        Self::Cmp {
            column: column.into(),
            op: op.into(),
            param: param.into(),
        }
    }

    /// A boolean expression which checks if the value of a column matches a `LIKE` pattern,
    /// ignoring case.
    pub fn like(column: impl Into<Column<'a>>, pattern: impl Into<Value>) -> Self {
        Self::Like {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    fn render(&self, params: &mut Params) -> String {
        let dialect = params.dialect;
        match self {
            Self::Cmp { column, op, param } => {
                format!(
                    "{} {op} {}",
                    column.escape(dialect),
                    params.bind(param.clone())
                )
            }
            Self::Like { column, pattern } => format!(
                "lower({}) LIKE lower({})",
                column.escape(dialect),
                params.bind(pattern.clone())
            ),
        }
    }

    fn into_static(self) -> Boolean<'static> {
        match self {
            Self::Cmp { column, op, param } => Boolean::Cmp {
                column: column.into_static(),
                op: Cow::Owned(op.into_owned()),
                param,
            },
            Self::Like { column, pattern } => Boolean::Like {
                column: column.into_static(),
                pattern,
            },
        }
    }
}

/// Parameters bound while rendering a statement.
#[derive(Clone, Debug)]
pub struct Params {
    dialect: Dialect,
    values: Vec<Value>,
}

impl Params {
    /// An empty parameter list for statements in `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            values: vec![],
        }
    }

    /// Bind `value` and get the placeholder which references it.
    pub fn bind(&mut self, value: Value) -> String {
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }

    /// The bound values, in placeholder order.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// A `SELECT` query against a single aliased table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Select<'a> {
    table: Cow<'a, str>,
    alias: Cow<'a, str>,
    columns: Vec<Column<'a>>,
    filters: Vec<WhereClause<'a>>,
    order: Vec<(Column<'a>, Order)>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl<'a> Select<'a> {
    /// Start a query of the form `SELECT ... FROM table alias`.
    pub fn new(table: impl Into<Cow<'a, str>>, alias: impl Into<Cow<'a, str>>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            columns: vec![],
            filters: vec![],
            order: vec![],
            limit: None,
            offset: None,
        }
    }

    /// Include a column in the query results.
    ///
    /// The column appears in the results under its unqualified name.
    pub fn column(mut self, column: impl Into<Column<'a>>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Add a `WHERE` clause to the query.
    ///
    /// Multiple clauses are combined with `AND`.
    pub fn filter(mut self, clause: impl Into<WhereClause<'a>>) -> Self {
        self.filters.push(clause.into());
        self
    }

    /// Sort the results by `column`, after any previously added sort columns.
    pub fn order_by(mut self, column: impl Into<Column<'a>>, order: Order) -> Self {
        self.order.push((column.into(), order));
        self
    }

    /// Return at most `limit` rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` rows.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn columns(&self) -> &[Column<'a>] {
        &self.columns
    }

    pub fn filters(&self) -> &[WhereClause<'a>] {
        &self.filters
    }

    pub fn ordering(&self) -> &[(Column<'a>, Order)] {
        &self.order
    }

    pub fn limit_rows(&self) -> Option<usize> {
        self.limit
    }

    pub fn offset_rows(&self) -> Option<usize> {
        self.offset
    }

    /// Render this query into a [`Statement`] for `dialect`.
    ///
    /// When `minify` is set, the statement is collapsed onto a single line.
    pub fn render(self, dialect: Dialect, minify: bool) -> Statement {
        let (sep, indent) = if minify { (" ", "") } else { ("\n", "  ") };
        let mut params = Params::new(dialect);

        let columns = if self.columns.is_empty() {
            format!("{indent}*")
        } else {
            self.columns
                .iter()
                .map(|col| {
                    format!(
                        "{indent}{} AS {}",
                        col.escape(dialect),
                        dialect.quote(col.name())
                    )
                })
                .join(if minify { ", " } else { ",\n" })
        };
        let mut parts = vec![
            format!("SELECT{sep}{columns}"),
            format!(
                "FROM {} {}",
                dialect.quote(&self.table),
                dialect.quote(&self.alias)
            ),
        ];
        if !self.filters.is_empty() {
            let filter = WhereClause::all(self.filters.iter().cloned());
            parts.push(format!("WHERE {}", filter.render(&mut params)));
        }
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|(col, order)| format!("{} {order}", col.escape(dialect)))
                .join(", ");
            parts.push(format!("ORDER BY {order}"));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => parts.push(format!("LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => parts.push(format!("LIMIT {limit}")),
            (None, Some(offset)) => match dialect {
                Dialect::Postgres => parts.push(format!("OFFSET {offset}")),
                // MySQL has no bare `OFFSET`; the documented workaround is the largest limit.
                Dialect::MySql | Dialect::MariaDb => {
                    parts.push(format!("LIMIT {} OFFSET {offset}", u64::MAX))
                }
            },
            (None, None) => {}
        }

        Statement {
            sql: parts.join(sep),
            params: params.into_values(),
            select: self.into_static(),
        }
    }

    /// Remove the lifetime requirement from `self` by cloning and taking ownership of borrowed
    /// data.
    pub fn into_static(self) -> Select<'static> {
        Select {
            table: Cow::Owned(self.table.into_owned()),
            alias: Cow::Owned(self.alias.into_owned()),
            columns: self.columns.into_iter().map(Column::into_static).collect(),
            filters: self
                .filters
                .into_iter()
                .map(WhereClause::into_static)
                .collect(),
            order: self
                .order
                .into_iter()
                .map(|(col, order)| (col.into_static(), order))
                .collect(),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// A compiled statement: SQL text with placeholders, the values bound to them, and the query it
/// was rendered from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
    select: Select<'static>,
}

impl Statement {
    /// The statement text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Values bound to the placeholders in [`sql`](Self::sql), in order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// The structured query this statement was rendered from.
    pub fn select(&self) -> &Select<'static> {
        &self.select
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}

/// Escape an identifier (table name, column name, etc.) for inclusion in a PostgreSQL query.
pub fn escape_ident(s: impl AsRef<str>) -> String {
    format!("\"{}\"", s.as_ref().replace('"', "\"\""))
}
