//! Mock instantiation of the abstract [`db`](super) interface.
//!
//! This instantiation is built on a simple in-memory database which interprets the structured
//! form of each [`Statement`] it is asked to run. It is useful for testing in isolation from an
//! actual database. Every statement it executes is recorded, so tests can inspect the SQL the
//! compiler produced.
#![cfg(any(test, feature = "mocks"))]

use super::{
    Boolean, Column, Error as _, Row, SchemaColumn, Select, Statement, Type, Value, WhereClause,
};
use crate::sql::execute::Driver;
use async_std::sync::{Arc, RwLock};
use async_trait::async_trait;
use derive_more::From;
use itertools::Itertools;
use snafu::Snafu;
use std::cmp::Ordering;
use std::collections::hash_map::{Entry, HashMap};
use std::fmt::Display;
use std::iter;

/// Errors returned by the in-memory database.
#[derive(Debug, Snafu, From)]
#[snafu(display("mock DB error: {}", message))]
pub struct Error {
    message: String,
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

impl super::Error for Error {
    fn custom(msg: impl Display) -> Self {
        Self {
            message: msg.to_string(),
        }
    }
}

/// The in-memory database.
#[derive(Debug, Default)]
struct Db {
    tables: HashMap<String, Table>,
    log: Vec<Statement>,
}

/// An in-memory table.
#[derive(Debug)]
struct Table {
    name: String,
    serial_cols: Vec<SchemaColumn<'static>>,
    explicit_cols: Vec<SchemaColumn<'static>>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    fn new(name: String, schema: Vec<SchemaColumn<'static>>) -> Self {
        // Separate the auto-incrementing columns from the columns that require explicit values.
        let (serial_cols, explicit_cols) =
            schema.into_iter().partition(|col| col.ty() == Type::Serial);
        Self {
            name,
            serial_cols,
            explicit_cols,
            rows: vec![],
        }
    }

    fn append(&mut self, rows: impl IntoIterator<Item = Vec<Value>>) -> Result<(), Error> {
        for row in rows {
            // We require a value for all columns except the serial columns (which are
            // auto-incremented).
            if row.len() != self.explicit_cols.len() {
                return Err(Error::from(format!(
                    "incorrect width for table {} (found {}, expected {})",
                    self.name,
                    row.len(),
                    self.explicit_cols.len()
                )));
            }

            let auto_values =
                iter::repeat(Value::Int4(self.rows.len() as i32 + 1)).take(self.serial_cols.len());
            self.rows.push(auto_values.chain(row).collect());
        }

        Ok(())
    }

    fn schema(&self) -> impl '_ + Iterator<Item = SchemaColumn<'static>> {
        self.serial_cols.iter().chain(&self.explicit_cols).cloned()
    }
}

impl Db {
    fn select(&self, select: &Select<'static>) -> Result<Vec<Row>, Error> {
        let table = self
            .tables
            .get(select.table())
            .ok_or_else(|| Error::from(format!("no such table {}", select.table())))?;
        let schema = table
            .schema()
            .map(|col| Column::qualified(select.alias().to_string(), col.name()))
            .collect::<Vec<_>>();

        let mut rows = table.rows.clone();
        for filter in select.filters() {
            rows = rows
                .into_iter()
                .filter_map(|row| match test(&row, &schema, filter) {
                    Ok(true) => Some(Ok(row)),
                    Ok(false) => None,
                    Err(err) => Some(Err(err)),
                })
                .try_collect()?;
        }

        if !select.ordering().is_empty() {
            let keys = select
                .ordering()
                .iter()
                .map(|(col, order)| Ok((position(&schema, col)?, *order)))
                .collect::<Result<Vec<_>, Error>>()?;
            rows.sort_by(|l, r| {
                keys.iter()
                    .map(|&(i, order)| {
                        let ord = l[i].compare(&r[i]).unwrap_or(Ordering::Equal);
                        match order {
                            super::Order::Asc => ord,
                            super::Order::Desc => ord.reverse(),
                        }
                    })
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        rows.into_iter()
            .skip(select.offset_rows().unwrap_or(0))
            .take(select.limit_rows().unwrap_or(usize::MAX))
            .map(|row| project(&row, &schema, select.columns()))
            .collect()
    }
}

/// Find the index of `column` in `schema`.
///
/// An unqualified column matches any schema column with the same name.
fn position(schema: &[Column], column: &Column) -> Result<usize, Error> {
    schema
        .iter()
        .position(|col| match column.table() {
            Some(_) => col == column,
            None => col.name() == column.name(),
        })
        .ok_or_else(|| Error::from(format!("no such column {column}")))
}

fn get<'r>(row: &'r [Value], schema: &[Column], column: &Column) -> Result<&'r Value, Error> {
    Ok(&row[position(schema, column)?])
}

fn project(row: &[Value], schema: &[Column], columns: &[Column]) -> Result<Row, Error> {
    if columns.is_empty() {
        return Ok(Row::new(
            schema
                .iter()
                .zip(row)
                .map(|(col, value)| (col.name().to_string(), value.clone())),
        ));
    }
    columns
        .iter()
        .map(|col| Ok((col.name().to_string(), get(row, schema, col)?.clone())))
        .collect::<Result<Vec<_>, Error>>()
        .map(Row::new)
}

fn test(row: &[Value], schema: &[Column], clause: &WhereClause) -> Result<bool, Error> {
    match clause {
        WhereClause::All(clauses) => {
            for clause in clauses {
                if !test(row, schema, clause)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        WhereClause::Any(clauses) => {
            for clause in clauses {
                if test(row, schema, clause)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        WhereClause::Predicate(Boolean::Cmp { column, op, param }) => {
            let value = get(row, schema, column)?;
            let Some(ord) = value.compare(param) else {
                if matches!(value, Value::Null) || matches!(param, Value::Null) {
                    return Ok(false);
                }
                return Err(Error::from(format!(
                    "type mismatch: cannot compare {} to {}",
                    value.type_name(),
                    param.type_name()
                )));
            };
            match op.as_ref() {
                "=" => Ok(ord == Ordering::Equal),
                "!=" | "<>" => Ok(ord != Ordering::Equal),
                "<" => Ok(ord == Ordering::Less),
                "<=" => Ok(ord != Ordering::Greater),
                ">" => Ok(ord == Ordering::Greater),
                ">=" => Ok(ord != Ordering::Less),
                op => Err(Error::custom(format!("unsupported operator {op}"))),
            }
        }
        WhereClause::Predicate(Boolean::Like { column, pattern }) => {
            match (get(row, schema, column)?, pattern) {
                (Value::Text(text), Value::Text(pattern)) => {
                    Ok(like(&text.to_lowercase(), &pattern.to_lowercase()))
                }
                (Value::Null, _) | (_, Value::Null) => Ok(false),
                (value, _) => Err(Error::from(format!(
                    "type mismatch: LIKE on {}",
                    value.type_name()
                ))),
            }
        }
    }
}

/// Match `text` against a SQL `LIKE` pattern.
fn like(text: &str, pattern: &str) -> bool {
    let text = text.chars().collect::<Vec<_>>();
    // `matches[j]` is true if the pattern so far matches the first `j` characters of `text`.
    let mut matches = vec![false; text.len() + 1];
    matches[0] = true;
    for p in pattern.chars() {
        let mut next = vec![false; text.len() + 1];
        match p {
            '%' => {
                let mut any = false;
                for j in 0..=text.len() {
                    any |= matches[j];
                    next[j] = any;
                }
            }
            '_' => {
                for j in 1..=text.len() {
                    next[j] = matches[j - 1];
                }
            }
            c => {
                for j in 1..=text.len() {
                    next[j] = matches[j - 1] && text[j - 1] == c;
                }
            }
        }
        matches = next;
    }
    matches[text.len()]
}

/// A connection to the in-memory database.
#[derive(Clone, Debug)]
pub struct Connection(Arc<RwLock<Db>>);

impl Connection {
    /// Create a new database and connect to it.
    ///
    /// This will create a connection to a fresh, empty database. It will not be connected or
    /// related to any previous connection or database. Once the database is created, this
    /// connection can be [cloned](Clone) in order to create multiple simultaneous connections to
    /// the same database.
    pub fn create() -> Self {
        Self(Default::default())
    }

    /// Create a table with the given columns.
    pub async fn create_table(
        &self,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = SchemaColumn<'static>>,
    ) -> Result<(), Error> {
        let mut db = self.0.write().await;
        let table = table.into();
        if let Entry::Vacant(e) = db.tables.entry(table.clone()) {
            e.insert(Table::new(table, columns.into_iter().collect()));
        }
        Ok(())
    }

    /// Create a table with the given columns and row values.
    ///
    /// Values are given for every column except the auto-increment
    /// ([`Serial`](Type::Serial)) columns, in schema order.
    pub async fn create_table_with_rows(
        &self,
        table: impl Into<String>,
        columns: impl IntoIterator<Item = SchemaColumn<'static>>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Result<(), Error> {
        let table = table.into();
        self.create_table(&table, columns).await?;

        let mut db = self.0.write().await;
        let table = db
            .tables
            .get_mut(&table)
            .ok_or_else(|| Error::from(format!("no such table {table}")))?;
        table.append(rows)
    }

    /// The statements executed against this database so far, in order.
    pub async fn statements(&self) -> Vec<Statement> {
        self.0.read().await.log.clone()
    }
}

#[async_trait]
impl Driver for Connection {
    type Error = Error;

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, Error> {
        tracing::info!(params = ?statement.params(), "{}", statement.sql());
        let mut db = self.0.write().await;
        db.log.push(statement.clone());
        db.select(statement.select())
    }

    fn describe(&self) -> String {
        "mock".into()
    }
}

#[cfg(test)]
mod test {
    use super::super::{Dialect, Order};
    use super::*;
    use crate::init_logging;
    use proptest::prelude::*;

    async fn accounts() -> Connection {
        let db = Connection::create();
        db.create_table_with_rows(
            "accounts",
            [
                SchemaColumn::new("id", Type::Serial),
                SchemaColumn::new("first_name", Type::Text),
                SchemaColumn::new("last_name", Type::Text),
            ],
            [
                vec!["Ann".into(), "O'Brien".into()],
                vec!["Bob".into(), "Smith".into()],
                vec!["Carla".into(), "Obrien".into()],
            ],
        )
        .await
        .unwrap();
        db
    }

    fn col(name: &'static str) -> Column<'static> {
        Column::qualified("a", name)
    }

    #[async_std::test]
    async fn test_select_filter_order_limit() {
        init_logging();
        let db = accounts().await;

        let stmt = Select::new("accounts", "a")
            .column(col("id"))
            .column(col("first_name"))
            .filter(Boolean::cmp(col("id"), ">", 1))
            .order_by(col("id"), Order::Desc)
            .limit(1)
            .render(Dialect::Postgres, false);
        let rows = db.query(&stmt).await.unwrap();
        assert_eq!(
            rows,
            [Row::new([
                ("id", Value::Int4(3)),
                ("first_name", Value::from("Carla"))
            ])]
        );
        assert_eq!(db.statements().await, [stmt]);
    }

    #[async_std::test]
    async fn test_select_like_any() {
        init_logging();
        let db = accounts().await;

        let stmt = Select::new("accounts", "a")
            .column(col("first_name"))
            .filter(WhereClause::any([
                Boolean::like(col("first_name"), "%o'brien%"),
                Boolean::like(col("last_name"), "%o'brien%"),
            ]))
            .render(Dialect::Postgres, true);
        let rows = db.query(&stmt).await.unwrap();
        assert_eq!(rows, [Row::new([("first_name", Value::from("Ann"))])]);
    }

    #[async_std::test]
    async fn test_select_offset_and_all_columns() {
        init_logging();
        let db = accounts().await;

        let stmt = Select::new("accounts", "a")
            .order_by(col("id"), Order::Asc)
            .offset(2)
            .render(Dialect::Postgres, false);
        let rows = db.query(&stmt).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::Int4(3)));
        assert_eq!(rows[0].get("last_name"), Some(&Value::from("Obrien")));
    }

    #[async_std::test]
    async fn test_select_errors() {
        init_logging();
        let db = accounts().await;

        let missing_table = Select::new("nope", "a").render(Dialect::Postgres, false);
        db.query(&missing_table).await.unwrap_err();

        let missing_column = Select::new("accounts", "a")
            .column(col("email"))
            .render(Dialect::Postgres, false);
        db.query(&missing_column).await.unwrap_err();

        let mismatch = Select::new("accounts", "a")
            .filter(Boolean::cmp(col("first_name"), "=", 1))
            .render(Dialect::Postgres, false);
        db.query(&mismatch).await.unwrap_err();
    }

    #[async_std::test]
    async fn test_wrong_width() {
        init_logging();
        let db = Connection::create();
        db.create_table_with_rows(
            "t",
            [
                SchemaColumn::new("id", Type::Serial),
                SchemaColumn::new("x", Type::Int4),
            ],
            [vec![Value::Int4(1), Value::Int4(2)]],
        )
        .await
        .unwrap_err();
    }

    #[test]
    fn test_like() {
        assert!(like("o'brien", "%o'brien%"));
        assert!(like("abc", "a_c"));
        assert!(like("abc", "%"));
        assert!(like("", "%"));
        assert!(!like("abc", "a_"));
        assert!(!like("abc", "%d%"));
    }

    proptest! {
        #[test]
        fn test_like_substring(text in "[a-z']{0,12}", start in 0usize..12, len in 0usize..12) {
            let start = start.min(text.len());
            let end = (start + len).min(text.len());
            let needle = &text[start..end];
            let pattern = format!("%{needle}%");
            prop_assert!(like(&text, &pattern));
            prop_assert!(like(&text, &text));
        }
    }
}
