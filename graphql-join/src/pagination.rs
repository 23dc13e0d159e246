//! Selection of the pagination strategy for connection fields.
//!
//! The strategy is chosen once, from the process configuration, when the schema is built. It
//! determines which pagination arguments a connection field accepts and how the compiler orders
//! and limits the statement for that field.

use crate::request::Arguments;
use crate::sql::db::Order;
use crate::Error;
use clap::ValueEnum;
use derive_more::Display;
use std::borrow::Cow;

/// The configured pagination mode.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash, ValueEnum)]
pub enum PaginationMode {
    /// Fetch every matching row and slice the page out of the full result set.
    #[default]
    #[display(fmt = "array")]
    Array,
    /// Page with `LIMIT` and `OFFSET`.
    #[display(fmt = "offset")]
    Offset,
    /// Page by seeking past the sort key of the last row seen.
    #[display(fmt = "keyset")]
    Keyset,
}

/// The sort key of a keyset-paginated field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub order: Order,
    pub key: Cow<'static, str>,
}

/// The pagination strategy of one connection field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pagination {
    Array,
    Offset { order_by: Cow<'static, str> },
    Keyset { sort_key: SortKey },
}

impl Pagination {
    /// Select the strategy for `mode`, for a field whose rows are identified by `key`.
    ///
    /// Offset and keyset pagination both need a key to order by. Asking for either without one
    /// is a configuration mismatch.
    pub fn select(mode: PaginationMode, key: Option<&'static str>) -> Result<Self, Error> {
        let pagination = match (mode, key) {
            (PaginationMode::Array, _) => Self::Array,
            (PaginationMode::Offset, Some(key)) => Self::Offset {
                order_by: key.into(),
            },
            (PaginationMode::Keyset, Some(key)) => Self::Keyset {
                sort_key: SortKey {
                    order: Order::Asc,
                    key: key.into(),
                },
            },
            (mode, None) => {
                return Err(Error::mismatch(format!(
                    "{mode} pagination requires a key to order by"
                )))
            }
        };
        tracing::debug!(%mode, ?pagination, "selected pagination strategy");
        Ok(pagination)
    }

    pub fn mode(&self) -> PaginationMode {
        match self {
            Self::Array => PaginationMode::Array,
            Self::Offset { .. } => PaginationMode::Offset,
            Self::Keyset { .. } => PaginationMode::Keyset,
        }
    }

    /// The pagination arguments accepted by a field using this strategy.
    pub fn arguments(&self) -> ArgSchema {
        match self {
            Self::Offset { .. } => ArgSchema::Forward,
            Self::Array | Self::Keyset { .. } => ArgSchema::Connection,
        }
    }

    /// How the compiler must order the statement for a field using this strategy.
    pub fn order(&self) -> Option<OrderDirective> {
        match self {
            Self::Array => None,
            Self::Offset { order_by } => Some(OrderDirective::OrderBy {
                column: order_by.clone(),
                order: Order::Asc,
            }),
            Self::Keyset { sort_key } => Some(OrderDirective::Seek(sort_key.clone())),
        }
    }
}

/// An ordering the compiler must apply to a paginated statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderDirective {
    /// Sort by `column`, and skip rows by position.
    OrderBy {
        column: Cow<'static, str>,
        order: Order,
    },
    /// Sort by the key, and skip rows by comparing against the key of a cursor.
    Seek(SortKey),
}

/// The type of a pagination argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgumentType {
    Int,
    String,
}

/// A pagination argument declared on a connection field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageArgument {
    pub name: &'static str,
    pub ty: ArgumentType,
}

const FIRST: PageArgument = PageArgument {
    name: "first",
    ty: ArgumentType::Int,
};
const AFTER: PageArgument = PageArgument {
    name: "after",
    ty: ArgumentType::String,
};
const LAST: PageArgument = PageArgument {
    name: "last",
    ty: ArgumentType::Int,
};
const BEFORE: PageArgument = PageArgument {
    name: "before",
    ty: ArgumentType::String,
};

/// The set of pagination arguments a connection field accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgSchema {
    /// `first`, `after`, `last` and `before`.
    Connection,
    /// `first` and `after` only.
    Forward,
}

impl ArgSchema {
    pub fn arguments(&self) -> &'static [PageArgument] {
        match self {
            Self::Connection => &[FIRST, AFTER, LAST, BEFORE],
            Self::Forward => &[FIRST, AFTER],
        }
    }

    /// Extract and validate the pagination arguments from a field's arguments.
    pub fn parse(&self, args: &Arguments) -> Result<PageRequest, Error> {
        if *self == Self::Forward {
            for arg in [LAST, BEFORE] {
                if args.get(arg.name).is_some() {
                    return Err(Error::invalid_argument(
                        arg.name,
                        "only forward pagination is supported",
                    ));
                }
            }
        }
        Ok(PageRequest {
            first: count(args, FIRST.name)?,
            after: cursor(args, AFTER.name)?,
            last: count(args, LAST.name)?,
            before: cursor(args, BEFORE.name)?,
        })
    }
}

fn count(args: &Arguments, name: &str) -> Result<Option<usize>, Error> {
    let Some(value) = args.get(name) else {
        return Ok(None);
    };
    let n = value
        .as_i64()
        .ok_or_else(|| Error::invalid_argument(name, "expected an integer"))?;
    usize::try_from(n)
        .map(Some)
        .map_err(|_| Error::invalid_argument(name, "must be a non-negative integer"))
}

fn cursor(args: &Arguments, name: &str) -> Result<Option<String>, Error> {
    match args.get(name) {
        None => Ok(None),
        Some(_) => args
            .text(name)
            .map(|cursor| Some(cursor.to_string()))
            .ok_or_else(|| Error::invalid_argument(name, "expected a cursor string")),
    }
}

/// A request for a page of a connection.
///
/// This is the validated form of the Relay-style pagination arguments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Take at most this many items from the start of the window.
    pub first: Option<usize>,
    /// Start the window after this cursor.
    pub after: Option<String>,
    /// Take at most this many items from the end of the window.
    pub last: Option<usize>,
    /// End the window before this cursor.
    pub before: Option<String>,
}
