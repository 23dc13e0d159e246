//! Relay-style connections and reconciliation of compiled results into them.
//!
//! Depending on the pagination mode, the compiler either returns a connection it has already
//! paginated in the database, or a flat list of every matching row. [`reconcile`] turns either
//! into the connection returned to the GraphQL engine. Flat lists are windowed in memory by
//! [`connection_from_array`], following the semantics of the reference Relay implementation.

use crate::pagination::{Pagination, PageRequest};
use crate::sql::compile::Payload;
use crate::sql::db::{Row, Value};
use crate::Error;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::cmp::{max, min};
use std::fmt::Display;

/// An edge in a connection: a node and the cursor marking its position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Edge<T> {
    cursor: String,
    node: T,
}

impl<T> Edge<T> {
    pub fn new(cursor: String, node: T) -> Self {
        Self { cursor, node }
    }

    /// The opaque cursor indicating this edge's position in the connection.
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    pub fn node(&self) -> &T {
        &self.node
    }
}

/// Information about the position of a page within a connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// One page of a paginated collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    /// A connection containing `edges`, with start and end cursors taken from the edges.
    pub fn new(edges: Vec<Edge<T>>, has_previous_page: bool, has_next_page: bool) -> Self {
        let page_info = PageInfo {
            has_next_page,
            has_previous_page,
            start_cursor: edges.first().map(|edge| edge.cursor.clone()),
            end_cursor: edges.last().map(|edge| edge.cursor.clone()),
        };
        Self { edges, page_info }
    }

    pub fn nodes(&self) -> impl '_ + Iterator<Item = &T> {
        self.edges.iter().map(Edge::node)
    }
}

const ARRAY_PREFIX: &str = "arrayconnection:";
const KEYSET_PREFIX: &str = "keyset:";

/// The cursor for the item at `offset` in a list.
pub fn offset_to_cursor(offset: usize) -> String {
    STANDARD.encode(format!("{ARRAY_PREFIX}{offset}"))
}

/// The offset encoded in a cursor made by [`offset_to_cursor`].
pub fn cursor_to_offset(cursor: &str) -> Option<usize> {
    let decoded = String::from_utf8(STANDARD.decode(cursor).ok()?).ok()?;
    decoded.strip_prefix(ARRAY_PREFIX)?.parse().ok()
}

/// The cursor for the row with sort key `key`.
///
/// Returns [`None`] if the key is `NULL`, since a `NULL` key does not identify a position.
pub fn key_to_cursor(key: &Value) -> Option<String> {
    let ty = key.ty()?;
    Some(STANDARD.encode(format!("{KEYSET_PREFIX}{ty}:{key}")))
}

/// The sort key encoded in a cursor made by [`key_to_cursor`].
pub fn cursor_to_key(cursor: &str) -> Option<Value> {
    let decoded = String::from_utf8(STANDARD.decode(cursor).ok()?).ok()?;
    let (ty, value) = decoded.strip_prefix(KEYSET_PREFIX)?.split_once(':')?;
    match ty {
        "int4" => value.parse().ok().map(Value::Int4),
        "int8" => value.parse().ok().map(Value::Int8),
        "bool" => value.parse().ok().map(Value::Bool),
        "text" => Some(Value::Text(value.into())),
        _ => None,
    }
}

/// The Relay global id of the object of GraphQL type `ty` with key `id`.
pub fn to_global_id(ty: &str, id: impl Display) -> String {
    STANDARD.encode(format!("{ty}:{id}"))
}

/// The GraphQL type name and key encoded in a global id made by [`to_global_id`].
pub fn from_global_id(id: &str) -> Option<(String, String)> {
    let decoded = String::from_utf8(STANDARD.decode(id).ok()?).ok()?;
    let (ty, id) = decoded.split_once(':')?;
    Some((ty.to_string(), id.to_string()))
}

/// Build a connection from a complete list of items.
///
/// The window is computed from `page` against the full list. Cursors which cannot be decoded
/// are ignored, as though they were not given.
pub fn connection_from_array<T>(items: Vec<T>, page: &PageRequest) -> Connection<T> {
    let len = items.len();
    let before = page
        .before
        .as_deref()
        .and_then(cursor_to_offset)
        .unwrap_or(len);
    let lower_bound = page
        .after
        .as_deref()
        .and_then(cursor_to_offset)
        .map_or(0, |after| after.saturating_add(1));

    let mut start = lower_bound;
    let mut end = min(before, len);
    if let Some(first) = page.first {
        end = min(end, start.saturating_add(first));
    }
    if let Some(last) = page.last {
        start = max(start, end.saturating_sub(last));
    }

    let edges = items
        .into_iter()
        .enumerate()
        .skip(start)
        .take(end.saturating_sub(start))
        .map(|(i, node)| Edge::new(offset_to_cursor(i), node))
        .collect();
    let has_previous_page = page.last.is_some() && start > lower_bound;
    let has_next_page = page.first.is_some() && end < before;
    Connection::new(edges, has_previous_page, has_next_page)
}

/// Shape the compiled result of a connection field into the connection returned to the caller.
///
/// In array mode the compiler returns every matching row, which is windowed here. In offset and
/// keyset modes the compiler has already paginated the result and it passes through unchanged.
/// Any other combination means the field and the compiler disagree about the pagination mode.
pub fn reconcile(
    payload: Payload,
    page: &PageRequest,
    pagination: &Pagination,
) -> Result<Connection<Row>, Error> {
    match (pagination, payload) {
        (Pagination::Array, Payload::List(rows)) => {
            tracing::debug!(rows = rows.len(), ?page, "slicing connection from array");
            Ok(connection_from_array(rows, page))
        }
        (Pagination::Offset { .. } | Pagination::Keyset { .. }, Payload::Connection(conn)) => {
            Ok(conn)
        }
        (pagination, payload) => Err(Error::mismatch(format!(
            "{} pagination cannot reconcile a {} result",
            pagination.mode(),
            payload.shape_name()
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn page(
        first: Option<usize>,
        after: Option<usize>,
        last: Option<usize>,
        before: Option<usize>,
    ) -> PageRequest {
        PageRequest {
            first,
            after: after.map(offset_to_cursor),
            last,
            before: before.map(offset_to_cursor),
        }
    }

    fn users(n: usize) -> Vec<Row> {
        (1..=n)
            .map(|id| Row::new([("id", Value::Int4(id as i32))]))
            .collect()
    }

    #[test]
    fn test_cursor_format() {
        assert_eq!(offset_to_cursor(0), "YXJyYXljb25uZWN0aW9uOjA=");
        assert_eq!(cursor_to_offset("YXJyYXljb25uZWN0aW9uOjA="), Some(0));
        assert_eq!(cursor_to_offset("not a cursor"), None);
        assert_eq!(cursor_to_key(&offset_to_cursor(3)), None);
        assert_eq!(key_to_cursor(&Value::Null), None);
        assert_eq!(
            cursor_to_key(&key_to_cursor(&Value::from("a:b")).unwrap()),
            Some(Value::from("a:b"))
        );
    }

    #[test]
    fn test_global_ids() {
        assert_eq!(to_global_id("User", 1), "VXNlcjox");
        assert_eq!(
            from_global_id("VXNlcjox"),
            Some(("User".to_string(), "1".to_string()))
        );
        assert_eq!(from_global_id(&to_global_id("Sponsor", "a:b")).unwrap().1, "a:b");
        assert_eq!(from_global_id("not an id"), None);
    }

    #[test]
    fn test_first_two_of_five() {
        let conn = connection_from_array(users(5), &page(Some(2), None, None, None));
        assert_eq!(conn.edges.len(), 2);
        assert!(conn.page_info.has_next_page);
        assert!(!conn.page_info.has_previous_page);
        assert_eq!(conn.page_info.start_cursor, Some(offset_to_cursor(0)));
        assert_eq!(conn.page_info.end_cursor, Some(offset_to_cursor(1)));
    }

    #[test]
    fn test_after_and_last() {
        let conn = connection_from_array(users(5), &page(Some(2), Some(1), None, None));
        assert_eq!(
            conn.nodes().map(|row| row.get("id").cloned()).collect::<Vec<_>>(),
            [Some(Value::Int4(3)), Some(Value::Int4(4))]
        );
        assert!(conn.page_info.has_next_page);
        // Relay only reports a previous page when paginating backwards.
        assert!(!conn.page_info.has_previous_page);

        let conn = connection_from_array(users(5), &page(None, None, Some(2), None));
        assert_eq!(conn.edges[0].cursor(), offset_to_cursor(3));
        assert!(conn.page_info.has_previous_page);
        assert!(!conn.page_info.has_next_page);

        let conn = connection_from_array(users(5), &page(None, None, Some(2), Some(2)));
        assert_eq!(conn.edges[0].cursor(), offset_to_cursor(0));
        assert!(!conn.page_info.has_previous_page);
    }

    #[test]
    fn test_empty_windows() {
        let conn = connection_from_array(users(3), &page(Some(0), None, None, None));
        assert!(conn.edges.is_empty());
        assert!(conn.page_info.has_next_page);
        assert_eq!(conn.page_info.start_cursor, None);

        let conn = connection_from_array(users(3), &page(Some(2), Some(7), None, None));
        assert!(conn.edges.is_empty());
        assert!(!conn.page_info.has_next_page);

        let conn = connection_from_array(Vec::<Row>::new(), &PageRequest::default());
        assert_eq!(conn, Connection::default());
    }

    #[test]
    fn test_after_last_possible_offset() {
        let conn = connection_from_array(users(3), &page(Some(2), Some(usize::MAX), None, None));
        assert!(conn.edges.is_empty());
        assert!(!conn.page_info.has_next_page);
        assert!(!conn.page_info.has_previous_page);

        let conn = connection_from_array(users(3), &page(None, Some(usize::MAX), Some(1), None));
        assert!(conn.edges.is_empty());
    }

    #[test]
    fn test_reconcile() {
        let rows = users(4);
        let conn = reconcile(
            Payload::List(rows.clone()),
            &page(Some(1), None, None, None),
            &Pagination::Array,
        )
        .unwrap();
        assert_eq!(conn.edges.len(), 1);

        let paginated = Connection::new(
            vec![Edge::new(offset_to_cursor(0), rows[0].clone())],
            false,
            true,
        );
        let offset = Pagination::Offset {
            order_by: "id".into(),
        };
        assert_eq!(
            reconcile(
                Payload::Connection(paginated.clone()),
                &page(Some(1), None, None, None),
                &offset
            )
            .unwrap(),
            paginated
        );

        let err = reconcile(
            Payload::Connection(paginated),
            &PageRequest::default(),
            &Pagination::Array,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ConfigurationMismatch { .. }), "{err}");

        let err = reconcile(Payload::List(rows), &PageRequest::default(), &offset).unwrap_err();
        assert!(matches!(err, Error::ConfigurationMismatch { .. }), "{err}");
    }

    proptest! {
        #[test]
        fn test_window_bounds(
            len in 0usize..20,
            first in proptest::option::of(0usize..10),
            after in proptest::option::of(0usize..20),
        ) {
            let items = (0..len).collect::<Vec<_>>();
            let conn = connection_from_array(items, &page(first, after, None, None));
            let start = after.map_or(0, |after| after + 1);
            let remaining = len.saturating_sub(start);
            if let Some(first) = first {
                prop_assert_eq!(conn.edges.len(), min(first, remaining));
                prop_assert_eq!(conn.page_info.has_next_page, remaining > first);
            } else {
                prop_assert_eq!(conn.edges.len(), remaining);
                prop_assert!(!conn.page_info.has_next_page);
            }
            for (edge, i) in conn.edges.iter().zip(start..) {
                prop_assert_eq!(*edge.node(), i);
                prop_assert_eq!(cursor_to_offset(edge.cursor()), Some(i));
            }
        }
    }
}
