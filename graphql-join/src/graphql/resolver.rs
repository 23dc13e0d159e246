//! Resolver functions for the dynamic schema.

use super::Backend;
use crate::connection::{from_global_id, reconcile, to_global_id, Connection, Edge, PageInfo};
use crate::request::{Arguments, RequestContext};
use crate::sql::{
    compile,
    db::{Row, Value},
    FieldRequest, FieldSpec, Payload, Shape,
};
use crate::Error;
use async_graphql::{
    dynamic::{FieldFuture, FieldValue, ResolverContext},
    Lookahead, Name, Value as GqlValue,
};
use async_std::sync::Arc;
use std::any::Any;

/// Resolve a field described by `spec`.
///
/// Entities resolve to a [`Row`], lists to a list of rows, and connections to a
/// [`Connection<Row>`](Connection).
pub fn field(
    spec: Arc<FieldSpec>,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        let spec = spec.clone();
        FieldFuture::new(async move {
            let backend = ctx.data::<Backend>()?;
            let request = {
                let selection = match spec.shape() {
                    Shape::Connection(_) => ctx.look_ahead().field("edges").field("node"),
                    Shape::Entity | Shape::List => ctx.look_ahead(),
                };
                field_request(&ctx, &spec, selection, arguments(&ctx)?)
            };
            let page = request.page()?;

            let executor = backend.executor(spec.convention());
            let payload = compile(&request, executor, backend.options()).await?;
            let value = match (spec.pagination(), payload) {
                (Some(pagination), payload) => {
                    Some(FieldValue::owned_any(reconcile(payload, &page, pagination)?))
                }
                (None, Payload::Entity(row)) => row.map(FieldValue::owned_any),
                (None, Payload::List(rows)) => {
                    Some(FieldValue::list(rows.into_iter().map(FieldValue::owned_any)))
                }
                (None, payload) => {
                    return Err(Error::mismatch(format!(
                        "field {} is not a connection but compiled to a {}",
                        spec.name(),
                        payload.shape_name()
                    ))
                    .into())
                }
            };
            Ok(value)
        })
    }
}

/// Resolve a scalar from a column of the parent [`Row`].
pub fn column(
    name: &'static str,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        FieldFuture::new(async move {
            let row = ctx.parent_value.try_downcast_ref::<Row>()?;
            Ok(row.get(name).map(|value| FieldValue::value(graphql_value(value))))
        })
    }
}

/// Resolve the concatenation of two text columns of the parent [`Row`].
///
/// `NULL` columns are left out. If both are `NULL`, so is the result.
pub fn full_name(
    first: &'static str,
    last: &'static str,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        FieldFuture::new(async move {
            let row = ctx.parent_value.try_downcast_ref::<Row>()?;
            let mut parts = vec![];
            for column in [first, last] {
                match row.get(column) {
                    None | Some(Value::Null) => {}
                    Some(value) => parts.push(String::try_from(value.clone())?),
                }
            }
            if parts.is_empty() {
                return Ok(None);
            }
            Ok(Some(FieldValue::value(parts.join(" "))))
        })
    }
}

/// Resolve the Relay global id of the parent [`Row`], an object of GraphQL type `ty` identified
/// by the `key` column.
pub fn global_id(
    ty: &'static str,
    key: &'static str,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        FieldFuture::new(async move {
            let row = ctx.parent_value.try_downcast_ref::<Row>()?;
            match row.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(id) => Ok(Some(FieldValue::value(to_global_id(ty, id)))),
            }
        })
    }
}

/// Resolve the Relay `node` field, looking up an object by its global id.
///
/// `types` pairs each GraphQL type implementing `Node` with an entity field resolving one object
/// of that type. The entity field must filter on an `id` argument, which is given the key decoded
/// from the global id. Global ids of other types resolve to `null`.
pub fn node_by_id(
    types: Arc<Vec<(&'static str, Arc<FieldSpec>)>>,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static {
    move |ctx: ResolverContext| {
        let types = types.clone();
        FieldFuture::new(async move {
            let backend = ctx.data::<Backend>()?;
            let args = arguments(&ctx)?;
            let malformed = || Error::invalid_argument("id", "malformed global id");
            let (ty, key) = args.text("id").and_then(from_global_id).ok_or_else(malformed)?;
            let Some((ty, spec)) = types.iter().find(|(name, _)| *name == ty) else {
                tracing::debug!(%ty, "no node type");
                return Ok(None);
            };
            let key = key
                .parse::<i32>()
                .map(Value::Int4)
                .or_else(|_| key.parse::<i64>().map(Value::Int8))
                .map_err(|_| malformed())?;

            let args = Arguments::new().with("id", key);
            let request = field_request(&ctx, spec, ctx.look_ahead(), args);
            let executor = backend.executor(spec.convention());
            match compile(&request, executor, backend.options()).await? {
                Payload::Entity(row) => {
                    Ok(row.map(|row| FieldValue::owned_any(row).with_type(*ty)))
                }
                payload => Err(Error::mismatch(format!(
                    "node type {ty} must resolve to an entity, not a {}",
                    payload.shape_name()
                ))
                .into()),
            }
        })
    }
}

/// Resolve a field from a parent value of type `T`.
pub fn parent<T, F>(
    f: F,
) -> impl for<'a> Fn(ResolverContext<'a>) -> FieldFuture<'a> + Send + Sync + 'static
where
    T: Any + Send + Sync,
    F: Fn(&T) -> Option<FieldValue<'static>> + Copy + Send + Sync + 'static,
{
    move |ctx: ResolverContext| {
        FieldFuture::new(async move {
            let parent = ctx.parent_value.try_downcast_ref::<T>()?;
            Ok(f(parent))
        })
    }
}

pub fn edges(conn: &Connection<Row>) -> Option<FieldValue<'static>> {
    Some(FieldValue::list(
        conn.edges.iter().cloned().map(FieldValue::owned_any),
    ))
}

pub fn page_info(conn: &Connection<Row>) -> Option<FieldValue<'static>> {
    Some(FieldValue::owned_any(conn.page_info.clone()))
}

pub fn cursor(edge: &Edge<Row>) -> Option<FieldValue<'static>> {
    Some(FieldValue::value(edge.cursor().to_string()))
}

pub fn node(edge: &Edge<Row>) -> Option<FieldValue<'static>> {
    Some(FieldValue::owned_any(edge.node().clone()))
}

pub fn has_next_page(info: &PageInfo) -> Option<FieldValue<'static>> {
    Some(FieldValue::value(info.has_next_page))
}

pub fn has_previous_page(info: &PageInfo) -> Option<FieldValue<'static>> {
    Some(FieldValue::value(info.has_previous_page))
}

pub fn start_cursor(info: &PageInfo) -> Option<FieldValue<'static>> {
    info.start_cursor.clone().map(FieldValue::value)
}

pub fn end_cursor(info: &PageInfo) -> Option<FieldValue<'static>> {
    info.end_cursor.clone().map(FieldValue::value)
}

fn field_request<'s>(
    ctx: &ResolverContext,
    spec: &'s FieldSpec,
    selection: Lookahead,
    args: Arguments,
) -> FieldRequest<'s> {
    let fields = spec
        .fields()
        .filter(|field| selection.field(field).exists())
        .collect::<Vec<_>>();
    let context = ctx
        .data_opt::<RequestContext>()
        .cloned()
        .unwrap_or_default();
    FieldRequest::new(spec, args).select(fields).context(context)
}

/// The arguments of the field being resolved.
fn arguments(ctx: &ResolverContext) -> Result<Arguments, Error> {
    ctx.args
        .iter()
        .map(|(name, value)| {
            let value = value
                .deserialize::<GqlValue>()
                .map_err(|err| Error::invalid_argument(name, err.message))?;
            Ok((name.to_string(), sql_value(name, &value)?))
        })
        .collect()
}

fn sql_value(name: &Name, value: &GqlValue) -> Result<Value, Error> {
    match value {
        GqlValue::Null => Ok(Value::Null),
        GqlValue::Boolean(b) => Ok(Value::Bool(*b)),
        GqlValue::String(s) => Ok(Value::Text(s.clone())),
        GqlValue::Number(n) => {
            let n = n
                .as_i64()
                .ok_or_else(|| Error::invalid_argument(name, "expected an integer"))?;
            Ok(i32::try_from(n).map(Value::Int4).unwrap_or(Value::Int8(n)))
        }
        _ => Err(Error::invalid_argument(name, "unsupported argument type")),
    }
}

fn graphql_value(value: &Value) -> GqlValue {
    match value {
        Value::Null => GqlValue::Null,
        Value::Bool(b) => GqlValue::Boolean(*b),
        Value::Text(s) => GqlValue::String(s.clone()),
        Value::Int4(x) => GqlValue::Number((*x).into()),
        Value::Int8(x) => GqlValue::Number((*x).into()),
    }
}
