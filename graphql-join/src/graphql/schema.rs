//! The GraphQL schema of the users API.
//!
//! ```graphql
//! type Query {
//!   version: String!
//!   database: String!
//!   dialect: String!
//!   node(id: ID!): Node
//!   users(search: String, first: Int, after: String, last: Int, before: String): UserConnection!
//!   user(id: Int): User
//!   sponsors: [Sponsor!]!
//! }
//!
//! interface Node {
//!   id: ID!
//! }
//! ```
//!
//! The pagination arguments of `users` depend on the configured pagination mode: with offset
//! pagination only `first` and `after` are accepted. `User.id` is a Relay global id, while the
//! `id` argument of `user` is the key of the `accounts` row.

use super::{resolver, Backend, Schema};
use crate::config::Options;
use crate::connection::{Connection, Edge, PageInfo};
use crate::pagination::ArgumentType;
use crate::sql::{
    db::{Row, Type},
    predicate::{MatchId, Search},
    FieldSpec,
};
use crate::Error;
use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputValue, Interface, InterfaceField, Object, TypeRef,
};
use async_std::sync::Arc;

/// Build the schema, resolving fields against `backend`.
///
/// Fails if the configured pagination mode cannot be applied to the fields of the schema.
pub fn build(backend: Backend, options: &Options) -> Result<Schema, Error> {
    let users = Arc::new(
        user_fields(FieldSpec::connection("users", "accounts", Some("id"), options.paginate)?)
            .key_type(Type::Serial)
            .filter(Search::new("search", ["first_name", "last_name"])),
    );
    let user = Arc::new(
        user_fields(FieldSpec::entity("user", "accounts").key("id"))
            .filter(MatchId::new("id", "id")),
    );
    let nodes = Arc::new(vec![(
        "User",
        Arc::new(
            user_fields(FieldSpec::entity("node", "accounts").key("id"))
                .filter(MatchId::new("id", "id")),
        ),
    )]);
    let sponsors = Arc::new(
        FieldSpec::list("sponsors", "sponsors")
            .field("firstName")
            .field("lastName")
            .field("generation")
            .via_callback(),
    );

    let mut users_field = Field::new(
        "users",
        TypeRef::named_nn("UserConnection"),
        resolver::field(users.clone()),
    )
    .argument(InputValue::new("search", TypeRef::named(TypeRef::STRING)));
    if let Some(pagination) = users.pagination() {
        for arg in pagination.arguments().arguments() {
            let ty = match arg.ty {
                ArgumentType::Int => TypeRef::INT,
                ArgumentType::String => TypeRef::STRING,
            };
            users_field = users_field.argument(InputValue::new(arg.name, TypeRef::named(ty)));
        }
    }

    let query = Object::new("Query")
        .field(Field::new(
            "version",
            TypeRef::named_nn(TypeRef::STRING),
            |_| {
                FieldFuture::new(async {
                    Ok(Some(FieldValue::value(env!("CARGO_PKG_VERSION").to_string())))
                })
            },
        ))
        .field(Field::new(
            "database",
            TypeRef::named_nn(TypeRef::STRING),
            |ctx| {
                FieldFuture::new(async move {
                    let backend = ctx.data::<Backend>()?;
                    Ok(Some(FieldValue::value(backend.describe())))
                })
            },
        ))
        .field(Field::new(
            "dialect",
            TypeRef::named_nn(TypeRef::STRING),
            |ctx| {
                FieldFuture::new(async move {
                    let backend = ctx.data::<Backend>()?;
                    Ok(Some(FieldValue::value(backend.options().dialect.to_string())))
                })
            },
        ))
        .field(
            Field::new("node", TypeRef::named("Node"), resolver::node_by_id(nodes))
                .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID))),
        )
        .field(users_field)
        .field(
            Field::new("user", TypeRef::named("User"), resolver::field(user))
                .argument(InputValue::new("id", TypeRef::named(TypeRef::INT))),
        )
        .field(Field::new(
            "sponsors",
            TypeRef::named_nn_list_nn("Sponsor"),
            resolver::field(sponsors),
        ));

    let node = Interface::new("Node").field(InterfaceField::new(
        "id",
        TypeRef::named_nn(TypeRef::ID),
    ));

    let user = Object::new("User")
        .implement("Node")
        .field(Field::new(
            "id",
            TypeRef::named_nn(TypeRef::ID),
            resolver::global_id("User", "id"),
        ))
        .field(Field::new(
            "email",
            TypeRef::named(TypeRef::STRING),
            resolver::column("email_address"),
        ))
        .field(Field::new(
            "firstName",
            TypeRef::named(TypeRef::STRING),
            resolver::column("first_name"),
        ))
        .field(Field::new(
            "lastName",
            TypeRef::named(TypeRef::STRING),
            resolver::column("last_name"),
        ))
        .field(Field::new(
            "fullName",
            TypeRef::named(TypeRef::STRING),
            resolver::full_name("first_name", "last_name"),
        ));

    let sponsor = Object::new("Sponsor")
        .field(Field::new(
            "firstName",
            TypeRef::named(TypeRef::STRING),
            resolver::column("first_name"),
        ))
        .field(Field::new(
            "lastName",
            TypeRef::named(TypeRef::STRING),
            resolver::column("last_name"),
        ))
        .field(Field::new(
            "generation",
            TypeRef::named(TypeRef::INT),
            resolver::column("generation"),
        ));

    let connection = Object::new("UserConnection")
        .field(Field::new(
            "edges",
            TypeRef::named_nn_list_nn("UserEdge"),
            resolver::parent::<Connection<Row>, _>(resolver::edges),
        ))
        .field(Field::new(
            "pageInfo",
            TypeRef::named_nn("PageInfo"),
            resolver::parent::<Connection<Row>, _>(resolver::page_info),
        ));

    let edge = Object::new("UserEdge")
        .field(Field::new(
            "cursor",
            TypeRef::named_nn(TypeRef::STRING),
            resolver::parent::<Edge<Row>, _>(resolver::cursor),
        ))
        .field(Field::new(
            "node",
            TypeRef::named_nn("User"),
            resolver::parent::<Edge<Row>, _>(resolver::node),
        ));

    let page_info = Object::new("PageInfo")
        .field(Field::new(
            "hasNextPage",
            TypeRef::named_nn(TypeRef::BOOLEAN),
            resolver::parent::<PageInfo, _>(resolver::has_next_page),
        ))
        .field(Field::new(
            "hasPreviousPage",
            TypeRef::named_nn(TypeRef::BOOLEAN),
            resolver::parent::<PageInfo, _>(resolver::has_previous_page),
        ))
        .field(Field::new(
            "startCursor",
            TypeRef::named(TypeRef::STRING),
            resolver::parent::<PageInfo, _>(resolver::start_cursor),
        ))
        .field(Field::new(
            "endCursor",
            TypeRef::named(TypeRef::STRING),
            resolver::parent::<PageInfo, _>(resolver::end_cursor),
        ));

    Schema::build(query.type_name(), None, None)
        .register(query)
        .register(node)
        .register(user)
        .register(sponsor)
        .register(connection)
        .register(edge)
        .register(page_info)
        .data(backend)
        .finish()
        .map_err(Error::config)
}

/// Declare the GraphQL fields of a user, stored in the `accounts` table.
fn user_fields(spec: FieldSpec) -> FieldSpec {
    spec.field("id")
        .field_as("email", "email_address")
        .field("firstName")
        .field("lastName")
        .computed("fullName", ["first_name", "last_name"])
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graphql::{value, Request};
    use crate::init_logging;
    use crate::pagination::PaginationMode;
    use crate::request::{Arguments, RequestContext};
    use crate::sql::db::{mock, Boolean, Column, Dialect, SchemaColumn, Type, Value, WhereClause};
    use crate::connection::to_global_id;
    use crate::sql::{compile, FieldRequest, Payload};

    async fn seed() -> mock::Connection {
        let db = mock::Connection::create();
        db.create_table_with_rows(
            "accounts",
            [
                SchemaColumn::new("id", Type::Serial),
                SchemaColumn::new("email_address", Type::Text),
                SchemaColumn::new("first_name", Type::Text),
                SchemaColumn::new("last_name", Type::Text),
            ],
            [
                ("ann@example.com", "Ann", "O'Brien"),
                ("bob@example.com", "Bob", "Smith"),
                ("carla@example.com", "Carla", "Jones"),
                ("dan@example.com", "Dan", "Obrien"),
                ("eve@example.com", "Eve", "Smith"),
            ]
            .map(|(email, first, last)| vec![email.into(), first.into(), last.into()]),
        )
        .await
        .unwrap();
        db.create_table_with_rows(
            "sponsors",
            [
                SchemaColumn::new("first_name", Type::Text),
                SchemaColumn::new("last_name", Type::Text),
                SchemaColumn::new("generation", Type::Int4),
            ],
            [
                vec!["Erlich".into(), "Bachman".into(), Value::Int4(1)],
                vec!["Peter".into(), "Gregory".into(), Value::Int4(2)],
            ],
        )
        .await
        .unwrap();
        db
    }

    fn options(paginate: PaginationMode) -> Options {
        Options {
            paginate,
            ..Default::default()
        }
    }

    async fn schema(db: &mock::Connection, options: Options) -> Schema {
        build(Backend::new(db.clone(), options.compiler_options()), &options).unwrap()
    }

    #[async_std::test]
    async fn test_first_page_every_mode() {
        init_logging();
        let db = seed().await;
        for mode in [
            PaginationMode::Array,
            PaginationMode::Offset,
            PaginationMode::Keyset,
        ] {
            let schema = schema(&db, options(mode)).await;
            let res = schema
                .execute(
                    "{
                        users(first: 2) {
                            edges { node { id fullName } }
                            pageInfo { hasNextPage hasPreviousPage }
                        }
                    }",
                )
                .await
                .into_result()
                .unwrap();
            assert_eq!(
                res.data,
                value!({
                    "users": {
                        "edges": [
                            { "node": { "id": "VXNlcjox", "fullName": "Ann O'Brien" } },
                            { "node": { "id": "VXNlcjoy", "fullName": "Bob Smith" } },
                        ],
                        "pageInfo": { "hasNextPage": true, "hasPreviousPage": false },
                    }
                }),
                "{mode}"
            );
        }
    }

    #[async_std::test]
    async fn test_next_page_by_cursor() {
        init_logging();
        let db = seed().await;
        for mode in [PaginationMode::Offset, PaginationMode::Keyset] {
            let schema = schema(&db, options(mode)).await;
            let res = schema
                .execute("{ users(first: 2) { pageInfo { endCursor } } }")
                .await
                .into_result()
                .unwrap();
            let cursor = res.data.into_json().unwrap()["users"]["pageInfo"]["endCursor"]
                .as_str()
                .unwrap()
                .to_string();

            let res = schema
                .execute(format!(
                    "{{ users(first: 2, after: \"{cursor}\") {{
                        edges {{ node {{ firstName }} }}
                        pageInfo {{ hasPreviousPage }}
                    }} }}"
                ))
                .await
                .into_result()
                .unwrap();
            assert_eq!(
                res.data,
                value!({
                    "users": {
                        "edges": [
                            { "node": { "firstName": "Carla" } },
                            { "node": { "firstName": "Dan" } },
                        ],
                        "pageInfo": { "hasPreviousPage": true },
                    }
                }),
                "{mode}"
            );
        }
    }

    #[async_std::test]
    async fn test_user_by_id() {
        init_logging();
        let db = seed().await;
        let schema = schema(&db, options(PaginationMode::Offset)).await;
        let res = schema
            .execute("{ user(id: 3) { id email } }")
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            res.data,
            value!({ "user": { "id": "VXNlcjoz", "email": "carla@example.com" } })
        );

        let statement = db.statements().await.pop().unwrap();
        assert!(statement.sql().ends_with("WHERE \"user\".\"id\" = $1"));
        assert_eq!(statement.params(), [Value::Int4(3)]);
        // Only the requested columns are read.
        assert!(!statement.sql().contains("first_name"));

        let res = schema
            .execute("{ user(id: 30) { id } }")
            .await
            .into_result()
            .unwrap();
        assert_eq!(res.data, value!({ "user": null }));
    }

    #[async_std::test]
    async fn test_node_by_global_id() {
        init_logging();
        let db = seed().await;
        let schema = schema(&db, options(PaginationMode::Keyset)).await;
        let res = schema
            .execute(
                r#"{ node(id: "VXNlcjoz") { __typename id ... on User { firstName } } }"#,
            )
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            res.data,
            value!({ "node": { "__typename": "User", "id": "VXNlcjoz", "firstName": "Carla" } })
        );
        let statement = db.statements().await.pop().unwrap();
        assert!(statement.sql().ends_with("WHERE \"node\".\"id\" = $1"));
        assert_eq!(statement.params(), [Value::Int4(3)]);

        // The id of every user in a connection resolves back to that user.
        let res = schema
            .execute(
                r#"{ users(first: 2, after: "a2V5c2V0OmludDQ6Mw==") { edges { node { id } } } }"#,
            )
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            res.data,
            value!({
                "users": {
                    "edges": [
                        { "node": { "id": "VXNlcjo0" } },
                        { "node": { "id": "VXNlcjo1" } },
                    ]
                }
            })
        );
        let res = schema
            .execute(r#"{ node(id: "VXNlcjo1") { ... on User { email } } }"#)
            .await
            .into_result()
            .unwrap();
        assert_eq!(res.data, value!({ "node": { "email": "eve@example.com" } }));

        // Missing users and unknown types resolve to null.
        for id in [to_global_id("User", 30), to_global_id("Sponsor", 1)] {
            let res = schema
                .execute(format!("{{ node(id: \"{id}\") {{ id }} }}"))
                .await
                .into_result()
                .unwrap();
            assert_eq!(res.data, value!({ "node": null }), "{id}");
        }

        // Ids that are not global ids are errors.
        for id in ["not an id".to_string(), to_global_id("User", "ann")] {
            let res = schema
                .execute(format!("{{ node(id: \"{id}\") {{ id }} }}"))
                .await;
            assert_eq!(res.errors.len(), 1, "{id}");
            assert!(
                res.errors[0].message.contains("malformed global id"),
                "{}",
                res.errors[0].message
            );
        }
    }

    #[async_std::test]
    async fn test_full_name_skips_nulls() {
        init_logging();
        let db = mock::Connection::create();
        db.create_table_with_rows(
            "accounts",
            [
                SchemaColumn::new("id", Type::Serial),
                SchemaColumn::new("first_name", Type::Text),
                SchemaColumn::new("last_name", Type::Text),
            ],
            [
                vec!["Ann".into(), Value::Null],
                vec![Value::Null, "Smith".into()],
                vec![Value::Null, Value::Null],
            ],
        )
        .await
        .unwrap();
        let schema = schema(&db, options(PaginationMode::Array)).await;
        let res = schema
            .execute("{ users { edges { node { fullName } } } }")
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            res.data,
            value!({
                "users": {
                    "edges": [
                        { "node": { "fullName": "Ann" } },
                        { "node": { "fullName": "Smith" } },
                        { "node": { "fullName": null } },
                    ]
                }
            })
        );
    }

    #[async_std::test]
    async fn test_search() {
        init_logging();
        let db = seed().await;
        let schema = schema(&db, options(PaginationMode::Array)).await;
        let res = schema
            .execute(r#"{ users(search: "o'brien") { edges { node { lastName } } } }"#)
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            res.data,
            value!({ "users": { "edges": [{ "node": { "lastName": "O'Brien" } }] } })
        );
        let statement = db.statements().await.pop().unwrap();
        assert!(!statement.sql().contains("brien"));
    }

    #[async_std::test]
    async fn test_sponsors_via_callback() {
        init_logging();
        let db = seed().await;
        let schema = schema(&db, options(PaginationMode::Keyset)).await;
        let res = schema
            .execute("{ sponsors { firstName lastName generation } }")
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            res.data,
            value!({
                "sponsors": [
                    { "firstName": "Erlich", "lastName": "Bachman", "generation": 1 },
                    { "firstName": "Peter", "lastName": "Gregory", "generation": 2 },
                ]
            })
        );
    }

    #[async_std::test]
    async fn test_metadata() {
        init_logging();
        let db = seed().await;
        let options = Options {
            paginate: PaginationMode::Offset,
            minify: true,
            dialect: Dialect::MySql,
        };
        let schema = schema(&db, options).await;
        let res = schema
            .execute("{ database dialect version }")
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            res.data,
            value!({
                "database": "mock",
                "dialect": "mariadb",
                "version": env!("CARGO_PKG_VERSION"),
            })
        );
    }

    #[async_std::test]
    async fn test_offset_arguments_are_forward_only() {
        init_logging();
        let db = seed().await;

        let sdl = schema(&db, options(PaginationMode::Offset)).await.sdl();
        assert!(sdl.contains("after: String"), "{sdl}");
        assert!(!sdl.contains("before: String"), "{sdl}");

        let schema = schema(&db, options(PaginationMode::Offset)).await;
        let res = schema.execute("{ users(last: 1) { edges { cursor } } }").await;
        assert!(!res.errors.is_empty());
    }

    #[async_std::test]
    async fn test_invalid_arguments_are_field_errors() {
        init_logging();
        let db = seed().await;
        let schema = schema(&db, options(PaginationMode::Keyset)).await;
        let res = schema
            .execute(r#"{ users(after: "bogus") { edges { cursor } } }"#)
            .await;
        assert_eq!(res.errors.len(), 1);
        assert!(
            res.errors[0].message.contains("invalid argument after"),
            "{}",
            res.errors[0].message
        );

        let res = schema.execute("{ users(first: -1) { edges { cursor } } }").await;
        assert_eq!(res.errors.len(), 1);
    }

    #[async_std::test]
    async fn test_request_context_reaches_predicates() {
        init_logging();
        let db = seed().await;
        let options = options(PaginationMode::Array);
        let me =
            |alias: &str, _: &Arguments, ctx: &RequestContext| -> Option<WhereClause<'static>> {
                let viewer = ctx.get("viewer")?.clone();
                let id = Column::qualified(alias.to_string(), "id");
                Some(Boolean::cmp(id, "=", viewer).into())
            };
        let spec = FieldSpec::entity("me", "accounts").key("id").filter(me);
        let backend = Backend::new(db.clone(), options.compiler_options());

        let request = FieldRequest::new(&spec, Arguments::new())
            .context(RequestContext::new().with("viewer", 4));
        let payload = compile(&request, backend.executor(spec.convention()), backend.options())
            .await
            .unwrap();
        assert_eq!(
            payload,
            Payload::Entity(Some(Row::new([("id", Value::Int4(4))])))
        );

        // Resolvers read the context attached to the request.
        let schema = schema(&db, options).await;
        let res = schema
            .execute(
                Request::new("{ user(id: 1) { firstName } }")
                    .data(RequestContext::new().with("viewer", 4)),
            )
            .await
            .into_result()
            .unwrap();
        assert_eq!(res.data, value!({ "user": { "firstName": "Ann" } }));
    }
}
