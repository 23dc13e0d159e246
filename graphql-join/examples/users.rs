use clap::Parser;
use graphql_join::{
    config,
    prelude::*,
    sql::db::{mock, postgres, SchemaColumn, Type, Value},
};
use url::Url;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Arguments
//

const DEFAULT_QUERY: &str = "{
    users(first: 2) {
        edges { cursor node { id fullName } }
        pageInfo { hasNextPage endCursor }
    }
}";

#[derive(Clone, Debug, Parser)]
pub struct Args {
    #[clap(flatten)]
    api: config::Options,

    /// PostgreSQL server to query. The example runs against an in-memory database if not given.
    #[clap(long, env = "EXAMPLE_POSTGRES_URL")]
    db_url: Option<Url>,
    #[clap(long, env = "EXAMPLE_POSTGRES_USER", default_value = "postgres")]
    db_user: String,
    #[clap(long, env = "EXAMPLE_POSTGRES_PASSWORD", default_value = "password")]
    db_password: String,

    /// Create and populate the example tables in the PostgreSQL database.
    #[clap(long)]
    seed: bool,

    /// Print the schema instead of running a query.
    #[clap(long)]
    sdl: bool,

    #[clap(default_value = DEFAULT_QUERY)]
    query: String,
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Test data
//

const USERS: [(&str, &str, &str); 5] = [
    ("ann@example.com", "Ann", "O'Brien"),
    ("bob@example.com", "Bob", "Smith"),
    ("carla@example.com", "Carla", "Jones"),
    ("dan@example.com", "Dan", "Obrien"),
    ("eve@example.com", "Eve", "Smith"),
];

const SPONSORS: [(&str, &str, i32); 2] = [("Erlich", "Bachman", 1), ("Peter", "Gregory", 2)];

pub async fn mock_db() -> mock::Connection {
    let db = mock::Connection::create();
    db.create_table_with_rows(
        "accounts",
        [
            SchemaColumn::new("id", Type::Serial),
            SchemaColumn::new("email_address", Type::Text),
            SchemaColumn::new("first_name", Type::Text),
            SchemaColumn::new("last_name", Type::Text),
        ],
        USERS.map(|(email, first, last)| vec![email.into(), first.into(), last.into()]),
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
        SPONSORS.map(|(first, last, generation)| {
            vec![first.into(), last.into(), Value::Int4(generation)]
        }),
    )
    .await
    .unwrap();
    db
}

pub async fn postgres_db(opt: &Args, url: &Url) -> postgres::Connection {
    let mut config = postgres::Config::default();
    config
        .user(&opt.db_user)
        .password(&opt.db_password)
        .host(url.host().unwrap().to_string().as_str());
    if let Some(port) = url.port() {
        config.port(port);
    }
    let conn = postgres::Connection::new(config).await.unwrap();

    if opt.seed {
        let users = USERS
            .iter()
            .map(|(email, first, last)| {
                format!(
                    "('{}', '{}', '{}')",
                    email,
                    first.replace('\'', "''"),
                    last.replace('\'', "''")
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let sponsors = SPONSORS
            .iter()
            .map(|(first, last, generation)| format!("('{first}', '{last}', {generation})"))
            .collect::<Vec<_>>()
            .join(", ");
        conn.batch_execute(&format!(
            "CREATE TABLE accounts (
                id serial PRIMARY KEY,
                email_address text,
                first_name text,
                last_name text
            );
            CREATE TABLE sponsors (first_name text, last_name text, generation int4);
            INSERT INTO accounts (email_address, first_name, last_name) VALUES {users};
            INSERT INTO sponsors (first_name, last_name, generation) VALUES {sponsors};"
        ))
        .await
        .unwrap();
    }

    conn
}

pub async fn build_schema(opt: &Args) -> Schema {
    let compiler = opt.api.compiler_options();
    let backend = match &opt.db_url {
        Some(url) => Backend::new(postgres_db(opt, url).await, compiler),
        None => Backend::new(mock_db().await, compiler),
    };
    schema::build(backend, &opt.api).unwrap()
}

#[async_std::main]
async fn main() {
    graphql_join::init_logging();
    let opt = Args::parse();
    let schema = build_schema(&opt).await;
    if opt.sdl {
        println!("{}", schema.sdl());
        return;
    }

    let res = schema.execute(opt.query.as_str()).await;
    for err in &res.errors {
        eprintln!("{err}");
    }
    println!("{}", res.data);
}

#[cfg(test)]
mod test {
    use super::*;
    use graphql_join::init_logging;

    fn options(args: &[&str]) -> Args {
        Args::try_parse_from(["users"].iter().chain(args)).unwrap()
    }

    #[test]
    fn test_parse_args() {
        let opt = options(&["--paginate", "offset", "--dialect", "mysql", "--seed", "{ users }"]);
        assert_eq!(opt.api.paginate, PaginationMode::Offset);
        assert_eq!(opt.api.dialect, Dialect::MySql);
        assert!(opt.seed);
        assert!(!opt.sdl);
        assert_eq!(opt.db_user, "postgres");
        assert_eq!(opt.query, "{ users }");
    }

    #[async_std::test]
    async fn test_default_query() {
        init_logging();
        let opt = options(&["--paginate", "keyset"]);
        let schema = build_schema(&opt).await;
        let res = schema
            .execute(opt.query.as_str())
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            res.data,
            value!({
                "users": {
                    "edges": [
                        {
                            "cursor": "a2V5c2V0OmludDQ6MQ==",
                            "node": { "id": "VXNlcjox", "fullName": "Ann O'Brien" },
                        },
                        {
                            "cursor": "a2V5c2V0OmludDQ6Mg==",
                            "node": { "id": "VXNlcjoy", "fullName": "Bob Smith" },
                        },
                    ],
                    "pageInfo": {
                        "hasNextPage": true,
                        "endCursor": "a2V5c2V0OmludDQ6Mg==",
                    },
                }
            })
        );
    }

    #[async_std::test]
    async fn test_sdl_reflects_pagination_mode() {
        init_logging();
        let schema = build_schema(&options(&["--paginate", "offset"])).await;
        let sdl = schema.sdl();
        assert!(sdl.contains("first: Int"));
        assert!(!sdl.contains("last: Int"));

        let schema = build_schema(&options(&[])).await;
        assert!(schema.sdl().contains("last: Int"));
    }
}
