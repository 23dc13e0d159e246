//! Instantiation of the abstract [`db`](super) interface for PostgreSQL.
//!
//! This instantiation is built on [`async-postgres`].
#![cfg(feature = "postgres")]

use super::{Row, Statement, Value};
use crate::sql::execute::Driver;
use async_std::task::spawn;
use async_trait::async_trait;
use bytes::BytesMut;
use derive_more::From;
use futures::TryStreamExt;
use snafu::Snafu;
use std::fmt::Display;
use tokio_postgres::config::Host;
use tokio_postgres::types::{accepts, to_sql_checked, FromSql, IsNull, ToSql, Type};

pub use async_postgres::Config;

/// Errors returned by a PostgreSQL database.
#[derive(Debug, Snafu, From)]
pub enum Error {
    #[from]
    Sql {
        source: async_postgres::Error,
    },
    Connect {
        source: std::io::Error,
    },
    UnsupportedType {
        ty: Type,
    },
    Custom {
        message: String,
    },
}

impl super::Error for Error {
    fn custom(msg: impl Display) -> Self {
        Self::Custom {
            message: msg.to_string(),
        }
    }
}

/// A connection to a PostgreSQL database.
pub struct Connection {
    client: tokio_postgres::Client,
    description: String,
}

impl Connection {
    /// Establish a new connection with the given [`Config`].
    pub async fn new(config: Config) -> Result<Self, Error> {
        let description = describe_config(&config);
        let (client, conn) = async_postgres::connect(config)
            .await
            .map_err(|source| Error::Connect { source })?;
        spawn(conn);
        tracing::info!("connected to {description}");
        Ok(Self {
            client,
            description,
        })
    }

    /// Run one or more statements which take no parameters and return no rows.
    pub async fn batch_execute(&self, statements: &str) -> Result<(), Error> {
        tracing::info!("{}", statements);
        self.client.batch_execute(statements).await?;
        Ok(())
    }
}

#[async_trait]
impl Driver for Connection {
    type Error = Error;

    async fn query(&self, statement: &Statement) -> Result<Vec<Row>, Error> {
        tracing::info!(params = ?statement.params(), "{}", statement.sql());
        let params = statement.params().iter().map(|param| {
            let param: &dyn ToSql = param;
            param
        });
        let rows = self
            .client
            .query_raw(statement.sql(), params)
            .await?
            .map_err(Error::from)
            .try_collect::<Vec<_>>()
            .await?;
        rows.iter().map(convert_row).collect()
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// A human readable `postgres user@host:port/db` summary of `config`, without the password.
fn describe_config(config: &Config) -> String {
    let mut description = "postgres ".to_string();
    if let Some(user) = config.get_user() {
        description += &format!("{user}@");
    }
    let hosts = config
        .get_hosts()
        .iter()
        .enumerate()
        .map(|(i, host)| {
            let host = match host {
                Host::Tcp(host) => host.clone(),
                #[cfg(unix)]
                Host::Unix(path) => path.display().to_string(),
            };
            match config.get_ports().get(i).or(config.get_ports().first()) {
                Some(port) => format!("{host}:{port}"),
                None => host,
            }
        })
        .collect::<Vec<_>>();
    description += &hosts.join(",");
    if let Some(db) = config.get_dbname() {
        description += &format!("/{db}");
    }
    description
}

fn convert_row(row: &async_postgres::Row) -> Result<Row, Error> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let value: Option<Value> = row.try_get(i)?;
            Ok::<_, Error>((col.name().to_string(), value.unwrap_or(Value::Null)))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Row::new)
}

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>
    where
        Self: Sized,
    {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(x) => x.to_sql(ty, out),
            Self::Text(x) => x.to_sql(ty, out),
            Self::Int4(x) => x.to_sql(ty, out),
            Self::Int8(x) => x.to_sql(ty, out),
        }
    }

    accepts!(BOOL, INT4, INT8, TEXT, VARCHAR);
    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync + 'static>> {
        match ty {
            &Type::BOOL => Ok(Self::Bool(bool::from_sql(ty, raw)?)),
            &Type::INT4 => Ok(Self::Int4(i32::from_sql(ty, raw)?)),
            &Type::INT8 => Ok(Self::Int8(i64::from_sql(ty, raw)?)),
            &Type::TEXT | &Type::VARCHAR => Ok(Self::Text(String::from_sql(ty, raw)?)),
            ty => Err(Box::new(Error::UnsupportedType { ty: ty.clone() })),
        }
    }

    accepts!(BOOL, INT4, INT8, TEXT, VARCHAR);
}
