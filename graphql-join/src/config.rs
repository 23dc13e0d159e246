//! Process-wide configuration.
//!
//! The configuration is read once at startup, from command line arguments or the environment,
//! and stays fixed for the lifetime of the process.

use crate::pagination::PaginationMode;
use crate::sql::{db::Dialect, CompilerOptions};
use crate::Error;
use clap::{builder::BoolishValueParser, ArgAction, Parser};

/// Configuration of a GraphQL API backed by compiled SQL statements.
#[derive(Clone, Debug, Default, PartialEq, Eq, Parser)]
#[clap(name = "graphql-join")]
pub struct Options {
    /// How connection fields are paginated.
    #[clap(long, env = "PAGINATE", value_enum, default_value_t = PaginationMode::Array)]
    pub paginate: PaginationMode,

    /// Render statements on a single line with short table aliases.
    ///
    /// `MINIFY` accepts the usual spellings of a boolean, such as `1`, `yes` or `off`.
    #[clap(
        long,
        env = "MINIFY",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub minify: bool,

    /// The SQL dialect of the database.
    #[clap(long, env = "DIALECT", value_enum, default_value_t = Dialect::Postgres)]
    pub dialect: Dialect,
}

impl Options {
    /// Load the configuration from the environment alone, ignoring command line arguments.
    pub fn from_env() -> Result<Self, Error> {
        Self::try_parse_from([env!("CARGO_PKG_NAME")]).map_err(Error::config)
    }

    /// The options to compile statements with.
    ///
    /// MySQL cannot run the statements generated for paginated fields, so when pagination is
    /// enabled a MySQL dialect is compiled as MariaDB.
    pub fn compiler_options(&self) -> CompilerOptions {
        let dialect = match (self.dialect, self.paginate) {
            (Dialect::MySql, PaginationMode::Offset | PaginationMode::Keyset) => {
                tracing::info!(
                    paginate = %self.paginate,
                    "compiling MySQL statements as MariaDB"
                );
                Dialect::MariaDb
            }
            (dialect, _) => dialect,
        };
        CompilerOptions {
            dialect,
            minify: self.minify,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::env;

    fn parse(args: &[&str]) -> Options {
        Options::try_parse_from(["graphql-join"].iter().chain(args)).unwrap()
    }

    #[test]
    fn test_parse_flags() {
        let opt = parse(&["--paginate", "keyset", "--minify", "--dialect", "mariadb"]);
        assert_eq!(
            opt,
            Options {
                paginate: PaginationMode::Keyset,
                minify: true,
                dialect: Dialect::MariaDb,
            }
        );
        assert!(Options::try_parse_from(["graphql-join", "--paginate", "cursor"]).is_err());
    }

    #[test]
    fn test_from_env() {
        // Only valid MINIFY values are set, since other tests in this module parse concurrently.
        for (value, minify) in [("1", true), ("yes", true), ("0", false), ("false", false)] {
            env::set_var("MINIFY", value);
            assert_eq!(Options::from_env().unwrap().minify, minify, "MINIFY={value}");
        }
        env::remove_var("MINIFY");
        assert!(!Options::from_env().unwrap().minify);
    }

    #[test]
    fn test_mysql_promoted_when_paginating() {
        let opt = parse(&["--dialect", "mysql"]);
        assert_eq!(opt.compiler_options().dialect, Dialect::MySql);

        for mode in ["offset", "keyset"] {
            let opt = parse(&["--dialect", "mysql", "--paginate", mode]);
            assert_eq!(opt.compiler_options().dialect, Dialect::MariaDb);
        }

        let opt = parse(&["--paginate", "offset", "--minify"]);
        assert_eq!(
            opt.compiler_options(),
            CompilerOptions {
                dialect: Dialect::Postgres,
                minify: true
            }
        );
    }
}
