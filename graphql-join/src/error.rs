use snafu::Snafu;
use std::fmt::Display;

/// Errors encountered while resolving a field.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    /// The requested field could not be translated into a statement.
    #[snafu(display("error compiling field {field}: {error}"))]
    Compilation { field: String, error: String },

    /// The database rejected or could not run a statement.
    #[snafu(display("error executing statement: {error}"))]
    Execution { error: String },

    /// The pagination mode and the shape of a field or its results do not fit together.
    #[snafu(display("configuration mismatch: {error}"))]
    ConfigurationMismatch { error: String },

    /// A caller-supplied argument is malformed.
    #[snafu(display("invalid argument {argument}: {error}"))]
    InvalidArgument { argument: String, error: String },

    /// The process configuration could not be loaded.
    #[snafu(display("invalid configuration: {error}"))]
    Config { error: String },
}

impl Error {
    pub fn compilation(field: impl Display, error: impl Display) -> Self {
        Self::Compilation {
            field: field.to_string(),
            error: error.to_string(),
        }
    }

    pub fn execution(error: impl Display) -> Self {
        Self::Execution {
            error: error.to_string(),
        }
    }

    pub fn mismatch(error: impl Display) -> Self {
        Self::ConfigurationMismatch {
            error: error.to_string(),
        }
    }

    pub fn invalid_argument(argument: impl Display, error: impl Display) -> Self {
        Self::InvalidArgument {
            argument: argument.to_string(),
            error: error.to_string(),
        }
    }

    pub fn config(error: impl Display) -> Self {
        Self::Config {
            error: error.to_string(),
        }
    }
}
