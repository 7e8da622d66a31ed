use std::path::PathBuf;

use thiserror::Error;

/// Everything that can abort a generation run.
///
/// Each variant carries enough context to name the offending entity in the
/// final error message; nothing is recovered locally.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("config: {0}")]
    Config(String),

    #[error("introspection failed during {op}: {source}")]
    Introspection {
        op: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("unsupported database type `{db_type}` for column {location}")]
    Type { db_type: String, location: String },

    #[error("table `{table}` has no usable primary key: {reason}")]
    UuidKey { table: String, reason: String },

    #[error("{}:{line}: {message}", file.display())]
    Parse {
        file: PathBuf,
        line: usize,
        message: String,
    },

    #[error("analysis of query `{query}` failed: {message}")]
    Analysis { query: String, message: String },

    #[error("emission of `{artifact}` failed: {message}")]
    Emission { artifact: String, message: String },
}

impl GenerateError {
    pub fn introspection(op: impl Into<String>, source: sqlx::Error) -> Self {
        GenerateError::Introspection {
            op: op.into(),
            source,
        }
    }

    pub fn analysis(query: impl Into<String>, message: impl Into<String>) -> Self {
        GenerateError::Analysis {
            query: query.into(),
            message: message.into(),
        }
    }

    pub fn emission(artifact: impl Into<String>, message: impl Into<String>) -> Self {
        GenerateError::Emission {
            artifact: artifact.into(),
            message: message.into(),
        }
    }
}
