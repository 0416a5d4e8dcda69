// Load-time failures surfaced by the storage layer

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("duplicate row in {table}: code {code:?}, year {year}")]
    DuplicateKey {
        table: &'static str,
        code: String,
        year: i64,
    },

    #[error("row in {table} references unknown year {year} (code {code:?})")]
    UnknownYear {
        table: &'static str,
        code: String,
        year: i64,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl LoadError {
    /// Classify a failed fact insert into the schema-violation taxonomy
    pub(crate) fn from_insert(table: &'static str, code: &str, year: i64, err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
            match failure.extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    return LoadError::DuplicateKey {
                        table,
                        code: code.to_string(),
                        year,
                    };
                }
                rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return LoadError::UnknownYear {
                        table,
                        code: code.to_string(),
                        year,
                    };
                }
                _ => {}
            }
        }
        LoadError::Sqlite(err)
    }
}
