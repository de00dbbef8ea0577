//! Error types for diagmenu
//!
//! Uses `thiserror` for library errors. Callback *statuses* are not errors:
//! they are plain [`Status`](crate::status::Status) values the navigator reacts
//! to. `DiagError` covers the infrastructure failures that end a session.

use std::path::PathBuf;
use thiserror::Error;

use crate::menu::NodeId;
use crate::status::Status;

/// Result type alias for diagmenu operations
pub type DiagResult<T> = Result<T, DiagError>;

/// Main error type for diagmenu operations
#[derive(Error, Debug)]
pub enum DiagError {
    /// IO error on the console or a config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Standard input reached end-of-file while a value was expected
    #[error("console input closed")]
    InputClosed,

    /// Linking two nodes would break the rooted, acyclic tree
    #[error("cannot attach node {child} under {parent}: {reason}")]
    InvalidTreeLink {
        parent: NodeId,
        child: NodeId,
        reason: &'static str,
    },

    /// Config file is not valid TOML or does not match the schema
    #[error("invalid config in {}: {message}", file.display())]
    ConfigParse { file: PathBuf, message: String },

    /// Config value is syntactically valid but unusable
    #[error("invalid config value for '{key}': {message}")]
    InvalidConfig { key: String, message: String },

    /// Driver call failed outside of a menu callback (startup, teardown)
    #[error("driver call '{op}' failed: {status}")]
    Driver { op: &'static str, status: Status },
}
