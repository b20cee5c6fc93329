//! The database directive.

use serde::{Deserialize, Serialize};

/// Hoi can manage database creation and users. It creates a database and a
/// user with a minimum set of privileges if they do not exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseDirective {
    /// Optional database name; defaults to the project name, with the
    /// context suffixed when the context is neither prod nor dev.
    pub name: String,
    /// Optional user; defaults to the database name.
    pub user: String,
    /// Password to access the database; must be non-empty except in dev
    /// contexts.
    pub password: String,
}
