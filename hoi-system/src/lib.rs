//! Idempotent primitives against the external subsystems hoi manages.
//!
//! The contract for every primitive: on success advance real host state
//! toward the goal, marking the subsystem's dirty flag if the call actually
//! mutated anything; on failure return an error without retry. Reloads are
//! batched: `reload_if_dirty` flushes a dirty subsystem exactly once and is
//! the only place a dirty flag is cleared.

pub mod error;
pub mod flag;
pub mod fs;
pub mod mysql;
pub mod nginx;
pub mod php;
pub mod ssl;
pub mod systemd;

mod cmd;

pub use self::error::SystemError;
pub use self::fs::Filesystem;
pub use self::mysql::Mysql;
pub use self::nginx::Nginx;
pub use self::php::Php;
pub use self::ssl::Ssl;
pub use self::systemd::{escape_unit_path, Systemctl, Systemd, SystemdKind};
