//! Ensures databases and users for the project are available and the user
//! has a minimum set of privileges assigned.

use hoi_core::{project, server};
use hoi_system::Mysql;

use crate::error::RunnerError;
use crate::{Dumper, Runner};

/// The minimum set of database level privileges for general project usage
/// (non-administrative tasks).
pub const DB_PRIVS: [&str; 4] = ["DELETE", "INSERT", "SELECT", "UPDATE"];

/// The minimum set of database level privileges for migrating the database
/// in use by the project.
pub const DB_ADMIN_PRIVS: [&str; 5] = ["LOCK TABLES", "ALTER", "DROP", "CREATE", "INDEX"];

fn all_privs() -> Vec<&'static str> {
    DB_PRIVS.iter().chain(DB_ADMIN_PRIVS.iter()).copied().collect()
}

pub struct DbRunner<'a> {
    p: &'a project::Config,
    sys: Mysql<'a>,
}

impl<'a> DbRunner<'a> {
    pub fn new(
        s: &'a server::Config,
        p: &'a project::Config,
        pool: &'a mysql::Pool,
    ) -> DbRunner<'a> {
        DbRunner {
            p,
            sys: Mysql::new(p, s, pool),
        }
    }
}

impl Runner for DbRunner<'_> {
    fn name(&self) -> &'static str {
        "db"
    }

    /// Revokes the granted privileges but leaves database and user intact;
    /// data is preserved across unloads.
    fn disable(&self) -> Result<(), RunnerError> {
        let privs = all_privs();
        for db in self.p.database.values() {
            self.sys.ensure_no_grant(&db.user, &db.name, &privs)?;
        }
        Ok(())
    }

    fn enable(&self) -> Result<(), RunnerError> {
        let privs = all_privs();
        for db in self.p.database.values() {
            self.sys.ensure_database(&db.name)?;
            self.sys.ensure_user(&db.user, &db.password)?;
            self.sys.ensure_grant(&db.user, &db.name, &privs)?;
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), RunnerError> {
        Ok(self.sys.reload_if_dirty()?)
    }
}

impl Dumper for DbRunner<'_> {
    /// Streams a dump of each database into the archive.
    fn dump(&self, tw: &mut tar::Builder<std::fs::File>) -> Result<(), RunnerError> {
        for db in self.p.database.values() {
            tracing::info!("dumping database {}", db.name);
            self.sys.dump_database(&db.name, tw)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_set_covers_operation_and_migration() {
        let privs = all_privs();
        assert_eq!(privs.len(), 9);
        for p in ["SELECT", "LOCK TABLES", "INDEX"] {
            assert!(privs.contains(&p));
        }
    }
}
