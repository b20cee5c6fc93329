//! MySQL adapter: idempotent provisioning of databases, users and grants.
//!
//! All primitives are individually atomic on the server side, so no reload
//! lock is needed; the dirty flag tracks whether privileges still need
//! flushing.

use std::io::{Seek, SeekFrom};
use std::time::{SystemTime, UNIX_EPOCH};

use ::mysql::prelude::Queryable;
use ::mysql::{Pool, PooledConn};

use hoi_core::{project, server};

use crate::error::{io_err, SystemError};
use crate::flag;

pub struct Mysql<'a> {
    p: &'a project::Config,
    s: &'a server::Config,
    pool: &'a Pool,
}

impl<'a> Mysql<'a> {
    pub fn new(p: &'a project::Config, s: &'a server::Config, pool: &'a Pool) -> Mysql<'a> {
        Mysql { p, s, pool }
    }

    pub fn ensure_database(&self, database: &str) -> Result<(), SystemError> {
        let mut conn = self.pool.get_conn()?;
        exec_marking_dirty(&mut conn, &format!("CREATE DATABASE IF NOT EXISTS {database}"))
    }

    pub fn has_user(&self, user: &str) -> Result<bool, SystemError> {
        let mut conn = self.pool.get_conn()?;
        let count: Option<u64> = conn.exec_first(
            "SELECT COUNT(*) FROM mysql.user WHERE User = ? AND Host = 'localhost'",
            (user,),
        )?;
        Ok(count.unwrap_or(0) > 0)
    }

    pub fn has_password(&self, user: &str, password: &str) -> Result<bool, SystemError> {
        let mut conn = self.pool.get_conn()?;
        let count: Option<u64> = conn.exec_first(
            "SELECT COUNT(*) FROM mysql.user WHERE User = ? AND Host = 'localhost' AND CAST(Password as Binary) = PASSWORD(?)",
            (user, password),
        )?;
        Ok(count.unwrap_or(0) > 0)
    }

    /// Creates the user if absent. A present user whose stored hash differs
    /// gets the password rewritten.
    pub fn ensure_user(&self, user: &str, password: &str) -> Result<(), SystemError> {
        self.check_restricted_user(user)?;

        if self.has_user(user)? {
            if self.has_password(user, password)? {
                return Ok(());
            }
            // Changing passwords on shared user accounts can have
            // unintended side effects, give a heads up. Current hoi
            // versions do not share accounts between projects, older ones
            // did.
            tracing::info!("changing MySQL password for user '{}'", user);

            let sql = if self.s.mysql.use_legacy {
                // PASSWORD() is deprecated, legacy servers only.
                format!("SET PASSWORD FOR '{user}'@'localhost' = PASSWORD('{password}')")
            } else {
                // Supported since MySQL 5.7.6.
                format!("ALTER USER '{user}'@'localhost' IDENTIFIED BY '{password}'")
            };
            let mut conn = self.pool.get_conn()?;
            return exec_marking_dirty(&mut conn, &sql);
        }

        let mut conn = self.pool.get_conn()?;
        exec_marking_dirty(
            &mut conn,
            &format!("CREATE USER '{user}'@'localhost' IDENTIFIED BY '{password}'"),
        )
    }

    /// Ensures at least the given privileges are granted to the user on
    /// database level.
    pub fn ensure_grant(
        &self,
        user: &str,
        database: &str,
        privs: &[&str],
    ) -> Result<(), SystemError> {
        self.check_restricted_user(user)?;

        if !self.has_user(user)? {
            return Ok(()); // do not even try to grant
        }
        let mut conn = self.pool.get_conn()?;
        for priv_ in privs {
            exec_marking_dirty(
                &mut conn,
                &format!("GRANT {priv_} ON {database}.* TO '{user}'@'localhost'"),
            )?;
        }
        Ok(())
    }

    /// Mirror of [`Mysql::ensure_grant`]. Revoking a privilege that was
    /// never granted is not an error; querying for present privileges is
    /// tedious, so such failures are skipped.
    pub fn ensure_no_grant(
        &self,
        user: &str,
        database: &str,
        privs: &[&str],
    ) -> Result<(), SystemError> {
        self.check_restricted_user(user)?;

        if !self.has_user(user)? {
            return Ok(()); // do not even try to revoke
        }
        let mut conn = self.pool.get_conn()?;
        for priv_ in privs {
            let sql = format!("REVOKE {priv_} ON {database}.* FROM '{user}'@'localhost'");
            if let Err(err) = exec_marking_dirty(&mut conn, &sql) {
                tracing::info!(
                    "skipped revoke of {} on {} for MySQL user {}: {}",
                    priv_,
                    database,
                    user,
                    err
                );
            }
        }
        Ok(())
    }

    /// Flushes privileges when any mutating call reported rows affected,
    /// clearing the dirty flag on success.
    pub fn reload_if_dirty(&self) -> Result<(), SystemError> {
        flag::MYSQL.reload_if_set(|| {
            let dirty = |e: ::mysql::Error| SystemError::Dirty {
                subsystem: "MySQL",
                source: Box::new(e.into()),
            };
            let mut conn = self.pool.get_conn().map_err(dirty)?;
            conn.query_drop("FLUSH PRIVILEGES").map_err(dirty)
        })
    }

    /// Ensures we don't manipulate generally protected (admin) users.
    pub fn check_restricted_user(&self, user: &str) -> Result<(), SystemError> {
        if user == "root" {
            return Err(SystemError::Restricted {
                user: user.to_string(),
            });
        }
        Ok(())
    }

    /// Dumps a database into the archive as `database/<name>.sql`.
    ///
    /// Dumps can grow several GB large, so the vendor tool's output is
    /// buffered through a disk-backed temporary file to keep memory usage
    /// low.
    pub fn dump_database<W: std::io::Write>(
        &self,
        database: &str,
        tw: &mut tar::Builder<W>,
    ) -> Result<(), SystemError> {
        let mut tmp = tempfile::tempfile().map_err(|e| io_err("mysqldump buffer", e))?;

        let mut args: Vec<String> = vec!["--opt".to_string(), format!("-u{}", self.s.mysql.user)];
        if !self.s.mysql.password.is_empty() {
            args.push(format!("-p{}", self.s.mysql.password));
        }
        args.push(database.to_string());

        let status = std::process::Command::new("mysqldump")
            .args(&args)
            .stdout(tmp.try_clone().map_err(|e| io_err("mysqldump buffer", e))?)
            .status()
            .map_err(|e| io_err("mysqldump", e))?;
        if !status.success() {
            return Err(SystemError::Command {
                command: format!("mysqldump {database}"),
                status: status.to_string(),
                stderr: String::new(),
            });
        }

        // Final size is known now; rewind for reading back.
        tmp.seek(SeekFrom::Start(0))
            .map_err(|e| io_err("mysqldump buffer", e))?;
        let size = tmp
            .metadata()
            .map_err(|e| io_err("mysqldump buffer", e))?
            .len();
        tracing::info!(
            "database {} dump created for project {}, is {} bytes",
            database,
            self.p.pretty_name(),
            size
        );

        let mut header = tar::Header::new_gnu();
        header.set_size(size);
        header.set_mode(0o660);
        header.set_mtime(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        );
        header.set_entry_type(tar::EntryType::Regular);
        tw.append_data(&mut header, format!("database/{database}.sql"), &mut tmp)
            .map_err(|e| io_err("tar archive", e))?;
        Ok(())
    }
}

/// Runs a statement, marking the subsystem dirty when the server reports
/// affected rows.
fn exec_marking_dirty(conn: &mut PooledConn, sql: &str) -> Result<(), SystemError> {
    let affected = {
        let result = conn.query_iter(sql)?;
        result.affected_rows()
    };
    if affected > 0 {
        flag::MYSQL.mark();
    }
    Ok(())
}
