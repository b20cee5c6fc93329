//! Process-wide dirty flags, one per subsystem.
//!
//! A dirty flag signals that a reload of the owning subsystem is due. Flags
//! are set by any primitive that actually mutated host state and may only be
//! cleared by the successful completion of the corresponding
//! `reload_if_dirty`. As pipelines are serialised the contention on these
//! locks is low, but races with the periodic background persistence must
//! still be prevented.

use std::sync::{Mutex, PoisonError};

pub struct DirtyFlag {
    state: Mutex<bool>,
}

impl DirtyFlag {
    pub const fn new() -> DirtyFlag {
        DirtyFlag {
            state: Mutex::new(false),
        }
    }

    pub fn mark(&self) {
        *self.lock() = true;
    }

    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    pub fn clear(&self) {
        *self.lock() = false;
    }

    /// Runs `reload` only when the flag is set, clearing it on success. The
    /// flag's lock is held for the duration, serialising reloads.
    pub fn reload_if_set<F>(&self, reload: F) -> Result<(), crate::SystemError>
    where
        F: FnOnce() -> Result<(), crate::SystemError>,
    {
        let mut state = self.lock();
        if !*state {
            return Ok(());
        }
        reload()?;
        *state = false;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, bool> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// NGINX server configuration changed.
pub static NGINX: DirtyFlag = DirtyFlag::new();
/// Unit files in the systemd unit directory changed.
pub static SYSTEMD: DirtyFlag = DirtyFlag::new();
/// Per-project PHP configuration changed.
pub static PHP: DirtyFlag = DirtyFlag::new();
/// Certificates or keys changed; forces an NGINX reload even when no
/// server block changed.
pub static SSL: DirtyFlag = DirtyFlag::new();
/// Privileges changed and have not been flushed yet.
pub static MYSQL: DirtyFlag = DirtyFlag::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_runs_only_when_marked_and_clears_on_success() {
        let flag = DirtyFlag::new();

        let mut ran = false;
        flag.reload_if_set(|| {
            ran = true;
            Ok(())
        })
        .expect("reload");
        assert!(!ran, "clean flag must not trigger a reload");

        flag.mark();
        let mut ran = false;
        flag.reload_if_set(|| {
            ran = true;
            Ok(())
        })
        .expect("reload");
        assert!(ran);
        assert!(!flag.is_set(), "successful reload clears the flag");
    }

    #[test]
    fn failed_reload_keeps_the_flag() {
        let flag = DirtyFlag::new();
        flag.mark();

        let result = flag.reload_if_set(|| {
            Err(crate::SystemError::Command {
                command: "systemctl reload nginx".to_string(),
                status: "exit status: 1".to_string(),
                stderr: String::new(),
            })
        });
        assert!(result.is_err());
        assert!(flag.is_set(), "failed reload retains the flag for retry");
    }
}
