//! Filesystem-driven completion of an under-specified Hoifile.
//!
//! Augmentation runs after parse and before validation. It inspects the
//! project directory to fill anything the Hoifile left out, so that project
//! configuration can stay lean. Augmentation is idempotent: fields already
//! present are never overwritten.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::app::AppKind;
use crate::error::{io_err, ConfigError};
use crate::project::{Config, Context};

impl Config {
    /// Augments a project configuration as read from a Hoifile.
    pub fn augment(&mut self) -> Result<(), ConfigError> {
        tracing::info!("discovering project config: {}", self.path.display());

        if self.name.is_empty() {
            // Strip the directory name of a known context suffix; the
            // context may be added back as a suffix later (see database
            // name guessing).
            let base = self
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.name = base
                .strip_suffix(&format!("_{}", self.context))
                .unwrap_or(&base)
                .to_string();
            tracing::info!("- guessed project name: {}", self.name);
        }

        self.discover_webroot()?;
        self.discover_app_kind()?;
        self.discover_assets();

        // Guess auth user names. An empty user name usually indicates that
        // auth is disabled; here a non-empty password is taken as the
        // indicator that auth is wanted.
        let name = self.name.clone();
        for d in self.domain.values_mut() {
            if !d.auth.password.is_empty() && d.auth.user.is_empty() {
                d.auth.user = name.clone();
                tracing::info!("- guessed auth user: {}", d.auth.user);
            }
        }

        self.guess_databases()?;

        if self.app.kind == AppKind::Service {
            if self.app.host.is_empty() {
                self.app.host = "localhost".to_string();
            }
            if self.app.port == 0 {
                self.app.port = self.app.free_port()?;
                tracing::info!("- allocated free port: {}", self.app.port);
            }
        }
        Ok(())
    }

    /// Discover the webroot by looking at common names and files contained
    /// within such a directory. Care is taken not to mistakenly expose a
    /// directory containing sensitive material.
    ///
    /// A directory named "webroot" is a strong indication it is intended as
    /// such. Failing that, an index.php or index.html in the project root
    /// confirms the root itself as the webroot. No other directory can
    /// become the webroot.
    fn discover_webroot(&mut self) -> Result<(), ConfigError> {
        if !self.webroot.is_empty() {
            return Ok(());
        }

        // Look in common places first, then fall back to walking the tree.
        if self.path.join("app/webroot").is_dir() {
            self.webroot = "app/webroot".to_string();
        } else if let Some(found) = find_webroot_dir(&self.path) {
            self.webroot = found.to_string_lossy().into_owned();
        } else if self.path.join("index.php").is_file() || self.path.join("index.html").is_file() {
            self.webroot = ".".to_string();
        }

        if self.webroot.is_empty() {
            return Err(ConfigError::Augment(format!(
                "failed to detect webroot in: {}",
                self.path.display()
            )));
        }
        tracing::info!("- found webroot in: {}", self.webroot);
        Ok(())
    }

    /// Detect which type of application this is.
    fn discover_app_kind(&mut self) -> Result<(), ConfigError> {
        if self.app.kind == AppKind::Unknown {
            if self.app.has_command() {
                tracing::info!("- detected service project");
                self.app.kind = AppKind::Service;
            } else if self.absolute_webroot().join("index.html").is_file() {
                tracing::info!("- detected static project");
                self.app.kind = AppKind::Static;
            } else if self.absolute_webroot().join("index.php").is_file()
                || self.path.join("app/composer.json").is_file()
            {
                tracing::info!("- detected PHP project");
                self.app.kind = AppKind::Php;
            } else {
                return Err(ConfigError::Augment(format!(
                    "failed to detect project type in: {}",
                    self.path.display()
                )));
            }
        }

        if matches!(self.app.kind, AppKind::Static | AppKind::Php) {
            tracing::info!("- found front controller, routing requests through it");
            self.app.use_front_controller = true;
        }

        if self.app.kind == AppKind::Php && self.app.use_front_controller {
            // Detect oldish PHP frameworks by inspecting the front
            // controller file for certain string patterns.
            let index = self.absolute_webroot().join("index.php");
            if index.is_file() && file_contains(&index, "cake")? {
                tracing::info!("- using legacy front controller");
                self.app.use_legacy_front_controller = true;
            }
        }
        Ok(())
    }

    /// Asset and media directories can either sit in the project root or be
    /// nested under the webroot.
    fn discover_assets(&mut self) {
        if self.has_directory(&self.absolute_webroot().join("css")) {
            tracing::info!("- using classic assets directories ('css'/'img'/'js')");
            self.use_assets = true;
            self.use_classic_assets = true;
        }
        if self.use_classic_assets || self.has_directory(&self.absolute_webroot().join("assets")) {
            self.use_webroot_nesting = true;
        }

        let base = if self.use_webroot_nesting {
            self.absolute_webroot()
        } else {
            self.path.clone()
        };

        if self.has_directory(&base.join("assets")) {
            tracing::info!("- serving unified assets directory ('assets')");
            self.use_assets = true;
        }
        if self.has_directory(&base.join("media_versions")) {
            tracing::info!("- serving media versions ('media_versions')");
            self.use_media_versions = true;
        }
        if self.has_directory(&base.join("media")) {
            tracing::info!("- serving media transfers ('media') internally");
            self.use_media_transfers = true;
        }
        if self.has_directory(&base.join("files")) {
            tracing::info!("- serving files ('files') internally");
            self.use_files = true;
        }
        if self.use_media_transfers {
            self.use_uploads = true;
        }
    }

    /// Volumes might not yet be mounted while we still want to serve data
    /// from them; on the other hand a directory might simply exist without
    /// being placed on a volume.
    fn has_directory(&self, path: &Path) -> bool {
        if path.is_dir() {
            return true;
        }
        self.volume
            .values()
            .any(|v| v.absolute_path(self) == *path)
    }

    fn guess_databases(&mut self) -> Result<(), ConfigError> {
        // Guessing always gives the same result, we can therefore only
        // guess once.
        let mut guessed_name = false;
        let name = self.name.clone();
        let context = self.context;
        let path = self.path.clone();

        for db in self.database.values_mut() {
            if db.name.is_empty() {
                if guessed_name {
                    return Err(ConfigError::Augment(format!(
                        "more than one database name to guess; giving up on augmenting: {}",
                        path.display()
                    )));
                }
                // Production and local development databases are not
                // suffixed with the context name. For other contexts the
                // database name looks like "example_stage".
                db.name = if matches!(context, Context::Prod | Context::Dev) {
                    name.clone()
                } else {
                    format!("{}_{}", name, context)
                };
                tracing::info!("- guessed database name: {}", db.name);
                guessed_name = true;
            }
            if db.user.is_empty() {
                // The user name corresponds to the database name and
                // follows the same suffixing rules.
                db.user = db.name.clone();
                tracing::info!("- guessed database user: {}", db.user);
            }
        }
        Ok(())
    }
}

/// Finds the first directory named "webroot" below root, returned relative
/// to root.
fn find_webroot_dir(root: &Path) -> Option<PathBuf> {
    for entry in WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
    {
        if entry.file_type().is_dir() && entry.file_name() == "webroot" {
            return entry.path().strip_prefix(root).ok().map(Path::to_path_buf);
        }
    }
    None
}

fn file_contains(file: &Path, search: &str) -> Result<bool, ConfigError> {
    let contents = std::fs::read_to_string(file).map_err(|e| io_err(file, e))?;
    Ok(contents.contains(search))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project_at(root: &Path, context: Context) -> Config {
        let mut cfg = Config::default();
        cfg.path = root.to_path_buf();
        cfg.context = context;
        cfg
    }

    #[test]
    fn guesses_name_stripping_context_suffix() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("acme_stage");
        fs::create_dir_all(root.join("app/webroot")).expect("mkdir");
        fs::write(root.join("app/webroot/index.php"), "<?php ?>").expect("write");

        let mut cfg = project_at(&root, Context::Stage);
        cfg.augment().expect("augment");
        assert_eq!(cfg.name, "acme");
    }

    #[test]
    fn discovers_common_webroot_and_php_kind() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("acme");
        fs::create_dir_all(root.join("app/webroot")).expect("mkdir");
        fs::write(root.join("app/webroot/index.php"), "<?php ?>").expect("write");

        let mut cfg = project_at(&root, Context::Prod);
        cfg.augment().expect("augment");
        assert_eq!(cfg.webroot, "app/webroot");
        assert_eq!(cfg.app.kind, AppKind::Php);
        assert!(cfg.app.use_front_controller);
        assert!(!cfg.app.use_legacy_front_controller);
    }

    #[test]
    fn detects_legacy_front_controller() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("acme");
        fs::create_dir_all(root.join("app/webroot")).expect("mkdir");
        fs::write(
            root.join("app/webroot/index.php"),
            "<?php include 'cake/bootstrap.php'; ?>",
        )
        .expect("write");

        let mut cfg = project_at(&root, Context::Prod);
        cfg.augment().expect("augment");
        assert!(cfg.app.use_legacy_front_controller);
    }

    #[test]
    fn root_level_index_makes_root_the_webroot() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("acme");
        fs::create_dir_all(&root).expect("mkdir");
        fs::write(root.join("index.html"), "<html></html>").expect("write");

        let mut cfg = project_at(&root, Context::Dev);
        cfg.augment().expect("augment");
        assert_eq!(cfg.webroot, ".");
        assert_eq!(cfg.app.kind, AppKind::Static);
    }

    #[test]
    fn walk_finds_nested_webroot() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("acme");
        fs::create_dir_all(root.join("site/webroot")).expect("mkdir");
        fs::write(root.join("site/webroot/index.html"), "<html></html>").expect("write");

        let mut cfg = project_at(&root, Context::Dev);
        cfg.augment().expect("augment");
        assert_eq!(cfg.webroot, "site/webroot");
    }

    #[test]
    fn missing_webroot_fails_augmentation() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("bare");
        fs::create_dir_all(&root).expect("mkdir");

        let mut cfg = project_at(&root, Context::Dev);
        assert!(cfg.augment().is_err());
    }

    #[test]
    fn guesses_database_name_with_context_suffix() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("acme");
        fs::create_dir_all(&root).expect("mkdir");
        fs::write(root.join("index.html"), "<html></html>").expect("write");

        let mut cfg = project_at(&root, Context::Stage);
        cfg.database.insert(String::new(), Default::default());
        cfg.augment().expect("augment");

        let db = cfg.database.values().next().expect("database");
        assert_eq!(db.name, "acme_stage");
        assert_eq!(db.user, "acme_stage");
    }

    #[test]
    fn refuses_to_guess_more_than_one_database_name() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("acme");
        fs::create_dir_all(&root).expect("mkdir");
        fs::write(root.join("index.html"), "<html></html>").expect("write");

        let mut cfg = project_at(&root, Context::Stage);
        cfg.database.insert("a".to_string(), Default::default());
        cfg.database.insert("b".to_string(), Default::default());
        // Both directives carry empty names (keys are only assigned during
        // parse, not here), so two names would need guessing.
        assert!(cfg.augment().is_err());
    }

    #[test]
    fn augmentation_is_idempotent() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("acme");
        fs::create_dir_all(root.join("app/webroot")).expect("mkdir");
        fs::write(root.join("app/webroot/index.php"), "<?php ?>").expect("write");

        let mut cfg = project_at(&root, Context::Prod);
        cfg.database.insert(String::new(), Default::default());
        cfg.augment().expect("first augment");
        let once = cfg.clone();
        cfg.augment().expect("second augment");
        assert_eq!(cfg, once);
    }

    #[test]
    fn service_app_gets_host_and_port() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path().join("svc");
        fs::create_dir_all(&root).expect("mkdir");
        fs::write(root.join("index.html"), "<html></html>").expect("write");

        let mut cfg = project_at(&root, Context::Dev);
        cfg.app.command = "bin/server".to_string();
        cfg.augment().expect("augment");
        assert_eq!(cfg.app.kind, AppKind::Service);
        assert_eq!(cfg.app.host, "localhost");
        assert!(cfg.app.port >= 1024);
    }
}
