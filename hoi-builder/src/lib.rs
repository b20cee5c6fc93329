//! Builds configuration artifacts supporting the runners.
//!
//! For each runner kind, a [`Builder`] owns a per-project subtree under the
//! configured build root: `<build>/<kind>/<project-id>/`. Templates are read
//! from `<template-root>/<kind>/` and rendered with Tera; rendered artifacts
//! are what the runners install into the subsystems.
//!
//! Templates reference two data roots by convention: `P` (the project
//! configuration) and `S` (the server configuration), plus directive
//! specific data (`C` for a cron, `W` for a worker, `V` for a volume,
//! `WebConfigPath` for the absolute build path of web artifacts).

pub mod error;

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use error::{io_err, BuildError};
use hoi_core::{project, server};

/// The kinds of build subtrees, one per runner family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Web,
    AppService,
    Php,
    Cron,
    Worker,
    Volume,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Web => "web",
            Kind::AppService => "app_service",
            Kind::Php => "php",
            Kind::Cron => "cron",
            Kind::Worker => "worker",
            Kind::Volume => "volume",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns the per-project build subtree for one runner kind.
pub struct Builder<'a> {
    kind: Kind,
    /// Optional glob, relative to the build subtree, narrowing what
    /// [`Builder::list_available`] yields.
    scope: Option<&'static str>,
    project_id: String,
    s: &'a server::Config,
}

impl<'a> Builder<'a> {
    pub fn new(kind: Kind, p: &project::Config, s: &'a server::Config) -> Builder<'a> {
        Builder {
            kind,
            scope: None,
            project_id: p.id(),
            s,
        }
    }

    pub fn scoped(
        kind: Kind,
        scope: &'static str,
        p: &project::Config,
        s: &'a server::Config,
    ) -> Builder<'a> {
        Builder {
            kind,
            scope: Some(scope),
            project_id: p.id(),
            s,
        }
    }

    /// The build subtree for this kind and project.
    pub fn path(&self) -> PathBuf {
        self.s
            .build_path
            .join(self.kind.as_str())
            .join(&self.project_id)
    }

    fn template_root(&self) -> PathBuf {
        self.s.template_path.join(self.kind.as_str())
    }

    /// Recursively removes the build subtree. Removing an absent subtree
    /// succeeds.
    pub fn clean(&self) -> Result<(), BuildError> {
        let dir = self.path();
        if !dir.exists() {
            return Ok(());
        }
        std::fs::remove_dir_all(&dir).map_err(|e| io_err(&dir, e))
    }

    /// Writes raw contents into the build subtree with regular permissions.
    pub fn write_file(&self, name: &str, contents: &[u8]) -> Result<(), BuildError> {
        let dst = self.ensure_dir(0o755)?.join(name);
        write_with_mode(&dst, contents, 0o644)
    }

    /// Writes raw contents into the build subtree with restricted
    /// permissions, for material such as password files.
    pub fn write_sensitive_file(&self, name: &str, contents: &[u8]) -> Result<(), BuildError> {
        let dst = self.ensure_dir(0o750)?.join(name);
        write_with_mode(&dst, contents, 0o640)
    }

    /// Loads raw template text from `<template-root>/<kind>/<name>`.
    pub fn load_template(&self, name: &str) -> Result<String, BuildError> {
        let path = self.template_root().join(name);
        std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))
    }

    /// Renders a template and writes the result into the build subtree.
    ///
    /// Rendering happens fully in memory, so a failed render never leaves
    /// partial output behind.
    pub fn write_template(
        &self,
        name: &str,
        template: &str,
        ctx: &tera::Context,
    ) -> Result<(), BuildError> {
        let rendered = render(name, template, ctx)?;
        self.write_file(name, rendered.as_bytes())
    }

    /// Like [`Builder::write_template`], for sensitive material.
    pub fn write_sensitive_template(
        &self,
        name: &str,
        template: &str,
        ctx: &tera::Context,
    ) -> Result<(), BuildError> {
        let rendered = render(name, template, ctx)?;
        self.write_sensitive_file(name, rendered.as_bytes())
    }

    /// Recursively crawls the template directory for this kind and
    /// generates files off every template found there, mirroring the tree
    /// into the build subtree.
    ///
    /// All files are loaded into one engine first, so templates may include
    /// one another by their relative names.
    pub fn load_write_templates(&self, ctx: &tera::Context) -> Result<(), BuildError> {
        let src_root = self.template_root();
        if !src_root.is_dir() {
            return Err(BuildError::MissingTemplates { path: src_root });
        }
        let dst_root = self.ensure_dir(0o755)?;

        let mut tera = tera::Tera::default();
        let mut names = Vec::new();

        for entry in WalkDir::new(&src_root).min_depth(1) {
            let entry = entry.map_err(|e| BuildError::Io {
                path: src_root.clone(),
                source: e.into(),
            })?;
            let Ok(rel) = entry.path().strip_prefix(&src_root) else {
                continue;
            };
            let rel = rel.to_path_buf();

            if entry.file_type().is_dir() {
                let dir = dst_root.join(&rel);
                mkdir_all(&dir, 0o755)?;
                continue;
            }

            let name = rel.to_string_lossy().into_owned();
            let contents =
                std::fs::read_to_string(entry.path()).map_err(|e| io_err(entry.path(), e))?;
            tera.add_raw_template(&name, &contents)
                .map_err(|source| BuildError::Template {
                    name: name.clone(),
                    source,
                })?;
            names.push(name);
        }

        for name in names {
            let rendered = tera
                .render(&name, ctx)
                .map_err(|source| BuildError::Template {
                    name: name.clone(),
                    source,
                })?;
            let dst = dst_root.join(&name);
            write_with_mode(&dst, rendered.as_bytes(), 0o644)?;
        }
        Ok(())
    }

    /// Enumerates built files, honoring the scope when one was given.
    pub fn list_available(&self) -> Result<Vec<PathBuf>, BuildError> {
        let dir = self.path();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let pattern = dir
            .join(self.scope.unwrap_or("*"))
            .to_string_lossy()
            .into_owned();
        let entries = glob::glob(&pattern).map_err(|e| BuildError::Pattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| BuildError::Pattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn ensure_dir(&self, mode: u32) -> Result<PathBuf, BuildError> {
        let dir = self.path();
        mkdir_all(&dir, mode)?;
        Ok(dir)
    }
}

fn render(name: &str, template: &str, ctx: &tera::Context) -> Result<String, BuildError> {
    tera::Tera::one_off(template, ctx, false).map_err(|source| BuildError::Template {
        name: name.to_string(),
        source,
    })
}

fn mkdir_all(dir: &Path, mode: u32) -> Result<(), BuildError> {
    if dir.exists() {
        return Ok(());
    }
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(dir)
        .map_err(|e| io_err(dir, e))
}

fn write_with_mode(dst: &Path, contents: &[u8], mode: u32) -> Result<(), BuildError> {
    let mut fh = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(mode)
        .open(dst)
        .map_err(|e| io_err(dst, e))?;
    fh.write_all(contents).map_err(|e| io_err(dst, e))
}

/// Assembles the conventional template context with the `P` and `S` roots.
pub fn base_context(p: &project::Config, s: &server::Config) -> tera::Context {
    let mut ctx = tera::Context::new();
    ctx.insert("P", p);
    ctx.insert("S", s);
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, project::Config, server::Config) {
        let tmp = TempDir::new().expect("tempdir");
        let mut p = project::Config::default();
        p.path = "/var/www/foo".into();
        p.name = "foo".to_string();

        let mut s = server::Config::default();
        s.template_path = tmp.path().join("templates");
        s.build_path = tmp.path().join("build");
        (tmp, p, s)
    }

    #[test]
    fn path_is_namespaced_by_kind_and_project() {
        let (_tmp, p, s) = fixture();
        let b = Builder::new(Kind::Cron, &p, &s);
        assert_eq!(b.path(), s.build_path.join("cron").join(p.id()));
    }

    #[test]
    fn write_template_renders_project_data() {
        let (_tmp, p, s) = fixture();
        let b = Builder::new(Kind::Cron, &p, &s);
        let ctx = base_context(&p, &s);

        b.write_template("mail.service", "Description=Cron for {{ P.name }}\n", &ctx)
            .expect("write");

        let out = std::fs::read_to_string(b.path().join("mail.service")).expect("read");
        assert_eq!(out, "Description=Cron for foo\n");
    }

    #[test]
    fn sensitive_files_are_restricted() {
        let (_tmp, p, s) = fixture();
        let b = Builder::new(Kind::Web, &p, &s);
        b.write_sensitive_file("passwords", b"alice:hash\n")
            .expect("write");

        let file_mode = std::fs::metadata(b.path().join("passwords"))
            .expect("stat file")
            .permissions()
            .mode();
        let dir_mode = std::fs::metadata(b.path())
            .expect("stat dir")
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o640);
        assert_eq!(dir_mode & 0o777, 0o750);
    }

    #[test]
    fn render_failure_leaves_no_file() {
        let (_tmp, p, s) = fixture();
        let b = Builder::new(Kind::Cron, &p, &s);
        let ctx = base_context(&p, &s);

        let result = b.write_template("broken.service", "{{ P.nope.deeper }}", &ctx);
        assert!(result.is_err());
        assert!(!b.path().join("broken.service").exists());
    }

    #[test]
    fn load_write_templates_mirrors_the_tree() {
        let (_tmp, p, s) = fixture();
        let src = s.template_path.join("web").join("servers");
        std::fs::create_dir_all(&src).expect("mkdir");
        std::fs::write(
            src.join("default.conf"),
            "server_name {{ P.name }}.example.org;\n",
        )
        .expect("write template");

        let b = Builder::scoped(Kind::Web, "servers/*.conf", &p, &s);
        let ctx = base_context(&p, &s);
        b.load_write_templates(&ctx).expect("build");

        let built = b.path().join("servers").join("default.conf");
        let out = std::fs::read_to_string(&built).expect("read");
        assert_eq!(out, "server_name foo.example.org;\n");

        let listed = b.list_available().expect("list");
        assert_eq!(listed, vec![built]);
    }

    #[test]
    fn list_available_on_missing_tree_is_empty() {
        let (_tmp, p, s) = fixture();
        let b = Builder::new(Kind::Worker, &p, &s);
        assert!(b.list_available().expect("list").is_empty());
    }

    #[test]
    fn clean_removes_the_subtree() {
        let (_tmp, p, s) = fixture();
        let b = Builder::new(Kind::Cron, &p, &s);
        b.write_file("mail.timer", b"[Timer]\n").expect("write");
        assert!(b.path().exists());

        b.clean().expect("clean");
        assert!(!b.path().exists());
        b.clean().expect("clean twice");
    }
}
