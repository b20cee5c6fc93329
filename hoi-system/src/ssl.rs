//! SSL store adapter: manages certificates and keys in a central directory.
//!
//! Certs and keys live in two separate sub-directories (`certs/` and
//! `private/`). Each file is named after the project namespace and the
//! domain it belongs to; certs are suffixed `.crt`, keys `.key`.

use std::path::{Path, PathBuf};

use hoi_core::domain::{SslDirective, CERT_SELF_SIGNED, CERT_SYSTEM};
use hoi_core::{project, server};

use crate::cmd;
use crate::error::{io_err, SystemError};
use crate::flag;

pub struct Ssl<'a> {
    p: &'a project::Config,
    s: &'a server::Config,
}

impl<'a> Ssl<'a> {
    pub fn new(p: &'a project::Config, s: &'a server::Config) -> Ssl<'a> {
        Ssl { p, s }
    }

    fn ns(&self) -> String {
        format!("project_{}", self.p.id())
    }

    /// Install target for a domain's certificate.
    pub fn certificate_path(&self, fqdn: &str) -> PathBuf {
        self.s
            .ssl
            .run_path
            .join("certs")
            .join(format!("{}_{}.crt", self.ns(), fqdn))
    }

    /// Install target for a domain's certificate key.
    pub fn certificate_key_path(&self, fqdn: &str) -> PathBuf {
        self.s
            .ssl
            .run_path
            .join("private")
            .join(format!("{}_{}.key", self.ns(), fqdn))
    }

    /// Materialises key and certificate for a domain, key first. Three
    /// modes per side: generate self-signed material, copy from the
    /// server-level system certificate table, or copy a project-relative
    /// file.
    pub fn install(&self, fqdn: &str, ssl: &SslDirective) -> Result<(), SystemError> {
        let target_key = self.certificate_key_path(fqdn);
        let target_cert = self.certificate_path(fqdn);
        for target in [&target_key, &target_cert] {
            if let Some(dir) = target.parent() {
                std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            }
        }

        tracing::info!(
            "SSL is installing: {} -> {}",
            ssl.certificate_key,
            target_key.display()
        );
        match ssl.certificate_key.as_str() {
            CERT_SELF_SIGNED => {
                let key = target_key.to_string_lossy().into_owned();
                cmd::run("openssl", &["genrsa", "-out", &key, "2048"])?;
            }
            CERT_SYSTEM => {
                let src = self.s.ssl.system_certificate_key(fqdn)?;
                cmd::copy_file(Path::new(&src), &target_key)?;
            }
            path => {
                cmd::copy_file(&self.p.path.join(path), &target_key)?;
            }
        }
        flag::SSL.mark();

        tracing::info!(
            "SSL is installing: {} -> {}",
            ssl.certificate,
            target_cert.display()
        );
        match ssl.certificate.as_str() {
            CERT_SELF_SIGNED => {
                let key = target_key.to_string_lossy().into_owned();
                let cert = target_cert.to_string_lossy().into_owned();
                let subj = format!("/CN={fqdn}");
                let san = format!("subjectAltName=DNS:www.{fqdn}");
                cmd::run(
                    "openssl",
                    &[
                        "req", "-new", "-x509", "-sha256", "-nodes", "-days", "365", "-key",
                        &key, "-out", &cert, "-subj", &subj, "-addext", &san,
                    ],
                )?;
            }
            CERT_SYSTEM => {
                let src = self.s.ssl.system_certificate(fqdn)?;
                cmd::copy_file(Path::new(&src), &target_cert)?;
            }
            path => {
                cmd::copy_file(&self.p.path.join(path), &target_cert)?;
            }
        }
        Ok(())
    }

    /// Removes certificate and key for a domain.
    pub fn uninstall(&self, fqdn: &str) -> Result<(), SystemError> {
        let cert = self.certificate_path(fqdn);
        tracing::info!("SSL is uninstalling: {}", cert.display());
        std::fs::remove_file(&cert).map_err(|e| io_err(&cert, e))?;
        flag::SSL.mark();

        let key = self.certificate_key_path(fqdn);
        tracing::info!("SSL is uninstalling: {}", key.display());
        std::fs::remove_file(&key).map_err(|e| io_err(&key, e))
    }

    /// Enumerates installed domains by scanning the keys subdirectory. A
    /// missing cert for a listed key is an inconsistency install/uninstall
    /// will surface.
    pub fn list_installed(&self) -> Result<Vec<String>, SystemError> {
        let prefix = format!("{}_", self.ns());
        let dir = self.s.ssl.run_path.join("private");
        let mut domains = Vec::new();

        if !dir.exists() {
            return Ok(domains);
        }
        for entry in std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))? {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(fqdn) = name
                .strip_prefix(&prefix)
                .and_then(|n| n.strip_suffix(".key"))
            {
                domains.push(fqdn.to_string());
            }
        }
        domains.sort();
        Ok(domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture(run_path: &Path) -> (project::Config, server::Config) {
        let mut p = project::Config::default();
        p.path = "/var/www/foo".into();
        let mut s = server::Config::default();
        s.ssl.run_path = run_path.to_path_buf();
        (p, s)
    }

    #[test]
    fn installs_project_relative_material() {
        let tmp = TempDir::new().expect("tempdir");
        let project_root = TempDir::new().expect("project root");
        let (mut p, s) = fixture(tmp.path());
        p.path = project_root.path().to_path_buf();

        std::fs::create_dir_all(p.path.join("config/ssl")).expect("mkdir");
        std::fs::write(p.path.join("config/ssl/example.org.crt"), "CERT").expect("write");
        std::fs::write(p.path.join("config/ssl/example.org.key"), "KEY").expect("write");

        let ssl = Ssl::new(&p, &s);
        let directive = SslDirective {
            certificate: "config/ssl/example.org.crt".to_string(),
            certificate_key: "config/ssl/example.org.key".to_string(),
        };
        ssl.install("example.org", &directive).expect("install");

        assert!(ssl.certificate_path("example.org").exists());
        assert!(ssl.certificate_key_path("example.org").exists());
        assert_eq!(ssl.list_installed().expect("list"), vec!["example.org"]);
        assert!(flag::SSL.is_set());

        ssl.uninstall("example.org").expect("uninstall");
        assert!(ssl.list_installed().expect("list").is_empty());
        flag::SSL.clear();
    }
}
