//! Serves the project under its configured domains using aliases and
//! redirects, enforcing authentication and SSL encryption as requested.

use hoi_builder::{base_context, Builder, Kind};
use hoi_core::{project, server};
use hoi_system::{flag, Nginx, Ssl};

use crate::error::RunnerError;
use crate::htpasswd;
use crate::Runner;

pub struct WebRunner<'a> {
    s: &'a server::Config,
    p: &'a project::Config,
    build: Builder<'a>,
    nginx: Nginx<'a>,
    ssl: Ssl<'a>,
}

impl<'a> WebRunner<'a> {
    pub fn new(s: &'a server::Config, p: &'a project::Config) -> WebRunner<'a> {
        WebRunner {
            s,
            p,
            build: Builder::scoped(Kind::Web, "servers/*.conf", p, s),
            nginx: Nginx::new(p, s),
            ssl: Ssl::new(p, s),
        }
    }

    fn build_artifacts(&self) -> Result<(), RunnerError> {
        if self.p.domain.is_empty() {
            return Ok(()); // nothing to do
        }

        for d in self.p.domain.values() {
            if d.ssl.is_enabled() {
                self.ssl.install(&d.fqdn, &d.ssl)?;
            }
        }

        let creds = self.p.creds();
        if !creds.is_empty() {
            // One fresh salt per build, shared by all entries of the
            // password file.
            let salt = htpasswd::generate_salt();
            let mut contents = String::new();
            for (user, password) in &creds {
                contents.push_str(&format!(
                    "{}:{}\n",
                    user,
                    htpasswd::compute_apr1(password, &salt)
                ));
            }
            self.build
                .write_sensitive_file("passwords", contents.as_bytes())?;
        }

        // Templates must reference the installed crypto material, not the
        // project-relative sources.
        let mut p = self.p.clone();
        for d in p.domain.values_mut() {
            if !d.ssl.is_enabled() {
                continue;
            }
            d.ssl.certificate = self
                .ssl
                .certificate_path(&d.fqdn)
                .to_string_lossy()
                .into_owned();
            d.ssl.certificate_key = self
                .ssl
                .certificate_key_path(&d.fqdn)
                .to_string_lossy()
                .into_owned();
        }

        let mut ctx = base_context(&p, self.s);
        // Config files should not rely on any symlinking but reference the
        // originally created files.
        ctx.insert("WebConfigPath", &self.build.path());

        self.build.load_write_templates(&ctx)?;
        Ok(())
    }
}

impl Runner for WebRunner<'_> {
    fn name(&self) -> &'static str {
        "web"
    }

    fn disable(&self) -> Result<(), RunnerError> {
        for server in self.nginx.list_installed()? {
            self.nginx.uninstall(&server)?;
        }
        for domain in self.ssl.list_installed()? {
            self.ssl.uninstall(&domain)?;
        }
        self.build.clean()?;
        Ok(())
    }

    fn enable(&self) -> Result<(), RunnerError> {
        self.build_artifacts()?;

        for file in self.build.list_available()? {
            self.nginx.install(&file)?;
        }
        Ok(())
    }

    /// New crypto material requires an NGINX reload even when no server
    /// block changed: a dirty SSL store forces the reload, and a successful
    /// reload clears both flags.
    fn commit(&self) -> Result<(), RunnerError> {
        if !flag::SSL.is_set() {
            return Ok(self.nginx.reload_if_dirty()?);
        }
        self.nginx.reload()?;
        flag::SSL.clear();
        Ok(())
    }
}
