//! Validation of project configuration.
//!
//! Validation operates over the whole configuration and cannot be split
//! into per-directive methods, as cross-directive information is often
//! needed to determine actual validity.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::ConfigError;
use crate::project::{Config, Context};

impl Config {
    /// Validates several aspects and looks for typical human errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_basics()?;
        if self.context != Context::Dev {
            self.validate_domains_have_no_test_tld()?;
        }
        self.validate_domains_are_used_once()?;
        self.validate_domains_auth()?;
        self.validate_domains_ssl()?;
        self.validate_databases()?;
        self.validate_volumes()?;
        Ok(())
    }

    /// Context and webroot cannot be autodetected reliably enough to pass
    /// silently.
    fn validate_basics(&self) -> Result<(), ConfigError> {
        if self.context == Context::Unknown {
            return Err(ConfigError::Validate(format!(
                "project has no context: {}",
                self.path.display()
            )));
        }
        if self.webroot.is_empty() {
            return Err(ConfigError::Validate(format!(
                "project has no webroot: {}",
                self.path.display()
            )));
        }
        if Path::new(&self.webroot).is_absolute() {
            return Err(ConfigError::Validate(format!(
                "webroot must not be absolute: {}",
                self.webroot
            )));
        }
        Ok(())
    }

    /// The TLD mustn't be "test" outside dev contexts. Common neglect.
    fn validate_domains_have_no_test_tld(&self) -> Result<(), ConfigError> {
        for d in self.domain.values() {
            if tld(&d.fqdn) == "test" {
                return Err(ConfigError::Validate(format!(
                    "test TLD in {} context: {}",
                    self.context, d.fqdn
                )));
            }
            for alias in &d.aliases {
                if tld(alias) == "test" {
                    return Err(ConfigError::Validate(format!(
                        "test TLD in {} context in alias: {}",
                        self.context, alias
                    )));
                }
            }
            for redirect in &d.redirects {
                if tld(redirect) == "test" {
                    return Err(ConfigError::Validate(format!(
                        "test TLD in {} context in redirect: {}",
                        self.context, redirect
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_domains_are_used_once(&self) -> Result<(), ConfigError> {
        let mut main_seen = HashSet::new();

        for d in self.domain.values() {
            if !main_seen.insert(d.fqdn.clone()) {
                return Err(ConfigError::Validate(format!(
                    "multiple domains for {}",
                    d.fqdn
                )));
            }
            let mut block_seen: HashSet<&str> = HashSet::from([d.fqdn.as_str()]);

            for alias in &d.aliases {
                if !block_seen.insert(alias) {
                    return Err(ConfigError::Validate(format!(
                        "FQDN {} used more than once in domain {}",
                        alias, d.fqdn
                    )));
                }
            }
            for redirect in &d.redirects {
                if !block_seen.insert(redirect) {
                    return Err(ConfigError::Validate(format!(
                        "FQDN {} used more than once in domain {}",
                        redirect, d.fqdn
                    )));
                }
            }
        }
        Ok(())
    }

    /// Auth credentials must follow a dedicated pattern, and as they are
    /// stored in one single password file per project, passwords mustn't
    /// differ for the same user.
    fn validate_domains_auth(&self) -> Result<(), ConfigError> {
        let mut creds: HashMap<&str, &str> = HashMap::new();

        for d in self.domain.values() {
            if d.auth.user.is_empty() && !d.auth.password.is_empty() {
                return Err(ConfigError::Validate(format!(
                    "password set but user empty for domain: {}",
                    d.fqdn
                )));
            }
            if self.context != Context::Dev && !d.auth.user.is_empty() && d.auth.password.is_empty()
            {
                return Err(ConfigError::Validate(format!(
                    "user {} has empty password for domain: {}",
                    d.auth.user, d.fqdn
                )));
            }
            if let Some(password) = creds.get(d.auth.user.as_str()) {
                if *password != d.auth.password {
                    return Err(ConfigError::Validate(format!(
                        "auth user {} given multiple times but with differing passwords for domain: {}",
                        d.auth.user, d.fqdn
                    )));
                }
            }
            creds.insert(d.auth.user.as_str(), d.auth.password.as_str());
        }
        Ok(())
    }

    fn validate_domains_ssl(&self) -> Result<(), ConfigError> {
        for d in self.domain.values() {
            let cert = &d.ssl.certificate;
            let key = &d.ssl.certificate_key;

            if !cert.is_empty() && !key.is_empty() {
                if cert.starts_with('!') || key.starts_with('!') {
                    if cert != key {
                        return Err(ConfigError::Validate(format!(
                            "cert and key indicate mix of special and regular action for domain: {}",
                            d.fqdn
                        )));
                    }
                    if cert == crate::domain::CERT_SELF_SIGNED && self.context == Context::Prod {
                        return Err(ConfigError::Validate(format!(
                            "self-signed certs are not allowed in {} contexts, domain: {}",
                            self.context, d.fqdn
                        )));
                    }
                } else if Path::new(cert).is_absolute() || Path::new(key).is_absolute() {
                    return Err(ConfigError::Validate(format!(
                        "cert or key path is absolute, must be relative, domain: {}",
                        d.fqdn
                    )));
                }
            } else if !cert.is_empty() || !key.is_empty() {
                return Err(ConfigError::Validate(format!(
                    "only cert or key set for domain: {}",
                    d.fqdn
                )));
            }
        }
        Ok(())
    }

    /// Database names must be unique, and users should for security reasons
    /// not have an empty password outside dev contexts.
    fn validate_databases(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();

        for db in self.database.values() {
            if db.name.is_empty() {
                return Err(ConfigError::Validate(
                    "found empty database name".to_string(),
                ));
            }
            if !seen.insert(db.name.as_str()) {
                return Err(ConfigError::Validate(format!(
                    "found duplicate database name: {}",
                    db.name
                )));
            }
            if self.context != Context::Dev && db.password.is_empty() {
                return Err(ConfigError::Validate(format!(
                    "user {} has empty password for database: {}",
                    db.user, db.name
                )));
            }
            if db.user == "root" {
                return Err(ConfigError::Validate(format!(
                    "user {} is a MySQL restricted user",
                    db.user
                )));
            }
        }
        Ok(())
    }

    fn validate_volumes(&self) -> Result<(), ConfigError> {
        for v in self.volume.values() {
            if Path::new(&v.path).is_absolute() {
                return Err(ConfigError::Validate(format!(
                    "volume path is not relative: {}",
                    v.path
                )));
            }
        }
        Ok(())
    }
}

/// Very simple TLD extractor. Domains only!
pub fn tld(domain: &str) -> &str {
    match domain.rfind('.') {
        Some(dot) => &domain[dot + 1..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthDirective, DomainDirective, SslDirective};

    fn valid_base(context: Context) -> Config {
        let mut cfg = Config::default();
        cfg.path = "/var/www/foo".into();
        cfg.name = "foo".to_string();
        cfg.context = context;
        cfg.webroot = "app/webroot".to_string();
        cfg
    }

    fn domain(fqdn: &str) -> DomainDirective {
        DomainDirective {
            fqdn: fqdn.to_string(),
            ..DomainDirective::default()
        }
    }

    #[test]
    fn tld_extraction() {
        assert_eq!(tld("localhost"), "");
        assert_eq!(tld("example.org"), "org");
        assert_eq!(tld("www.example.net"), "net");
    }

    #[test]
    fn missing_context_is_invalid() {
        let mut cfg = valid_base(Context::Unknown);
        cfg.context = Context::Unknown;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn absolute_webroot_is_invalid() {
        let mut cfg = valid_base(Context::Dev);
        cfg.webroot = "/var/www".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_tld_rejected_outside_dev() {
        let mut cfg = valid_base(Context::Prod);
        cfg.domain
            .insert("example.test".to_string(), domain("example.test"));
        assert!(cfg.validate().is_err());

        let mut cfg = valid_base(Context::Dev);
        cfg.domain
            .insert("example.test".to_string(), domain("example.test"));
        cfg.validate().expect("test TLD fine in dev");
    }

    #[test]
    fn test_tld_rejected_in_aliases_and_redirects() {
        let mut cfg = valid_base(Context::Stage);
        let mut d = domain("example.org");
        d.aliases.push("alias.test".to_string());
        cfg.domain.insert("example.org".to_string(), d);
        assert!(cfg.validate().is_err());

        let mut cfg = valid_base(Context::Stage);
        let mut d = domain("example.org");
        d.redirects.push("old.test".to_string());
        cfg.domain.insert("example.org".to_string(), d);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fqdn_reuse_inside_domain_block_is_invalid() {
        let mut cfg = valid_base(Context::Prod);
        let mut d = domain("example.org");
        d.aliases.push("example.org".to_string());
        cfg.domain.insert("example.org".to_string(), d);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn password_without_user_is_invalid() {
        let mut cfg = valid_base(Context::Dev);
        let mut d = domain("example.org");
        d.auth = AuthDirective {
            user: String::new(),
            password: "musik".to_string(),
        };
        cfg.domain.insert("example.org".to_string(), d);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_password_ok_only_in_dev() {
        let auth = AuthDirective {
            user: "alice".to_string(),
            password: String::new(),
        };

        let mut cfg = valid_base(Context::Dev);
        let mut d = domain("example.org");
        d.auth = auth.clone();
        cfg.domain.insert("example.org".to_string(), d);
        cfg.validate().expect("empty password fine in dev");

        let mut cfg = valid_base(Context::Stage);
        let mut d = domain("example.org");
        d.auth = auth;
        cfg.domain.insert("example.org".to_string(), d);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn same_user_must_carry_same_password() {
        let mut cfg = valid_base(Context::Prod);
        let mut a = domain("a.example.org");
        a.auth = AuthDirective {
            user: "alice".to_string(),
            password: "one".to_string(),
        };
        let mut b = domain("b.example.org");
        b.auth = AuthDirective {
            user: "alice".to_string(),
            password: "two".to_string(),
        };
        cfg.domain.insert("a.example.org".to_string(), a);
        cfg.domain.insert("b.example.org".to_string(), b);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn ssl_must_set_both_sides() {
        let mut cfg = valid_base(Context::Prod);
        let mut d = domain("example.org");
        d.ssl = SslDirective {
            certificate: "config/ssl/example.org.crt".to_string(),
            certificate_key: String::new(),
        };
        cfg.domain.insert("example.org".to_string(), d);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn ssl_special_tokens_must_match() {
        let mut cfg = valid_base(Context::Stage);
        let mut d = domain("example.org");
        d.ssl = SslDirective {
            certificate: "!self-signed".to_string(),
            certificate_key: "config/ssl/example.org.key".to_string(),
        };
        cfg.domain.insert("example.org".to_string(), d);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn self_signed_forbidden_in_prod() {
        let ssl = SslDirective {
            certificate: "!self-signed".to_string(),
            certificate_key: "!self-signed".to_string(),
        };

        let mut cfg = valid_base(Context::Dev);
        let mut d = domain("example.org");
        d.ssl = ssl.clone();
        cfg.domain.insert("example.org".to_string(), d);
        cfg.validate().expect("self-signed fine in dev");

        let mut cfg = valid_base(Context::Prod);
        let mut d = domain("example.org");
        d.ssl = ssl;
        cfg.domain.insert("example.org".to_string(), d);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn absolute_ssl_paths_are_invalid() {
        let mut cfg = valid_base(Context::Prod);
        let mut d = domain("example.org");
        d.ssl = SslDirective {
            certificate: "/etc/ssl/certs/example.org.crt".to_string(),
            certificate_key: "/etc/ssl/private/example.org.key".to_string(),
        };
        cfg.domain.insert("example.org".to_string(), d);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn database_rules() {
        // Empty name.
        let mut cfg = valid_base(Context::Dev);
        cfg.database
            .insert("a".to_string(), Default::default());
        assert!(cfg.validate().is_err());

        // Empty password outside dev.
        let mut cfg = valid_base(Context::Prod);
        cfg.database.insert(
            "foo".to_string(),
            crate::database::DatabaseDirective {
                name: "foo".to_string(),
                user: "foo".to_string(),
                password: String::new(),
            },
        );
        assert!(cfg.validate().is_err());

        // Restricted user.
        let mut cfg = valid_base(Context::Prod);
        cfg.database.insert(
            "foo".to_string(),
            crate::database::DatabaseDirective {
                name: "foo".to_string(),
                user: "root".to_string(),
                password: "s3cret".to_string(),
            },
        );
        assert!(cfg.validate().is_err());

        // All good.
        let mut cfg = valid_base(Context::Prod);
        cfg.database.insert(
            "foo".to_string(),
            crate::database::DatabaseDirective {
                name: "foo".to_string(),
                user: "foo".to_string(),
                password: "s3cret".to_string(),
            },
        );
        cfg.validate().expect("valid database");
    }

    #[test]
    fn absolute_volume_path_is_invalid() {
        let mut cfg = valid_base(Context::Dev);
        cfg.volume.insert(
            "/media".to_string(),
            crate::volume::VolumeDirective {
                path: "/media".to_string(),
                is_temporary: false,
            },
        );
        assert!(cfg.validate().is_err());
    }
}
