//! The domain directive and its embedded SSL and auth material.

use serde::{Deserialize, Serialize};

/// How the www. prefix of a domain is handled/normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Www {
    /// Keep both the naked and the prefixed domain untouched, deploying no
    /// redirects.
    Keep,
    /// Always redirect to the naked domain.
    #[default]
    Drop,
    /// Always redirect to the prefixed domain.
    Add,
}

/// Domains are configured using the naked domain name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DomainDirective {
    /// The naked domain name; required, taken from the block key.
    pub fqdn: String,
    /// Handling of the www prefix; defaults to dropping it.
    pub www: Www,
    /// Optionally configures SSL for this domain. Once SSL is enabled all
    /// non-SSL traffic is redirected.
    pub ssl: SslDirective,
    /// Allows to protect the domain with basic authentication; especially
    /// useful for staging/preview contexts.
    pub auth: AuthDirective,
    /// Aliases inherit any configuration from this domain. An alias that
    /// needs different configuration must be added as a separate domain.
    pub aliases: Vec<String>,
    /// Domains that redirect to this domain.
    pub redirects: Vec<String>,
}

impl DomainDirective {
    /// Adds aliases, skipping any already present.
    pub fn add_aliases<I: IntoIterator<Item = String>>(&mut self, aliases: I) {
        for alias in aliases {
            if !self.aliases.contains(&alias) {
                self.aliases.push(alias);
            }
        }
    }
}

/// Sentinel value asking for a self-signed certificate generated on the fly.
pub const CERT_SELF_SIGNED: &str = "!self-signed";

/// Sentinel value asking for a matching certificate from the server-level
/// system certificate table.
pub const CERT_SYSTEM: &str = "!system";

/// Certificate files should be named after the domain they belong to.
/// Symlinks, i.e. when wildcard certs are in use, are possible too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SslDirective {
    /// Path to the certificate, relative to the project root, or one of the
    /// special `!`-prefixed sentinels.
    pub certificate: String,
    /// Path to the certificate key; must match the certificate's mode of
    /// operation.
    pub certificate_key: String,
}

impl SslDirective {
    pub fn is_enabled(&self) -> bool {
        !self.certificate.is_empty() && !self.certificate_key.is_empty()
    }
}

/// Access protection via basic auth. When both user and password are empty,
/// auth is disabled altogether.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthDirective {
    /// If a password is given, the user becomes optional and defaults to
    /// the naked project name.
    pub user: String,
    /// Must be non-empty except in dev contexts.
    pub password: String,
}

impl AuthDirective {
    pub fn is_enabled(&self) -> bool {
        !self.user.is_empty() && !self.password.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_aliases_is_idempotent() {
        let mut d = DomainDirective {
            fqdn: "example.org".to_string(),
            aliases: vec!["a.example.org".to_string()],
            ..DomainDirective::default()
        };
        d.add_aliases(vec!["a.example.org".to_string(), "b.example.org".to_string()]);
        assert_eq!(d.aliases, vec!["a.example.org", "b.example.org"]);
    }

    #[test]
    fn ssl_requires_both_sides() {
        let mut ssl = SslDirective::default();
        assert!(!ssl.is_enabled());
        ssl.certificate = "config/ssl/example.org.crt".to_string();
        assert!(!ssl.is_enabled());
        ssl.certificate_key = "config/ssl/example.org.key".to_string();
        assert!(ssl.is_enabled());
    }

    #[test]
    fn www_defaults_to_drop() {
        assert_eq!(Www::default(), Www::Drop);
    }
}
