//! Connection settings for the graph database.
//!
//! Settings come from command-line flags, an `.ini` file with `[connection]`
//! and `[database]` sections, or the credentials file AuraDB hands out.

use crate::error::ConfigError;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

pub const PROTOCOLS: [&str; 6] = ["neo4j", "neo4j+s", "neo4j+ssc", "bolt", "bolt+s", "bolt+ssc"];

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Environment variable overriding [`DEFAULT_BATCH_SIZE`].
pub const BATCH_SIZE_VAR: &str = "SBMLGRAPH_BATCH_SIZE";

#[derive(Clone, PartialEq)]
pub struct ConnectionConfig {
    pub protocol: String,
    pub url: String,
    pub port: Option<u16>,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Rows per write transaction.
    pub batch_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            protocol: "neo4j".to_string(),
            url: "localhost".to_string(),
            port: None,
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
            batch_size: batch_size_from_env(),
        }
    }
}

fn batch_size_from_env() -> usize {
    env::var(BATCH_SIZE_VAR)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_BATCH_SIZE)
}

impl ConnectionConfig {
    pub fn new(
        protocol: &str,
        url: &str,
        port: Option<u16>,
        user: &str,
        password: &str,
        database: &str,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            protocol: protocol.to_string(),
            url: url.to_string(),
            port,
            user: user.to_string(),
            password: password.to_string(),
            database: database.to_string(),
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !PROTOCOLS.contains(&self.protocol.as_str()) {
            return Err(ConfigError::UnknownProtocol(self.protocol.clone()));
        }
        Ok(())
    }

    pub fn uri(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.protocol, self.url, port),
            None => format!("{}://{}", self.protocol, self.url),
        }
    }

    pub fn from_ini(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let sections = parse_ini(&content, &path.display().to_string())?;

        let mut config = Self::default();
        if let Some(section) = sections.get("connection") {
            if let Some(protocol) = section.get("protocol") {
                config.protocol = protocol.clone();
            }
            if let Some(url) = section.get("url") {
                config.url = url.clone();
            }
            if let Some(port) = section.get("port") {
                config.port = Some(parse_port(port, path)?);
            }
        }
        if let Some(section) = sections.get("database") {
            if let Some(user) = section.get("user") {
                config.user = user.clone();
            }
            if let Some(name) = section.get("name") {
                config.database = name.clone();
            }
            if let Some(password) = section.get("password") {
                config.password = password.clone();
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Read the `KEY=VALUE` credentials file downloaded from AuraDB.
    pub fn from_auradb(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let mut config = Self::default();
        for (ix, line) in content.lines().enumerate() {
            if line.starts_with('#') || !line.contains('=') {
                continue;
            }
            let parts: Vec<&str> = line.split('=').collect();
            let [key, value] = parts.as_slice() else {
                continue;
            };
            match *key {
                "NEO4J_URI" => {
                    let Some((protocol, url)) = value.split_once("://") else {
                        return Err(ConfigError::Parse {
                            path: path.display().to_string(),
                            line: ix + 1,
                            message: format!("expected <protocol>://<host>, found `{value}`"),
                        });
                    };
                    config.protocol = protocol.to_string();
                    config.url = url.to_string();
                }
                "NEO4J_USERNAME" => config.user = value.to_string(),
                "NEO4J_PASSWORD" => config.password = value.to_string(),
                "AURA_INSTANCENAME" => config.database = value.to_string(),
                _ => {}
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// First line of a password file.
    pub fn read_password(path: impl AsRef<Path>) -> Result<String, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(content.lines().next().unwrap_or_default().to_string())
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() {
            "<empty>"
        } else {
            "initialized"
        };
        write!(
            f,
            "protocol: {}, url: {}, port: {}, user: {}, password: {}, database: {}, batch size: {}",
            self.protocol,
            self.url,
            self.port.map(|p| p.to_string()).unwrap_or_default(),
            self.user,
            password,
            self.database,
            self.batch_size
        )
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionConfig({self})")
    }
}

fn parse_port(value: &str, path: &Path) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        line: 0,
        message: format!("invalid port `{value}`: {e}"),
    })
}

type Sections = HashMap<String, HashMap<String, String>>;

/// Minimal `.ini` reader: `[section]` headers, `key = value` or `key: value`
/// pairs, `#` and `;` comments. Keys are lower-cased, empty values dropped.
fn parse_ini(content: &str, origin: &str) -> Result<Sections, ConfigError> {
    let mut sections = Sections::new();
    let mut current: Option<String> = None;

    for (ix, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }
        let error = |message: &str| ConfigError::Parse {
            path: origin.to_string(),
            line: ix + 1,
            message: message.to_string(),
        };
        let Some((key, value)) = line.split_once(['=', ':']) else {
            return Err(error("expected `key = value`"));
        };
        let Some(section) = &current else {
            return Err(error("entry outside of a section"));
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        sections
            .entry(section.clone())
            .or_default()
            .insert(key.trim().to_lowercase(), value.to_string());
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn uri_includes_the_port_when_set() {
        let mut config = ConnectionConfig::default();
        assert_eq!(config.uri(), "neo4j://localhost");
        config.port = Some(7687);
        assert_eq!(config.uri(), "neo4j://localhost:7687");
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        let err = ConnectionConfig::new("http", "localhost", None, "neo4j", "", "neo4j").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProtocol(p) if p == "http"));
    }

    #[test]
    fn ini_sections_override_defaults() {
        let f = file(
            "# local instance\n[connection]\nprotocol = bolt\nurl = db.example.org\nport = 7688\n\n\
             [database]\nuser: admin\nname = models\n; no password here\npassword =\n",
        );
        let config = ConnectionConfig::from_ini(f.path()).unwrap();
        assert_eq!(config.uri(), "bolt://db.example.org:7688");
        assert_eq!(config.user, "admin");
        assert_eq!(config.database, "models");
        assert!(config.password.is_empty());
    }

    #[test]
    fn ini_with_bad_port_points_at_the_file() {
        let f = file("[connection]\nport = many\n");
        assert!(matches!(
            ConnectionConfig::from_ini(f.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn auradb_credentials() {
        let f = file(
            "# Wait 60 seconds before connecting\nNEO4J_URI=neo4j+s://abcd.databases.neo4j.io\n\
             NEO4J_USERNAME=neo4j\nNEO4J_PASSWORD=s3cr=t\nAURA_INSTANCENAME=Instance01\n",
        );
        let config = ConnectionConfig::from_auradb(f.path()).unwrap();
        assert_eq!(config.protocol, "neo4j+s");
        assert_eq!(config.url, "abcd.databases.neo4j.io");
        assert_eq!(config.database, "Instance01");
        // more than one `=` on a line: ignored
        assert!(config.password.is_empty());
    }

    #[test]
    fn password_file_keeps_the_first_line() {
        let f = file("hunter2\nsecond line\n");
        assert_eq!(ConnectionConfig::read_password(f.path()).unwrap(), "hunter2");
    }

    #[test]
    fn display_hides_the_password() {
        let mut config = ConnectionConfig::default();
        assert!(config.to_string().contains("password: <empty>"));
        config.password = "hunter2".into();
        let shown = config.to_string();
        assert!(shown.contains("password: initialized"));
        assert!(!shown.contains("hunter2"));
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
