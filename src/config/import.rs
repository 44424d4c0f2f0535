//! Config import
//!
//! Reads connection details out of an application's own config: a JSON
//! file (Sequelize-style `development`/`test`/`production` blocks or a flat
//! object) or `.env`-style `KEY=value` text.

use crate::config::ConnectionConfig;
use crate::config::connections::profiles_to_toml;
use crate::db::connection::DatabaseType;
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Connection fields recovered from foreign config text. Every field is
/// optional; the backend is inferred from the dialect string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedConfig {
    pub db_type: Option<DatabaseType>,
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ImportedConfig {
    /// Turn into a profile. The backend must have been recognized.
    pub fn into_profile(self) -> ConfigResult<ConnectionConfig> {
        let db_type = self.db_type.ok_or_else(|| {
            ConfigError::Invalid("Could not determine the database type".into())
        })?;
        let database = self.database.unwrap_or_default();
        let host = self.host.unwrap_or_default();
        let name = self
            .name
            .or_else(|| non_empty(&database))
            .or_else(|| non_empty(&host))
            .unwrap_or_else(|| db_type.to_string());
        Ok(ConnectionConfig {
            name,
            db_type,
            host,
            port: self.port,
            database,
            username: self.username.unwrap_or_default(),
            password: self.password,
            ssl: false,
        })
    }
}

/// Render an imported profile as a `[[connections]]` entry.
///
/// Passwords are never serialized; when the source had one, a commented
/// `password` line marks where to put it.
pub fn render_profile(profile: &ConnectionConfig) -> ConfigResult<String> {
    let mut text = profiles_to_toml(std::slice::from_ref(profile))?;
    if profile.password.as_deref().is_some_and(|p| !p.is_empty()) {
        text.push_str(PASSWORD_PLACEHOLDER);
    }
    Ok(text)
}

const PASSWORD_PLACEHOLDER: &str =
    "# password = \"\"  # set in the imported file, not copied\n";

/// Parse JSON or `.env`-style text. Empty input yields `None`.
pub fn parse_config(text: &str) -> Option<ImportedConfig> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    parse_json(text).or_else(|| Some(parse_env(text)))
}

/// `postgres`, `mysql`, `sqlite`, `mongo`, `redis` anywhere in the dialect
pub fn infer_type(dialect: &str) -> Option<DatabaseType> {
    let dialect = dialect.to_lowercase();
    [
        ("postgres", DatabaseType::Postgresql),
        ("mysql", DatabaseType::Mysql),
        ("sqlite", DatabaseType::Sqlite),
        ("mongo", DatabaseType::Mongodb),
        ("redis", DatabaseType::Redis),
    ]
    .into_iter()
    .find(|(needle, _)| dialect.contains(needle))
    .map(|(_, db_type)| db_type)
}

fn parse_json(text: &str) -> Option<ImportedConfig> {
    let root: Value = serde_json::from_str(text).ok()?;
    let candidate = ["development", "test", "production"]
        .into_iter()
        .find_map(|env| root.get(env).filter(|v| is_truthy(v)))
        .unwrap_or(&root);
    let object = candidate.as_object()?;

    let dialect = json_text(object, "dialect").or_else(|| json_text(object, "type"));
    let database = json_text(object, "database");
    let host = json_text(object, "host");
    Some(ImportedConfig {
        db_type: dialect.as_deref().and_then(infer_type),
        name: json_text(object, "name")
            .or_else(|| database.clone())
            .or_else(|| host.clone()),
        port: object.get("port").and_then(json_port),
        username: json_text(object, "username"),
        password: json_text(object, "password"),
        database,
        host,
    })
}

fn parse_env(text: &str) -> ImportedConfig {
    let vars: HashMap<String, String> = text
        .lines()
        .map(str::trim)
        .filter_map(parse_env_line)
        .collect();
    let get = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| vars.get(*k).and_then(|v| non_empty(v)))
    };

    ImportedConfig {
        db_type: get(&["DIALECT", "DB_DIALECT"]).as_deref().and_then(infer_type),
        username: get(&["USERNAME", "USER", "DB_USERNAME"]),
        password: get(&["PASSWORD", "DB_PASSWORD"]),
        database: get(&["DATABASE", "DB_NAME"]),
        host: get(&["HOST", "DB_HOST"]),
        port: get(&["PORT", "DB_PORT"]).and_then(|p| p.trim().parse().ok()),
        name: get(&["NAME", "DB_NAME", "DATABASE"]),
    }
}

/// `KEY = value`, with one layer of matching quotes stripped
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim_end();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let value = value.trim_start();
    let value = ['"', '\'']
        .into_iter()
        .find_map(|q| {
            value
                .strip_prefix(q)
                .and_then(|v| v.strip_suffix(q))
        })
        .unwrap_or(value);
    Some((key.to_uppercase(), value.to_string()))
}

fn json_text(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_port(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
