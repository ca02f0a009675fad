//! Profile configuration for CometVisu tools.
//!
//! TOML profiles, password resolution (env + keyring + plaintext),
//! and translation to `cometvisu_core::ClientConfig`. The CLI layers its
//! flag overrides on top of what this crate produces.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cometvisu_core::{BackendSelector, ClientConfig, Credentials, TlsVerification, backend};

/// Service name under which passwords are stored in the system keyring.
pub const KEYRING_SERVICE: &str = "cometvisu";

const ENV_PREFIX: &str = "COMETVISU_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is given on the command line.
    pub default_profile: Option<String>,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile, falling back to `default_profile` when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

/// A named server profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Server origin (e.g., "http://192.168.1.10:8080").
    pub server: String,

    /// Backend preset or alias: "default", "openhab", "openhab2", ...
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Login URL used instead of the backend's own login resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable name containing the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    #[serde(default)]
    pub insecure: bool,

    /// Path to custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Connect timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

fn default_backend() -> String {
    backend::DEFAULT_BACKEND.into()
}

impl Profile {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            backend: default_backend(),
            login_url: None,
            user: None,
            password: None,
            password_env: None,
            device: None,
            insecure: false,
            ca_cert: None,
            timeout: None,
        }
    }

    /// Parse and check the server origin.
    pub fn server_url(&self) -> Result<url::Url, ConfigError> {
        let server: url::Url = self.server.parse().map_err(|_| ConfigError::Validation {
            field: "server".into(),
            reason: format!("invalid URL: {}", self.server),
        })?;
        if !matches!(server.scheme(), "http" | "https") {
            return Err(ConfigError::Validation {
                field: "server".into(),
                reason: format!("unsupported scheme '{}'", server.scheme()),
            });
        }
        Ok(server)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "cometvisu", "cometvisu").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("cometvisu");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path`, layered under `COMETVISU_*` environment
/// variables. Nested keys use `__`: `COMETVISU_PROFILES__HOME__SERVER`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Password resolution ─────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(password)?;
    Ok(())
}

/// Resolve a profile's password: `password_env` → keyring → plaintext.
///
/// Returns `None` when no source has one; the backend may not need it.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_password_with(
        profile,
        |var| std::env::var(var).ok(),
        || {
            keyring_entry(profile_name)
                .and_then(|entry| entry.get_password())
                .ok()
        },
    )
}

fn resolve_password_with(
    profile: &Profile,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl FnOnce() -> Option<String>,
) -> Option<SecretString> {
    // 1. Profile's password_env → env var lookup
    if let Some(val) = profile.password_env.as_deref().and_then(env) {
        return Some(SecretString::from(val));
    }

    // 2. System keyring, only worth asking when there is a user
    if profile.user.is_some() {
        if let Some(secret) = keyring() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    profile.password.clone().map(SecretString::from)
}

// ── ClientConfig translation ────────────────────────────────────────

/// Build a `ClientConfig` from a profile, with no command-line overrides.
pub fn profile_to_client_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<ClientConfig, ConfigError> {
    let password = resolve_password(profile, profile_name);
    build_client_config(profile, password)
}

fn build_client_config(
    profile: &Profile,
    password: Option<SecretString>,
) -> Result<ClientConfig, ConfigError> {
    let server = profile.server_url()?;

    let tls = if profile.insecure {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let mut config = ClientConfig::new(server)
        .with_backend(BackendSelector::Named(profile.backend.clone()))
        .with_credentials(Credentials {
            user: profile.user.clone(),
            password,
            device: profile.device.clone(),
        });
    config.login_url.clone_from(&profile.login_url);
    config.tls = tls;
    if let Some(secs) = profile.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn profile() -> Profile {
        Profile {
            user: Some("alice".into()),
            password: Some("plain".into()),
            password_env: Some("HOME_PW".into()),
            ..Profile::new("http://visu.local:8080")
        }
    }

    fn expose(secret: Option<SecretString>) -> Option<String> {
        secret.map(|s| s.expose_secret().to_owned())
    }

    #[test]
    fn password_prefers_env_then_keyring_then_plaintext() {
        let p = profile();
        let from_env = resolve_password_with(
            &p,
            |var| (var == "HOME_PW").then(|| "env".to_owned()),
            || Some("ring".into()),
        );
        assert_eq!(expose(from_env).as_deref(), Some("env"));

        let from_keyring = resolve_password_with(&p, |_| None, || Some("ring".into()));
        assert_eq!(expose(from_keyring).as_deref(), Some("ring"));

        let from_file = resolve_password_with(&p, |_| None, || None);
        assert_eq!(expose(from_file).as_deref(), Some("plain"));
    }

    #[test]
    fn anonymous_profile_has_no_password() {
        let p = Profile::new("http://visu.local");
        let resolved = resolve_password_with(&p, |_| None, || Some("ring".into()));
        assert!(resolved.is_none());
    }

    #[test]
    fn profile_translates_to_client_config() {
        let p = Profile {
            backend: "oh2".into(),
            login_url: Some("/auth/login".into()),
            device: Some("wall-panel".into()),
            ca_cert: Some(PathBuf::from("/etc/ca.pem")),
            timeout: Some(3),
            ..profile()
        };
        let config = build_client_config(&p, Some(SecretString::from("pw"))).unwrap();

        assert_eq!(config.server.as_str(), "http://visu.local:8080/");
        assert_eq!(config.backend, BackendSelector::Named("oh2".into()));
        assert_eq!(config.login_url.as_deref(), Some("/auth/login"));
        assert_eq!(config.credentials.user(), "alice");
        assert_eq!(config.credentials.password(), "pw");
        assert_eq!(config.credentials.device(), "wall-panel");
        assert_eq!(config.tls, TlsVerification::CustomCa("/etc/ca.pem".into()));
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn insecure_wins_over_ca_cert() {
        let p = Profile {
            insecure: true,
            ca_cert: Some(PathBuf::from("/etc/ca.pem")),
            ..Profile::new("https://visu.local")
        };
        let config = build_client_config(&p, None).unwrap();
        assert_eq!(config.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn invalid_server_is_rejected() {
        for server in ["not a url", "ftp://visu.local"] {
            let err = build_client_config(&Profile::new(server), None).unwrap_err();
            assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "server"));
        }
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config {
            default_profile: Some("home".into()),
            ..Config::default()
        };
        cfg.profiles.insert("home".into(), profile());
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded, cfg);
        let (name, p) = loaded.profile(None).unwrap();
        assert_eq!(name, "home");
        assert_eq!(p.backend, "default");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.default_profile.as_deref(), Some("default"));
        assert!(matches!(
            loaded.profile(Some("nope")),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn minimal_toml_profile_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[profiles.oh]\nserver = \"http://oh.local:8080\"\nbackend = \"openhab\"\n",
        )
        .unwrap();

        let loaded = load_config_from(&path).unwrap();
        let (_, p) = loaded.profile(Some("oh")).unwrap();
        assert_eq!(p.backend, "openhab");
        assert!(!p.insecure);
        assert!(p.timeout.is_none());
    }
}
