//! CLI-aware configuration: profile lookup plus command-line overrides.
//!
//! Core never sees these types -- it receives a pre-built `ClientConfig`.

use secrecy::SecretString;

use cometvisu_config::{Config, Profile};
use cometvisu_core::ClientConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Comma-separated profile names for diagnostics.
pub fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        "(none)".into()
    } else {
        config.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Apply flag overrides (flag > env > profile) onto a profile.
pub fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref server) = global.server {
        profile.server.clone_from(server);
    }
    if let Some(ref backend) = global.backend {
        profile.backend.clone_from(backend);
    }
    if global.user.is_some() {
        profile.user.clone_from(&global.user);
    }
    if global.device.is_some() {
        profile.device.clone_from(&global.device);
    }
    if global.insecure {
        profile.insecure = true;
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }
}

/// Build a `ClientConfig` from the config file, profile, and CLI overrides.
///
/// This is the single boundary where CLI config types cross into core types.
pub fn build_client_config(global: &GlobalOpts) -> Result<ClientConfig, CliError> {
    let cfg = cometvisu_config::load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly requested profile must exist.
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                available: available_profiles(&cfg),
                name: profile_name,
            });
        }
        None => {
            let server = global.server.as_deref().ok_or_else(|| CliError::NoConfig {
                path: cometvisu_config::config_path().display().to_string(),
            })?;
            Profile::new(server)
        }
    };
    apply_overrides(&mut profile, global);

    let mut config = cometvisu_config::profile_to_client_config(&profile, &profile_name)?;
    if let Some(ref password) = global.password {
        config.credentials.password = Some(SecretString::from(password.clone()));
    }
    Ok(config)
}
