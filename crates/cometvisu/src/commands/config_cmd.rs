//! Config subcommand handlers.

use cometvisu_config::{self as cfg_store, Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::{active_profile_name, apply_overrides, available_profiles};
use crate::error::CliError;
use crate::output;

const MASK: &str = "********";

// ── Helpers ─────────────────────────────────────────────────────────

/// Map an interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Copy of the config with plaintext passwords masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some(MASK.into());
        }
    }
    cfg
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&cfg_store::config_path().display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = redacted(&cfg_store::load_config()?);
            let out = match global.output {
                OutputFormat::Json => serde_json::to_string_pretty(&cfg)?,
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(&cfg).map_err(|e| CliError::Config {
                        message: format!("failed to render config: {e}"),
                    })?
                }
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init { default, force } => {
            let mut cfg = cfg_store::load_config_or_default();
            let profile_name = active_profile_name(global, &cfg);

            if cfg.profiles.contains_key(&profile_name) && !force {
                return Err(CliError::ProfileExists { name: profile_name });
            }
            let server = global.server.as_deref().ok_or_else(|| CliError::Validation {
                field: "server".into(),
                reason: "config init needs --server".into(),
            })?;

            let mut profile = Profile::new(server);
            apply_overrides(&mut profile, global);
            profile.server_url()?;

            let first = cfg.profiles.is_empty();
            cfg.profiles.insert(profile_name.clone(), profile);
            if default || first {
                cfg.default_profile = Some(profile_name.clone());
            }
            let path = cfg_store::save_config(&cfg)?;

            if !global.quiet {
                eprintln!("✓ Profile '{profile_name}' written to {}", path.display());
                if global.user.is_some() {
                    eprintln!("  Store its password with: cometvisu config set-password --profile {profile_name}");
                }
            }
            Ok(())
        }

        ConfigCommand::SetPassword { profile } => {
            let cfg = cfg_store::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| active_profile_name(global, &cfg));

            if !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    available: available_profiles(&cfg),
                    name: profile_name,
                });
            }

            let secret = match global.password {
                Some(ref password) => password.clone(),
                None => rpassword::prompt_password("Password: ").map_err(prompt_err)?,
            };
            if secret.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "value cannot be empty".into(),
                });
            }

            cfg_store::store_password(&profile_name, &secret)?;
            if !global.quiet {
                eprintln!("✓ Password stored in system keyring for profile '{profile_name}'");
            }
            Ok(())
        }
    }
}
