//! Backend preset listing.

use serde::Serialize;
use tabled::Tabled;

use cometvisu_core::backend::{self, BackendConfig, Resource};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

const ALIASES: [(&str, &str); 3] = [("cgi-bin", "default"), ("oh", "openhab"), ("oh2", "openhab2")];

#[derive(Debug, Serialize)]
struct BackendInfo {
    preset: &'static str,
    aliases: Vec<&'static str>,
    name: String,
    base_url: String,
    transport: String,
    login: String,
    read: String,
    write: String,
    max_connection_age_secs: u64,
    close_hook: bool,
}

impl BackendInfo {
    fn new(preset: &'static str, config: &BackendConfig) -> Self {
        Self {
            preset,
            aliases: ALIASES
                .iter()
                .filter(|(_, target)| *target == preset)
                .map(|(alias, _)| *alias)
                .collect(),
            name: config.name.clone(),
            base_url: config.base_url.clone(),
            transport: config.transport.to_string(),
            login: config.resource_path(Resource::Login),
            read: config.resource_path(Resource::Read),
            write: config.resource_path(Resource::Write),
            max_connection_age_secs: config.max_connection_age.as_secs(),
            close_hook: config.hooks.on_close.is_some(),
        }
    }
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct BackendRow {
    #[tabled(rename = "Preset")]
    preset: &'static str,
    #[tabled(rename = "Aliases")]
    aliases: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Transport")]
    transport: String,
    #[tabled(rename = "Login")]
    login: String,
    #[tabled(rename = "Read")]
    read: String,
    #[tabled(rename = "Write")]
    write: String,
}

impl From<&BackendInfo> for BackendRow {
    fn from(b: &BackendInfo) -> Self {
        Self {
            preset: b.preset,
            aliases: b.aliases.join(", "),
            name: b.name.clone(),
            transport: b.transport.clone(),
            login: b.login.clone(),
            read: b.read.clone(),
            write: b.write.clone(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let backends: Vec<BackendInfo> = backend::PRESETS
        .into_iter()
        .map(|preset| BackendInfo::new(preset, &backend::resolve(preset)))
        .collect();

    let out = output::render_list(
        global.output,
        &backends,
        |b| BackendRow::from(b),
        |b| b.preset.to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
