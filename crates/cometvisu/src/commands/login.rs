//! Login-only handshake.

use serde::Serialize;

use cometvisu_core::Client;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct SessionInfo {
    session: String,
    backend: String,
    base_url: String,
    transport: String,
    version: Option<String>,
}

impl SessionInfo {
    fn from_client(client: &Client) -> Self {
        let backend = client.backend();
        Self {
            session: client.session(),
            backend: backend.name,
            base_url: backend.base_url,
            transport: backend.transport.to_string(),
            version: client.current_transport().version(),
        }
    }
}

pub async fn handle(client: &Client, global: &GlobalOpts) -> Result<(), CliError> {
    client.login(true, None);
    client.login_settled().await?;

    let info = SessionInfo::from_client(client);
    let out = output::render_single(
        global.output,
        &info,
        |i| {
            vec![
                ("Session", i.session.clone()),
                ("Backend", i.backend.clone()),
                ("Base URL", i.base_url.clone()),
                ("Transport", i.transport.clone()),
                ("Version", i.version.clone().unwrap_or_default()),
            ]
        },
        |i| i.session.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
