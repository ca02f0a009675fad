//! Single value write.

use cometvisu_core::Client;

use crate::cli::{GlobalOpts, WriteArgs};
use crate::error::CliError;

pub async fn handle(client: &Client, args: WriteArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.address.is_empty() {
        return Err(CliError::Validation {
            field: "address".into(),
            reason: "address cannot be empty".into(),
        });
    }

    // Writes carry the session, so negotiate one without starting a stream.
    client.login(true, None);
    client.login_settled().await?;

    let handle = client.write(&args.address, &args.value)?;
    let status = match handle.finished().await {
        Some(outcome) => outcome?,
        None => return Err(CliError::Internal("write was aborted".into())),
    };

    if !global.quiet {
        eprintln!("✓ Sent {} to {} (HTTP {status})", args.value, args.address);
    }
    Ok(())
}
