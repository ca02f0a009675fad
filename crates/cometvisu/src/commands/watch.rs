//! Live value stream.

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use cometvisu_core::Client;

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(client: &Client, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut updates = client.updates();
    client.subscribe(args.addresses, args.filter);
    client.login_settled().await?;

    let color = output::should_color(global.color);
    let mut remaining = args.count;
    if remaining == Some(0) {
        return Ok(());
    }

    loop {
        let update = tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
            update = updates.recv() => update,
        };

        let update = match update {
            Ok(update) => update,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "output fell behind, updates dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        for (address, value) in &update.data {
            let line = output::render_value(global.output, color, address, value, update.initial)?;
            output::print_output(&line, global.quiet);

            if let Some(ref mut left) = remaining {
                *left = left.saturating_sub(1);
                if *left == 0 {
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}
