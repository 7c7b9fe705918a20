// monitoring-handler-rs/src/main.rs
// Local runner for the monitoring handler.
// Reads one JSON event per line from stdin and writes one JSON response per line to stdout.

use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use monitoring_handler::{handle_event, LambdaResponse, ProcessContext};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    error_handling::init()?;

    let ctx = ProcessContext::from_env()?;
    info!(
        service = %ctx.config.service_name,
        environment = %ctx.config.environment,
        "Monitoring handler ready, reading events from stdin"
    );

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str(line) {
            Ok(event) => handle_event(&ctx, event).await,
            Err(e) => {
                warn!(error = %e, "Discarding malformed event");
                let err = error_handling::Error::validation(format!("Malformed event: {}", e)).code("INVALID_JSON");
                LambdaResponse::from_error(&err)
            }
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    info!(invocations = ctx.invocations(), "Input closed, shutting down");
    Ok(())
}
