use gateway_smoke::logging::init_tracing;
use gateway_smoke::{ApiClient, Scenario, SmokeConfig, SmokeError};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("failed to install log subscriber: {e}");
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}: {}", e.headline(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), SmokeError> {
    let config = SmokeConfig::from_env()?;
    info!(
        base_url = %config.base_url,
        retries = config.retries,
        retry_delay = ?config.retry_delay,
        backoff = config.backoff,
        max_wait_stock_init = ?config.max_wait_stock_init,
        max_wait_stock_after = ?config.max_wait_stock_after,
        "starting smoke test"
    );

    let client = ApiClient::new(config.base_url.clone(), config.request_timeout)?;
    let summary = Scenario::new(client, config).run().await?;

    info!(
        user_id = %summary.user_id,
        email = %summary.email,
        product_id = %summary.product_id,
        order_id = %summary.order_id,
        final_stock = ?summary.final_stock,
        stock_decrease_confirmed = summary.stock_decrease_confirmed,
        "SMOKE TEST PASSED"
    );
    Ok(())
}
