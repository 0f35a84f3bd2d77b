#![forbid(unsafe_code)]

//! # gateway-smoke
//!
//! End-to-end smoke test for an e-commerce API gateway, and the retrying prober it is built on.
//!
//! ## Features
//!
//! - **Retrying prober** with geometric backoff, proportional jitter and a floor delay
//! - **Attempt and wall-clock budgets**, with the time budget taking precedence
//! - **Transient vs fatal** probe outcomes; fatal failures stop polling immediately
//! - **Injectable sleeper and clock** for deterministic tests
//! - **Scripted scenario** covering auth, users, products, inventory and orders
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gateway_smoke::{ApiClient, Scenario, SmokeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SmokeConfig::from_env()?;
//!     let client = ApiClient::new(config.base_url.clone(), config.request_timeout)?;
//!     let summary = Scenario::new(client, config).run().await?;
//!     println!("order {} placed for product {}", summary.order_id, summary.product_id);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod jitter;
pub mod logging;
pub mod model;
pub mod retry;
pub mod scenario;
pub mod sleeper;

// Re-exports
pub use backoff::{Backoff, BackoffError};
pub use client::{ApiClient, ApiError, ApiResponse};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigError, SmokeConfig};
pub use error::{ProbeError, WaitError};
pub use jitter::Jitter;
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use scenario::{CheckError, RunSummary, Scenario, SmokeError};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
