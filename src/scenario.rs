//! The smoke-test script.
//!
//! One linear pass over the gateway: auth, users, products, inventory, orders. Three points
//! poll for the inventory projection, which is only eventually consistent:
//! - initial stock availability (exhaustion fails the run),
//! - stock after replenish (exhaustion fails the run),
//! - stock after an order (exhaustion is logged and tolerated).

use crate::client::{ApiClient, ApiError};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{ConfigError, SmokeConfig};
use crate::error::{ProbeError, WaitError};
use crate::model::{
    Credentials, LoginToken, NewOrder, NewProduct, Order, OrderUpdate, Product, Profile,
    Registered, Replenish, Replenished, ResourceId, StockLevel,
};
use crate::retry::RetryPolicy;
use crate::{Sleeper, TokioSleeper};
use rand::Rng;
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{info, warn};

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const REPLENISH_QUANTITY: u32 = 10;
const ORDER_QUANTITY: u32 = 2;
const PATCHED_ORDER_QUANTITY: u32 = 1;

/// Failure of a single check against the gateway.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{0}")]
    Assertion(String),
}

/// Why a run failed.
#[derive(Debug, Error)]
pub enum SmokeError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("{0}")]
    Assertion(String),
    /// A poll ran out of budget at a point where that fails the run.
    #[error(transparent)]
    Wait(WaitError<CheckError>),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The HTTP client could not be constructed.
    #[error("could not build HTTP client: {0}")]
    Setup(#[from] reqwest::Error),
}

impl SmokeError {
    /// Headline used when reporting the failure.
    pub fn headline(&self) -> &'static str {
        match self {
            Self::Api(_) => "API ERROR",
            Self::Assertion(_) => "ASSERTION FAILED",
            Self::Wait(_) => "WAIT FAILED",
            Self::Config(_) => "CONFIG ERROR",
            Self::Setup(_) => "SETUP ERROR",
        }
    }
}

impl From<CheckError> for SmokeError {
    fn from(err: CheckError) -> Self {
        match err {
            CheckError::Api(e) => Self::Api(e),
            CheckError::Assertion(msg) => Self::Assertion(msg),
        }
    }
}

impl From<WaitError<CheckError>> for SmokeError {
    fn from(err: WaitError<CheckError>) -> Self {
        match err {
            WaitError::Fatal(e) => e.into(),
            exhausted => Self::Wait(exhausted),
        }
    }
}

/// Identifiers and observations of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub user_id: ResourceId,
    pub email: String,
    pub product_id: ResourceId,
    pub order_id: ResourceId,
    /// Stock reported at the very end, if the payload carried it.
    pub final_stock: Option<i64>,
    /// Whether the stock decrease after the order was observed within its budget.
    pub stock_decrease_confirmed: bool,
}

fn assertion(msg: impl Into<String>) -> CheckError {
    CheckError::Assertion(msg.into())
}

fn pretty(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "<unprintable>".to_string())
}

/// 404 and 5xx may clear up; anything else will not.
fn classify(err: ApiError) -> ProbeError<CheckError> {
    if err.is_transient() {
        ProbeError::Transient(err.into())
    } else {
        ProbeError::Fatal(err.into())
    }
}

/// Stock level expected once an order of `quantity` is applied to `new_stock`.
fn stock_after_order(new_stock: Option<i64>, quantity: u32) -> Option<i64> {
    new_stock.map(|n| n.saturating_sub(i64::from(quantity)))
}

/// Random `[a-z0-9]` suffix that keeps runs from colliding.
pub fn rand_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// Runs the smoke test against one gateway.
#[derive(Debug, Clone)]
pub struct Scenario {
    client: ApiClient,
    config: SmokeConfig,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl Scenario {
    pub fn new(client: ApiClient, config: SmokeConfig) -> Self {
        Self {
            client,
            config,
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    pub fn config(&self) -> &SmokeConfig {
        &self.config
    }

    /// Replace the sleeper used between poll attempts.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Replace the clock that wait budgets are measured against.
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    fn policy(&self, max_elapsed: Duration) -> Result<RetryPolicy, SmokeError> {
        let policy = self
            .config
            .poll_policy_builder(max_elapsed)
            .with_shared_sleeper(self.sleeper.clone())
            .with_shared_clock(self.clock.clone())
            .build()
            .map_err(ConfigError::from)?;
        Ok(policy)
    }

    /// Execute every step in order.
    pub async fn run(&self) -> Result<RunSummary, SmokeError> {
        let client = &self.client;
        let stock_init = self.policy(self.config.max_wait_stock_init)?;
        let stock_after = self.policy(self.config.max_wait_stock_after)?;

        let unix = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let email = format!("test+{}-{}@example.com", unix, rand_suffix(8));
        let credentials =
            Credentials { email: email.clone(), password: self.config.password.clone() };

        let registered: Registered = client
            .request(
                Method::POST,
                "/users/register",
                None,
                Some(&credentials),
                Some(StatusCode::CREATED),
            )
            .await?
            .json()?;
        info!(user_id = %registered.id, email = %registered.email, "[auth] registered");

        let login: LoginToken = client
            .request(Method::POST, "/users/login", None, Some(&credentials), None)
            .await?
            .expect_one_of(&[StatusCode::OK, StatusCode::CREATED])?
            .json()?;
        let token = login
            .bearer()
            .ok_or_else(|| SmokeError::Assertion(format!("No token in login response: {login:?}")))?
            .to_string();
        info!("[auth] login ok, token acquired");

        let me: Profile = client.get_json("/users/me", Some(&token)).await?;
        info!(user_id = %me.user_id, email = %me.email, "[users] /users/me ok");

        let user_path = format!("/users/{}", registered.id);
        let resp = client.get(&user_path, Some(&token), None).await?;
        if resp.status == StatusCode::NOT_FOUND {
            info!(path = %user_path, "[users] returned expected 404");
        } else {
            warn!(path = %user_path, status = resp.status.as_u16(), "[users] expected 404");
        }

        let products: serde_json::Value = client.get_json("/products", None).await?;
        let count = products
            .as_array()
            .ok_or_else(|| {
                SmokeError::Assertion(format!(
                    "Products list is not an array: {}",
                    pretty(&products)
                ))
            })?
            .len();
        info!(count, "[products] list ok");

        let product_name = format!("Widget-{}", rand_suffix(8));
        let new_product = NewProduct { name: product_name.clone(), price: 19.99, in_stock: true };
        let created: Product = client
            .request(Method::POST, "/products", None, Some(&new_product), None)
            .await?
            .json()?;
        let product_id = created
            .id()
            .cloned()
            .ok_or_else(|| {
                SmokeError::Assertion(format!("No product id in response: {created:?}"))
            })?;
        info!(%product_id, name = %product_name, "[products] created");

        let product_path = format!("/products/{}", product_id);
        let fetched: Product = client.get_json(&product_path, None).await?;
        if fetched.id() != Some(&product_id) {
            return Err(SmokeError::Assertion(format!("Mismatched product id: {fetched:?}")));
        }
        info!(%product_id, "[products] get by id ok");

        let stock_path = format!("/products/{}/stock", product_id);
        let stock = stock_init
            .execute("initial inventory stock availability", || {
                self.fetch_stock_available(&stock_path)
            })
            .await?;
        info!(%product_id, stock = stock.stock, "[inventory] stock available");

        let replenished: Replenished = client
            .request(
                Method::PATCH,
                &format!("/products/{}/replenish", product_id),
                None,
                Some(&Replenish { quantity: REPLENISH_QUANTITY }),
                Some(StatusCode::OK),
            )
            .await?
            .json()?;
        let new_stock = replenished.new_stock;
        info!(%product_id, new_stock = ?new_stock, "[inventory] replenish ok");

        let confirmed = stock_init
            .execute("stock after replenish", || self.fetch_stock_matching(&stock_path, new_stock))
            .await?;
        info!(%product_id, stock = confirmed.stock, "[inventory] stock confirmed");

        let orders: serde_json::Value = client.get_json("/orders", None).await?;
        match orders.as_array() {
            Some(list) => info!(count = list.len(), "[orders] public list ok"),
            None => info!("[orders] public list ok"),
        }

        let new_order = NewOrder {
            product_id: product_id.clone(),
            quantity: ORDER_QUANTITY,
            user_id: me.user_id.clone(),
        };
        let order: Order = client
            .request(
                Method::POST,
                "/orders",
                Some(&token),
                Some(&new_order),
                Some(StatusCode::CREATED),
            )
            .await?
            .json()?;
        let order_id = order.id;
        info!(%order_id, %product_id, quantity = ORDER_QUANTITY, "[orders] create ok");

        let expected_after_order = stock_after_order(new_stock, ORDER_QUANTITY);
        let stock_decrease_confirmed = match stock_after
            .execute("stock after order", || {
                self.fetch_stock_matching(&stock_path, expected_after_order)
            })
            .await
        {
            Ok(level) => {
                info!(%product_id, stock = level.stock, "[inventory] stock decreased ok");
                true
            }
            Err(err @ WaitError::Exhausted { .. }) => {
                warn!(
                    budget = ?self.config.max_wait_stock_after,
                    error = %err,
                    "[inventory] stock decrease not confirmed in time (continuing)"
                );
                false
            }
            Err(fatal) => return Err(fatal.into()),
        };

        let order_path = format!("/orders/{}", order_id);
        client.get(&order_path, Some(&token), Some(StatusCode::OK)).await?;
        info!(%order_id, "[orders] get by id ok");

        let update = OrderUpdate { quantity: PATCHED_ORDER_QUANTITY, user_id: me.user_id.clone() };
        client
            .request(Method::PATCH, &order_path, Some(&token), Some(&update), Some(StatusCode::OK))
            .await?;
        info!(%order_id, quantity = PATCHED_ORDER_QUANTITY, "[orders] patch ok");

        client
            .request::<()>(Method::DELETE, &order_path, Some(&token), None, Some(StatusCode::OK))
            .await?;
        info!(%order_id, "[orders] delete ok");

        let final_level: serde_json::Value = client.get_json(&stock_path, None).await?;
        let final_stock = final_level.get("stock").and_then(serde_json::Value::as_i64);
        info!(%product_id, stock = ?final_stock, "[inventory] final stock");

        Ok(RunSummary {
            user_id: registered.id,
            email,
            product_id,
            order_id,
            final_stock,
            stock_decrease_confirmed,
        })
    }

    /// Stock level once the projection exists. 404 means "not yet"; a malformed payload is fatal.
    async fn fetch_stock_available(
        &self,
        path: &str,
    ) -> Result<StockLevel, ProbeError<CheckError>> {
        let resp = self.client.get(path, None, Some(StatusCode::OK)).await.map_err(classify)?;
        resp.json().map_err(|e| ProbeError::Fatal(e.into()))
    }

    /// Stock level once it equals `expected`; with no expectation any level is accepted.
    async fn fetch_stock_matching(
        &self,
        path: &str,
        expected: Option<i64>,
    ) -> Result<StockLevel, ProbeError<CheckError>> {
        let level = self.fetch_stock_available(path).await?;
        match expected {
            Some(want) if level.stock != want => Err(ProbeError::Transient(assertion(format!(
                "stock not updated yet: {} != {}",
                level.stock, want
            )))),
            _ => Ok(level),
        }
    }
}
