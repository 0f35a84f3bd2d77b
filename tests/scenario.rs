use std::sync::{Arc, Mutex};
use std::time::Duration;

use gateway_smoke::{
    ApiClient, ApiError, ManualClock, Scenario, SmokeConfig, SmokeError, TrackingSleeper, WaitError,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const NEVER: usize = usize::MAX;

/// Inventory projection that trails the writes by a number of reads.
#[derive(Debug)]
struct Inventory {
    visible: Option<i64>,
    target: i64,
    pending: usize,
}

impl Inventory {
    fn read(&mut self) -> Option<i64> {
        if self.pending > 0 {
            self.pending -= 1;
        } else {
            self.visible = Some(self.target);
        }
        self.visible
    }

    fn commit(&mut self, delta: i64, lag: usize) -> i64 {
        self.target += delta;
        self.pending = lag;
        self.target
    }
}

struct FakeGateway {
    login: Value,
    user_lookup_status: u16,
    create_status: u16,
    stock_outages: u64,
    stock_override: Option<ResponseTemplate>,
    initial_lag: usize,
    replenish_lag: usize,
    order_lag: usize,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            login: json!({"access_token": "tok-1", "token_type": "bearer"}),
            user_lookup_status: 404,
            create_status: 201,
            stock_outages: 0,
            stock_override: None,
            initial_lag: 2,
            replenish_lag: 2,
            order_lag: 1,
        }
    }
}

impl FakeGateway {
    async fn start(self) -> MockServer {
        let server = MockServer::start().await;
        let inventory =
            Arc::new(Mutex::new(Inventory { visible: None, target: 0, pending: self.initial_lag }));

        Mock::given(method("POST"))
            .and(path("/users/register"))
            .respond_with(|req: &Request| {
                let body: Value = req.body_json().unwrap();
                ResponseTemplate::new(201).set_body_json(json!({"id": 1, "email": body["email"]}))
            })
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(self.login))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/me"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"userId": 1, "email": "someone@example.com"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/1"))
            .respond_with(
                ResponseTemplate::new(self.user_lookup_status)
                    .set_body_json(json!({"id": 1, "email": "someone@example.com"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        let create_status = self.create_status;
        Mock::given(method("POST"))
            .and(path("/products"))
            .respond_with(move |req: &Request| {
                let body: Value = req.body_json().unwrap();
                ResponseTemplate::new(create_status)
                    .set_body_json(json!({"_id": "p-1", "name": body["name"], "price": 19.99}))
            })
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/products/p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_id": "p-1"})))
            .mount(&server)
            .await;

        if self.stock_outages > 0 {
            Mock::given(method("GET"))
                .and(path("/products/p-1/stock"))
                .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
                .up_to_n_times(self.stock_outages)
                .with_priority(1)
                .mount(&server)
                .await;
        }

        match self.stock_override {
            Some(template) => {
                Mock::given(method("GET"))
                    .and(path("/products/p-1/stock"))
                    .respond_with(template)
                    .mount(&server)
                    .await;
            }
            None => {
                let inv = inventory.clone();
                Mock::given(method("GET"))
                    .and(path("/products/p-1/stock"))
                    .respond_with(move |_: &Request| match inv.lock().unwrap().read() {
                        Some(stock) => ResponseTemplate::new(200)
                            .set_body_json(json!({"productId": "p-1", "stock": stock})),
                        None => ResponseTemplate::new(404),
                    })
                    .mount(&server)
                    .await;
            }
        }

        let inv = inventory.clone();
        let replenish_lag = self.replenish_lag;
        Mock::given(method("PATCH"))
            .and(path("/products/p-1/replenish"))
            .respond_with(move |req: &Request| {
                let body: Value = req.body_json().unwrap();
                let quantity = body["quantity"].as_i64().unwrap();
                let stock = inv.lock().unwrap().commit(quantity, replenish_lag);
                ResponseTemplate::new(200).set_body_json(json!({"newStock": stock}))
            })
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        let inv = inventory.clone();
        let order_lag = self.order_lag;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(move |req: &Request| {
                let body: Value = req.body_json().unwrap();
                assert_eq!(body["productId"], "p-1");
                assert_eq!(body["userId"], "1");
                let quantity = body["quantity"].as_i64().unwrap();
                inv.lock().unwrap().commit(-quantity, order_lag);
                ResponseTemplate::new(201).set_body_json(json!({"id": 77}))
            })
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orders/77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 77})))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/orders/77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 77, "quantity": 1})))
            .mount(&server)
            .await;
        let inv = inventory.clone();
        Mock::given(method("DELETE"))
            .and(path("/orders/77"))
            .respond_with(move |_: &Request| {
                inv.lock().unwrap().commit(2, 0);
                ResponseTemplate::new(200).set_body_json(json!({"deleted": true}))
            })
            .mount(&server)
            .await;

        server
    }
}

fn scenario(server: &MockServer) -> (Scenario, TrackingSleeper) {
    let config = SmokeConfig {
        base_url: server.uri(),
        max_wait_stock_init: Duration::from_secs(5),
        max_wait_stock_after: Duration::from_secs(3),
        ..SmokeConfig::default()
    };
    let client = ApiClient::new(server.uri(), Duration::from_secs(5)).expect("client");
    let clock = ManualClock::new();
    let sleeper = TrackingSleeper::advancing(clock.clone());
    let scenario = Scenario::new(client, config).with_sleeper(sleeper.clone()).with_clock(clock);
    (scenario, sleeper)
}

#[tokio::test]
async fn happy_path_waits_for_every_projection() {
    let server = FakeGateway::default().start().await;
    let (scenario, sleeper) = scenario(&server);

    let summary = scenario.run().await.expect("run");

    assert_eq!(summary.user_id.as_str(), "1");
    assert!(summary.email.starts_with("test+"));
    assert!(summary.email.ends_with("@example.com"));
    assert_eq!(summary.product_id.as_str(), "p-1");
    assert_eq!(summary.order_id.as_str(), "77");
    assert!(summary.stock_decrease_confirmed);
    assert_eq!(summary.final_stock, Some(10));
    // two 404s, two stale reads after replenish, one stale read after the order
    assert_eq!(sleeper.calls(), 5);
}

#[tokio::test]
async fn stock_decrease_timeout_is_tolerated() {
    let server = FakeGateway { order_lag: NEVER, ..FakeGateway::default() }.start().await;
    let (scenario, sleeper) = scenario(&server);

    let summary = scenario.run().await.expect("run");

    assert!(!summary.stock_decrease_confirmed);
    assert_eq!(summary.order_id.as_str(), "77");
    assert_eq!(summary.final_stock, Some(10));
    assert!(sleeper.total() >= Duration::from_secs(3));
}

#[tokio::test]
async fn missing_stock_projection_fails_the_run() {
    let server = FakeGateway { initial_lag: NEVER, ..FakeGateway::default() }.start().await;
    let (scenario, sleeper) = scenario(&server);

    let err = scenario.run().await.unwrap_err();

    assert_eq!(err.headline(), "WAIT FAILED");
    match err {
        SmokeError::Wait(WaitError::Exhausted { what, attempts, elapsed, last }) => {
            assert_eq!(what, "initial inventory stock availability");
            assert_eq!(attempts, sleeper.calls() + 1);
            assert!(elapsed >= Duration::from_secs(5));
            assert!(last.to_string().contains("404"), "{last}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn unconfirmed_replenish_fails_the_run() {
    let server = FakeGateway { replenish_lag: NEVER, ..FakeGateway::default() }.start().await;
    let (scenario, _sleeper) = scenario(&server);

    match scenario.run().await.unwrap_err() {
        SmokeError::Wait(WaitError::Exhausted { what, last, .. }) => {
            assert_eq!(what, "stock after replenish");
            assert_eq!(last.to_string(), "stock not updated yet: 0 != 10");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn malformed_stock_payload_is_fatal() {
    let template =
        ResponseTemplate::new(200).set_body_json(json!({"productId": "p-1", "stock": "plenty"}));
    let server =
        FakeGateway { stock_override: Some(template), ..FakeGateway::default() }.start().await;
    let (scenario, sleeper) = scenario(&server);

    let err = scenario.run().await.unwrap_err();

    assert_eq!(err.headline(), "API ERROR");
    assert!(matches!(err, SmokeError::Api(ApiError::Decode { .. })), "{err:?}");
    assert_eq!(sleeper.calls(), 0);
}

#[tokio::test]
async fn client_error_from_stock_is_not_retried() {
    let template = ResponseTemplate::new(400).set_body_json(json!({"message": "bad id"}));
    let server =
        FakeGateway { stock_override: Some(template), ..FakeGateway::default() }.start().await;
    let (scenario, sleeper) = scenario(&server);

    match scenario.run().await.unwrap_err() {
        SmokeError::Api(err) => assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(sleeper.calls(), 0);
}

#[tokio::test]
async fn login_without_token_is_an_assertion_failure() {
    let server =
        FakeGateway { login: json!({"message": "welcome"}), ..FakeGateway::default() }.start().await;
    let (scenario, _sleeper) = scenario(&server);

    let err = scenario.run().await.unwrap_err();

    assert_eq!(err.headline(), "ASSERTION FAILED");
    assert!(err.to_string().starts_with("No token in login response"), "{err}");
}

#[tokio::test]
async fn unknown_route_is_an_api_error() {
    let server = MockServer::start().await;
    let (scenario, _sleeper) = scenario(&server);

    match scenario.run().await.unwrap_err() {
        SmokeError::Api(err) => assert_eq!(err.status(), Some(StatusCode::NOT_FOUND)),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn server_errors_while_polling_stock_are_retried() {
    let server = FakeGateway { initial_lag: 0, stock_outages: 2, ..FakeGateway::default() }
        .start()
        .await;
    let (scenario, sleeper) = scenario(&server);

    let summary = scenario.run().await.expect("run");

    assert!(summary.stock_decrease_confirmed);
    // two 503s, two stale reads after replenish, one stale read after the order
    assert_eq!(sleeper.calls(), 5);
}

#[tokio::test]
async fn visible_user_lookup_only_warns() {
    let server = FakeGateway { user_lookup_status: 200, ..FakeGateway::default() }.start().await;
    let (scenario, _sleeper) = scenario(&server);

    let summary = scenario.run().await.expect("run");

    assert_eq!(summary.user_id.as_str(), "1");
}

#[tokio::test]
async fn product_creation_only_needs_an_id() {
    let server = FakeGateway { create_status: 202, ..FakeGateway::default() }.start().await;
    let (scenario, _sleeper) = scenario(&server);

    let summary = scenario.run().await.expect("run");

    assert_eq!(summary.product_id.as_str(), "p-1");
}
