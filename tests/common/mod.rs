use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    app_router,
    config::AppConfig,
    db,
    events::{self, EventSender},
    gateway::{CreateIntentRequest, GatewayError, GatewayIntent, PaymentGateway, SignatureVerifier},
    handlers::AppServices,
    services::addresses::AddressInput,
    AppState,
};

pub const GATEWAY_SECRET: &str = "test_gateway_secret";

/// Payment gateway double with scriptable outcomes.
#[derive(Default)]
pub struct ScriptedGateway {
    fail_next: AtomicBool,
    counter: AtomicU64,
    pub intents: Mutex<Vec<CreateIntentRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next intent creation fail as if the provider were down.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<GatewayIntent, GatewayError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("scripted outage".to_string()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let intent = GatewayIntent {
            id: format!("gw_order_{}", n),
            amount: request.amount,
            currency: request.currency.clone(),
        };
        self.intents.lock().await.push(request);
        Ok(intent)
    }
}

/// Helper harness: application state over an in-memory SQLite database with
/// a scripted gateway double.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<ScriptedGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        // A single pooled connection keeps the in-memory database alive
        // across requests.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.gateway_key_id = Some("key_test_1".to_string());
        cfg.gateway_key_secret = Some(GATEWAY_SECRET.to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(ScriptedGateway::new());
        let services = AppServices::with_gateway(
            db_arc.clone(),
            Arc::new(event_sender.clone()),
            &cfg,
            Some(gateway.clone() as Arc<dyn PaymentGateway>),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };
        let router = app_router(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    /// Signer matching the configured gateway secret, for minting valid
    /// callback signatures in tests.
    pub fn signer(&self) -> SignatureVerifier {
        SignatureVerifier::new(GATEWAY_SECRET)
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request body"),
            None => builder.body(Body::empty()).expect("request"),
        };
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request should produce a response")
    }

    /// Seed one saved address and return its id.
    pub async fn seed_address(&self, customer_id: Uuid) -> Uuid {
        let saved = self
            .state
            .services
            .addresses
            .save(
                customer_id,
                AddressInput {
                    name: "Asha Rao".to_string(),
                    phone: "9876543210".to_string(),
                    street: "12 MG Road".to_string(),
                    city: "Bengaluru".to_string(),
                    state: "KA".to_string(),
                    postal_code: "560001".to_string(),
                    country: "IN".to_string(),
                    address_type: "home".to_string(),
                },
            )
            .await
            .expect("seed address");
        saved.id
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
