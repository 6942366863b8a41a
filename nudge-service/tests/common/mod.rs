#![allow(dead_code)]

use chrono::{DateTime, Utc};
use nudge_service::services::{
    InMemoryStore, MockEmailProvider, SchedulerPolicy, StaticIdentityProvider,
};
use nudge_service::startup::{build_router, AppState};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{json, Value};
use service_core::middleware::{GovernorRateLimitStore, RateLimitState};
use std::sync::Arc;
use tokio::net::TcpListener;

pub const TEST_USER_ID: &str = "test_user_123";
pub const OTHER_USER_ID: &str = "other_user_456";
pub const CRON_SECRET: &str = "test-cron-secret";

pub struct TestApp {
    pub address: String,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub email: Arc<MockEmailProvider>,
    pub http: Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let email = Arc::new(MockEmailProvider::new());
        let identity = Arc::new(
            StaticIdentityProvider::new().with_email(TEST_USER_ID, "owner@example.com"),
        );

        let state = AppState::new(
            store.clone(),
            email.clone(),
            identity,
            CRON_SECRET,
            "Nudge",
            SchedulerPolicy::default(),
        );
        let rate_limit = RateLimitState {
            store: Arc::new(GovernorRateLimitStore::new(10_000, 60)),
        };
        let router = build_router(state.clone(), rate_limit);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let port = listener.local_addr().expect("Failed to read port").port();

        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            state,
            store,
            email,
            http: Client::new(),
        }
    }

    pub fn get_as(&self, user_id: &str, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", self.address, path))
            .header("X-User-ID", user_id)
    }

    pub fn post_as(&self, user_id: &str, path: &str, body: Value) -> RequestBuilder {
        self.http
            .post(format!("{}{}", self.address, path))
            .header("X-User-ID", user_id)
            .json(&body)
    }

    pub async fn get(&self, path: &str) -> Response {
        self.get_as(TEST_USER_ID, path)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, body: Value) -> Response {
        self.post_as(TEST_USER_ID, path, body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, path: &str, body: Value) -> Response {
        self.http
            .put(format!("{}{}", self.address, path))
            .header("X-User-ID", TEST_USER_ID)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch(&self, path: &str, body: Value) -> Response {
        self.http
            .patch(format!("{}{}", self.address, path))
            .header("X-User-ID", TEST_USER_ID)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.http
            .delete(format!("{}{}", self.address, path))
            .header("X-User-ID", TEST_USER_ID)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn create_client(&self) -> String {
        let response = self
            .post(
                "/api/clients",
                json!({ "name": "Ada Lovelace", "email": "ada@example.com" }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.expect("Failed to parse response");
        body["client"]["clientId"]
            .as_str()
            .expect("client id")
            .to_string()
    }

    /// Draft invoice with every field needed for sending.
    pub async fn create_draft(&self, schedule: &str, due_date: &str) -> String {
        let client_id = self.create_client().await;
        let response = self
            .post(
                "/api/invoices",
                json!({
                    "clientId": client_id,
                    "amountCents": 125000,
                    "dueDate": due_date,
                    "paymentLink": "https://pay.example.com/inv-1",
                    "reminderSchedule": schedule,
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.expect("Failed to parse response");
        body["invoice"]["invoiceId"]
            .as_str()
            .expect("invoice id")
            .to_string()
    }

    /// Draft created and sent through the API.
    pub async fn create_sent(&self, schedule: &str, due_date: &str) -> String {
        let invoice_id = self.create_draft(schedule, due_date).await;
        let response = self
            .post(&format!("/api/invoices/{}/send", invoice_id), json!({}))
            .await;
        assert_eq!(response.status().as_u16(), 200);
        invoice_id
    }

    pub async fn invoice(&self, invoice_id: &str) -> Value {
        let response = self.get(&format!("/api/invoices/{}", invoice_id)).await;
        assert!(response.status().is_success());
        let body: Value = response.json().await.expect("Failed to parse response");
        body["invoice"].clone()
    }
}

/// 09:00 UTC on the given calendar date.
pub fn morning(date: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&format!("{}T09:00:00Z", date))
        .expect("valid date")
        .with_timezone(&Utc)
}

pub async fn json_body(response: Response) -> Value {
    response.json().await.expect("Failed to parse response")
}
