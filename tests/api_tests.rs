//! HTTP surface tests driving the router in-process

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    use smartrash_server::app_state::AppState;
    use smartrash_server::auth::AuthService;
    use smartrash_server::middleware::RateLimiter;
    use smartrash_server::models::{Municipality, Principal, User, UserRole};
    use smartrash_server::notifications::NotificationDispatcher;
    use smartrash_server::pricing::PricingDefaults;
    use smartrash_server::routes::app_router;
    use smartrash_server::store::MemoryStore;

    const DEVICE_KEY: &str = "sensor-key";

    struct TestApp {
        router: Router,
        auth: Arc<AuthService>,
        municipality: Principal,
        agent: Principal,
        customer: Principal,
        admin: Principal,
    }

    impl TestApp {
        fn token(&self, principal: &Principal) -> String {
            self.auth.issue(principal).unwrap()
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            principal: Option<&Principal>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(p) = principal {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(p)));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            send(&self.router, request).await
        }

        async fn sensor(&self, body: Value, key: Option<&str>) -> (StatusCode, Value) {
            let mut builder = Request::builder()
                .method(Method::POST)
                .uri("/api/bin-status")
                .header(header::CONTENT_TYPE, "application/json");
            if let Some(key) = key {
                builder = builder.header("x-device-key", key);
            }
            send(&self.router, builder.body(Body::from(body.to_string())).unwrap()).await
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn user(role: UserRole, municipality_id: Option<Uuid>) -> User {
        let id = Uuid::new_v4();
        User {
            id,
            email: format!("{}@example.com", id.simple()),
            name: None,
            role,
            municipality_id,
            is_approved: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn setup() -> TestApp {
        let store = MemoryStore::new();
        let municipality_id = Uuid::new_v4();
        let users = [
            user(UserRole::Municipality, Some(municipality_id)),
            user(UserRole::Agent, Some(municipality_id)),
            user(UserRole::Customer, Some(municipality_id)),
            user(UserRole::Admin, None),
        ];
        store
            .insert_municipality(Municipality {
                id: municipality_id,
                name: "Musanze".to_string(),
                email: "city@example.com".to_string(),
                admin_user_id: users[0].id,
                created_at: Utc::now(),
            })
            .await;
        let principals = users
            .clone()
            .map(|u| Principal::new(u.id, u.role, u.municipality_id));
        for u in users {
            store.insert_user(u).await;
        }

        let auth = Arc::new(AuthService::new("test-secret".to_string(), 3600));
        let state = AppState::new(
            Arc::new(store),
            auth.clone(),
            PricingDefaults::default(),
            NotificationDispatcher::disabled(),
            Some(DEVICE_KEY.to_string()),
        );
        TestApp {
            router: app_router(state, RateLimiter::new(1000)),
            auth,
            municipality: principals[0],
            agent: principals[1],
            customer: principals[2],
            admin: principals[3],
        }
    }

    /// Provision BIN001 and link it to the customer
    async fn linked_bin(app: &TestApp) {
        let (status, _) = app
            .call(
                Method::POST,
                "/api/bins",
                Some(&app.municipality),
                Some(json!({"bin_id": "BIN001", "location": "Market St"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = app
            .call(Method::POST, "/api/bins/BIN001/link", Some(&app.customer), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_linked"], true);
    }

    #[tokio::test]
    async fn test_health_reports_storage() {
        let app = setup().await;
        let (status, body) = app.call(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storage"], "connected");
    }

    #[tokio::test]
    async fn test_sensor_ingestion_flow() {
        let app = setup().await;
        linked_bin(&app).await;

        let (status, body) = app
            .sensor(json!({"bin_id": "BIN001", "fill_percentage": 80}), Some(DEVICE_KEY))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], "full");
        assert_eq!(body["fill_percentage"], 80);

        let (status, body) = app
            .sensor(json!({"bin_id": "BIN001", "fill_percentage": 92}), Some(DEVICE_KEY))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "overflow");

        let request = Request::builder()
            .uri("/api/bin-status/BIN001")
            .header("x-device-key", DEVICE_KEY)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fill_percentage"], 92);
        assert_eq!(body["location"], "Market St");
    }

    #[tokio::test]
    async fn test_sensor_rejections() {
        let app = setup().await;
        linked_bin(&app).await;

        let (status, body) = app
            .sensor(json!({"bin_id": "BIN001", "fill_percentage": 50}), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, body) = app
            .sensor(json!({"bin_id": "BIN001"}), Some(DEVICE_KEY))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_INPUT");

        let (status, _) = app
            .sensor(json!({"bin_id": "BIN001", "fill_percentage": 140}), Some(DEVICE_KEY))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .sensor(json!({"bin_id": "NOPE", "fill_percentage": 10}), Some(DEVICE_KEY))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_link_twice_conflicts() {
        let app = setup().await;
        linked_bin(&app).await;
        let (status, body) = app
            .call(Method::POST, "/api/bins/BIN001/link", Some(&app.customer), None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "ALREADY_LINKED");
    }

    #[tokio::test]
    async fn test_requests_without_token_are_rejected() {
        let app = setup().await;
        let (status, body) = app.call(Method::GET, "/api/wallet", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "MISSING_TOKEN");

        let request = Request::builder()
            .uri("/api/wallet")
            .header(header::AUTHORIZATION, "Bearer not-a-token")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_wallet_top_up_and_history() {
        let app = setup().await;

        let (status, body) = app
            .call(
                Method::POST,
                "/api/wallet/top-up",
                Some(&app.customer),
                Some(json!({"amount": "100"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["type"], "credit");
        assert_eq!(body["description"], "Money added to wallet");
        assert!(body["transaction_id"].as_str().unwrap().starts_with("TXN"));

        let (status, body) = app
            .call(Method::GET, "/api/wallet", Some(&app.customer), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], "100.00");

        let (_, body) = app
            .call(Method::GET, "/api/wallet/transactions", Some(&app.customer), None)
            .await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = app
            .call(
                Method::POST,
                "/api/wallet/top-up",
                Some(&app.customer),
                Some(json!({"amount": "-5"})),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_wallet_endpoints_require_admin() {
        let app = setup().await;
        let owner = app.customer.user_id;

        let uri = format!("/api/admin/wallets/{}", owner);
        let (status, _) = app
            .call(Method::POST, &uri, Some(&app.customer), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.call(Method::POST, &uri, Some(&app.admin), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call(
                Method::POST,
                &format!("{}/debit", uri),
                Some(&app.admin),
                Some(json!({"amount": "10", "description": "Correction"})),
            )
            .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"]["code"], "INSUFFICIENT_FUNDS");

        let (status, _) = app
            .call(
                Method::POST,
                &format!("{}/credit", uri),
                Some(&app.admin),
                Some(json!({"amount": "25.50", "description": "Refund"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app
            .call(Method::GET, &format!("{}/audit", uri), Some(&app.admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["consistent"], true);
        assert_eq!(body["balance"], "25.50");
    }

    #[tokio::test]
    async fn test_collection_task_over_http() {
        let app = setup().await;
        linked_bin(&app).await;

        let (status, body) = app
            .call(
                Method::PUT,
                "/api/prices",
                Some(&app.municipality),
                Some(json!({"waste_type": "general", "price": "150"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["price"], "150.00");

        app.call(
            Method::POST,
            "/api/wallet/top-up",
            Some(&app.customer),
            Some(json!({"amount": "100"})),
        )
        .await;

        let (status, task) = app
            .call(
                Method::POST,
                "/api/tasks/collections",
                Some(&app.customer),
                Some(json!({
                    "bin_id": "BIN001",
                    "scheduled_date": "2030-01-15T09:00:00Z"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(task["kind"], "collection");
        assert_eq!(task["status"], "pending");
        assert_eq!(task["amount"], "150.00");
        let id = task["id"].as_str().unwrap().to_string();

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/tasks/{}/assign", id),
                Some(&app.municipality),
                Some(json!({"agent_id": app.customer.user_id})),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "INVALID_AGENT");

        let (status, _) = app
            .call(
                Method::POST,
                &format!("/api/tasks/{}/assign", id),
                Some(&app.municipality),
                Some(json!({"agent_id": app.agent.user_id})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/tasks/{}/collect", id),
                Some(&app.agent),
                Some(json!({"bin_id": "BIN002"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "IDENTITY_MISMATCH");

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/tasks/{}/collect", id),
                Some(&app.agent),
                Some(json!({"bin_id": "BIN001"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "collected");

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/tasks/{}/verify", id),
                Some(&app.customer),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"]["code"], "INSUFFICIENT_FUNDS");

        app.call(
            Method::POST,
            "/api/wallet/top-up",
            Some(&app.customer),
            Some(json!({"amount": "50"})),
        )
        .await;
        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/tasks/{}/verify", id),
                Some(&app.customer),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["task"]["status"], "verified");
        assert_eq!(body["task"]["payment_status"], "paid");
        assert_eq!(body["transfer"]["debit"]["amount"], "150.00");

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/tasks/{}/verify", id),
                Some(&app.customer),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_STATE");

        let (status, body) = app
            .call(Method::GET, "/api/wallet", Some(&app.municipality), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance"], "150.00");
    }

    #[tokio::test]
    async fn test_quote_falls_back_to_default() {
        let app = setup().await;
        let municipality_id = app.municipality.municipality_id.unwrap();

        let (status, body) = app
            .call(
                Method::GET,
                &format!(
                    "/api/prices/quote?municipality_id={}&waste_type=general",
                    municipality_id
                ),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "default");
        assert_eq!(body["price"], "50.00");

        let (status, _) = app
            .call(Method::GET, "/api/prices/quote?waste_type=general", None, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_security_headers_present() {
        let app = setup().await;
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["cache-control"], "no-store");
        assert!(headers.contains_key("x-request-id"));
    }
}
