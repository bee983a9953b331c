#![allow(dead_code)]

use std::{path::PathBuf, str::FromStr, sync::Arc};

use axum::{
    body::Body,
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde_json::Value;
use shopstock_api::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::{category, customer, product, shop, stock_lot, user, warehouse},
    events::{self, EventSender},
    services::stock_ledger::FixedClock,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str =
    "k3Jq8Zp1Lm4Xw8Rt1Vb6Ny3Hc5Jd0Fg2integration4test5secret6with7entropy8";

pub fn today() -> NaiveDate {
    date(2024, 1, 1)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
}

pub fn money(value: &Value) -> Decimal {
    let raw = value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string());
    Decimal::from_str(&raw).expect("money field should be a decimal")
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        TEST_JWT_SECRET.to_string(),
        "127.0.0.1".to_string(),
        0,
        "development".to_string(),
    );
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg
}

/// A shop with one warehouse, one category and its people
pub struct Fixture {
    pub shop: shop::Model,
    pub warehouse: warehouse::Model,
    pub category: category::Model,
    pub admin: user::Model,
    pub staff: user::Model,
    pub customer: customer::Model,
}

/// Application state and router over a fresh in-memory SQLite database, with
/// "today" pinned to 2024-01-01.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    _event_task: tokio::task::JoinHandle<()>,
    db_file: Option<PathBuf>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Same setup over a throwaway SQLite file, so the pool can hold several
    /// real connections that contend for the same rows.
    pub async fn on_disk(max_connections: u32) -> Self {
        let path = std::env::temp_dir().join(format!("shopstock-{}.db", uuid::Uuid::new_v4()));
        let mut cfg = test_config();
        cfg.database_url = format!("sqlite://{}?mode=rwc", path.display());
        cfg.db_max_connections = max_connections;
        let mut app = Self::with_config(cfg).await;
        app.db_file = Some(path);
        app
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            ..DbConfig::default()
        })
        .await
        .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(
            db_arc.clone(),
            cfg,
            Arc::new(EventSender::new(event_tx)),
            Arc::new(FixedClock(today())),
        )
        .expect("failed to build app state");
        let router = shopstock_api::build_router(state.clone()).expect("failed to build router");

        Self {
            router,
            state,
            db: db_arc,
            _event_task: event_task,
            db_file: None,
        }
    }

    pub fn token_for(&self, user: &user::Model) -> String {
        self.state
            .auth
            .issue_token(user.id)
            .expect("failed to issue test token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Authenticated request as `user`
    pub async fn request_as(
        &self,
        user: &user::Model,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let token = self.token_for(user);
        self.request(method, uri, body, Some(&token)).await
    }

    pub async fn seed_shop(&self, name: &str) -> shop::Model {
        shop::ActiveModel {
            name: Set(name.to_string()),
            address: Set(None),
            region: Set("south".to_string()),
            status: Set("active".to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed shop")
    }

    pub async fn seed_warehouse(&self, shop_id: i32, name: &str) -> warehouse::Model {
        warehouse::ActiveModel {
            name: Set(name.to_string()),
            shop_id: Set(shop_id),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed warehouse")
    }

    pub async fn seed_category(&self, warehouse_id: i32, name: &str) -> category::Model {
        category::ActiveModel {
            name: Set(name.to_string()),
            warehouse_id: Set(warehouse_id),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed category")
    }

    pub async fn seed_user(&self, email: &str, role: &str, shop_id: Option<i32>) -> user::Model {
        user::ActiveModel {
            name: Set(email.to_string()),
            email: Set(email.to_string()),
            role: Set(role.to_string()),
            shop_id: Set(shop_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed user")
    }

    pub async fn seed_customer(&self, name: &str, phone: &str) -> customer::Model {
        customer::ActiveModel {
            name: Set(name.to_string()),
            phone: Set(phone.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed customer")
    }

    pub async fn seed_product(
        &self,
        code: &str,
        price: Decimal,
        promo_price: Option<Decimal>,
    ) -> product::Model {
        product::ActiveModel {
            code: Set(code.to_string()),
            name: Set(format!("Product {}", code)),
            price: Set(price),
            promo_price: Set(promo_price),
            description: Set(None),
            weight: Set(None),
            unit: Set(None),
            expiry_date: Set(None),
            created_by: Set(None),
            updated_by: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed product")
    }

    /// Inserts a lot directly, bypassing intake merging
    pub async fn seed_lot(
        &self,
        product_id: i32,
        category: &category::Model,
        quantity: i32,
        expiry_date: Option<NaiveDate>,
    ) -> stock_lot::Model {
        let warehouse = warehouse::Entity::find_by_id(category.warehouse_id)
            .one(&*self.db)
            .await
            .expect("load warehouse")
            .expect("category warehouse exists");
        stock_lot::ActiveModel {
            product_id: Set(product_id),
            category_id: Set(category.id),
            warehouse_id: Set(warehouse.id),
            shop_id: Set(warehouse.shop_id),
            image_id: Set(None),
            quantity: Set(quantity),
            expiry_date: Set(expiry_date),
            created_by: Set(None),
            updated_by: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("seed stock lot")
    }

    pub async fn lot_quantity(&self, lot_id: i32) -> i32 {
        stock_lot::Entity::find_by_id(lot_id)
            .one(&*self.db)
            .await
            .expect("load lot")
            .expect("lot exists")
            .quantity
    }

    /// One shop with a warehouse, a category, an admin, an assigned staff
    /// member and a customer
    pub async fn fixture(&self) -> Fixture {
        let shop = self.seed_shop("Central").await;
        let warehouse = self.seed_warehouse(shop.id, "Main").await;
        let category = self.seed_category(warehouse.id, "Dry goods").await;
        let admin = self.seed_user("admin@shop.test", "admin", None).await;
        let staff = self
            .seed_user("staff@shop.test", "staff", Some(shop.id))
            .await;
        let customer = self.seed_customer("Lan", "0901234567").await;
        Fixture {
            shop,
            warehouse,
            category,
            admin,
            staff,
            customer,
        }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
        if let Some(path) = &self.db_file {
            let _ = std::fs::remove_file(path);
        }
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body should be json")
}
