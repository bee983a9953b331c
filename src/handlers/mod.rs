pub mod customers;
pub mod orders;
pub mod stock;

use crate::{
    config::AppConfig,
    errors::ServiceError,
    events::EventSender,
    services::{
        customers::CustomerService,
        order_codes::OrderCodeGenerator,
        order_status::OrderStatusService,
        orders::OrderService,
        pricing::PricingCalculator,
        stock_ledger::{Clock, StockLedger},
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::info;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone, Debug)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub customers: Arc<CustomerService>,
    pub stock: Arc<StockLedger>,
}

impl AppServices {
    /// Wires every service against one pool, event channel and clock.
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ServiceError> {
        let stock = Arc::new(
            StockLedger::new(
                db.clone(),
                event_sender.clone(),
                clock,
                config.allocation_max_retries,
            )
            .with_page_limits(config.api_default_page_size, config.api_max_page_size),
        );
        let pricing = Arc::new(PricingCalculator::from_config(config)?);
        let codes = Arc::new(OrderCodeGenerator::new(
            config.order_code_prefix.clone(),
            config.order_code_max_attempts,
        ));
        info!(
            tax_policy = pricing.policy_name(),
            order_code_prefix = %config.order_code_prefix,
            "Order services configured"
        );

        let orders = Arc::new(OrderService::new(
            db.clone(),
            stock.clone(),
            pricing,
            codes,
            event_sender.clone(),
            config.order_timeout(),
            config.api_default_page_size,
            config.api_max_page_size,
        ));
        let order_status = Arc::new(OrderStatusService::new(db.clone(), event_sender.clone()));
        let customers = Arc::new(CustomerService::new(db, event_sender));

        Ok(Self {
            orders,
            order_status,
            customers,
            stock,
        })
    }
}
