use crate::{
    auth::Requester,
    entities::{category, customer, order, order_line, order_line_allocation, product, shop, warehouse},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        order_codes::OrderCodeGenerator,
        order_status::OrderStatus,
        pricing::{effective_unit_price, PricedLine, PricingCalculator},
        stock_ledger::{LotDeduction, StockKey, StockLedger},
    },
    tracing::with_metrics,
};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Query, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, str::FromStr, sync::Arc, time::Duration};
use strum::{Display, EnumString};
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum PaymentMethod {
    #[strum(serialize = "cash")]
    Cash,
    #[serde(alias = "bank-transfer")]
    #[strum(to_string = "bank_transfer", serialize = "bank-transfer")]
    BankTransfer,
}

impl PaymentMethod {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        PaymentMethod::from_str(raw.trim()).map_err(|_| {
            ServiceError::ValidationError(format!(
                "paymentMethod must be cash or bank_transfer, got '{}'",
                raw
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    #[validate(range(min = 1, message = "productId must be positive"))]
    pub product_id: i32,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i32,
    /// Restricts allocation to one category of the warehouse
    #[validate(range(min = 1, message = "categoryId must be positive"))]
    pub category_id: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(range(min = 1, message = "customerId must be positive"))]
    pub customer_id: i32,
    #[validate(range(min = 1, message = "shopId must be positive"))]
    pub shop_id: i32,
    #[validate(range(min = 1, message = "warehouseId must be positive"))]
    pub warehouse_id: i32,
    #[schema(example = "cash")]
    pub payment_method: String,
    #[validate(length(min = 1, message = "an order needs at least one item"))]
    pub items: Vec<OrderItemRequest>,
}

/// Staff order: shop and warehouse come from the caller's assignment
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StaffOrderRequest {
    #[validate(range(min = 1, message = "customerId must be positive"))]
    pub customer_id: i32,
    #[schema(example = "bank_transfer")]
    pub payment_method: String,
    #[validate(length(min = 1, message = "an order needs at least one item"))]
    pub items: Vec<OrderItemRequest>,
}

/// Returned by order creation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: i32,
    pub code: String,
    #[schema(value_type = String, example = "115000")]
    pub subtotal: Decimal,
    #[schema(value_type = String, example = "9200")]
    pub tax: Decimal,
    #[schema(value_type = String, example = "124200")]
    pub total_price: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: i32,
    pub code: String,
    pub customer_id: i32,
    pub shop_id: i32,
    pub warehouse_id: i32,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub tax: Decimal,
    #[schema(value_type = String)]
    pub total_price: Decimal,
    pub status: String,
    pub payment_method: String,
    pub created_by: i32,
    pub updated_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<order::Model> for OrderView {
    fn from(model: order::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            customer_id: model.customer_id,
            shop_id: model.shop_id,
            warehouse_id: model.warehouse_id,
            subtotal: model.subtotal.normalize(),
            tax: model.tax.normalize(),
            total_price: model.total_price.normalize(),
            status: model.status,
            payment_method: model.payment_method,
            created_by: model.created_by,
            updated_by: model.updated_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineView {
    pub id: i32,
    pub product_id: i32,
    pub product_code: String,
    pub product_name: String,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
    #[schema(value_type = String)]
    pub total_price: Decimal,
    pub category_id: Option<i32>,
    pub allocations: Vec<LotDeduction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: OrderView,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub lines: Vec<OrderLineView>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    /// processing, ready_for_pickup or completed
    pub status: Option<String>,
    /// Matches order code, customer name or customer phone
    pub search: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub items: Vec<OrderView>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

/// A validated order ready to be built
#[derive(Debug, Clone)]
struct OrderDraft {
    customer_id: i32,
    shop_id: i32,
    warehouse_id: i32,
    payment_method: PaymentMethod,
    items: Vec<OrderItemRequest>,
}

struct ResolvedItem {
    product: product::Model,
    unit_price: Decimal,
    quantity: i32,
    category_id: Option<i32>,
}

struct PlacedOrder {
    order: order::Model,
    allocations: Vec<(i32, Vec<LotDeduction>)>,
}

/// Creates orders and serves the order read side
#[derive(Debug, Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    ledger: Arc<StockLedger>,
    pricing: Arc<PricingCalculator>,
    codes: Arc<OrderCodeGenerator>,
    event_sender: Arc<EventSender>,
    order_timeout: Duration,
    default_page_size: u64,
    max_page_size: u64,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        ledger: Arc<StockLedger>,
        pricing: Arc<PricingCalculator>,
        codes: Arc<OrderCodeGenerator>,
        event_sender: Arc<EventSender>,
        order_timeout: Duration,
        default_page_size: u64,
        max_page_size: u64,
    ) -> Self {
        Self {
            db,
            ledger,
            pricing,
            codes,
            event_sender,
            order_timeout,
            default_page_size: default_page_size.max(1),
            max_page_size: max_page_size.max(1),
        }
    }

    fn validate_items(items: &[OrderItemRequest]) -> Result<(), ServiceError> {
        for item in items {
            item.validate()?;
        }
        Ok(())
    }

    /// Creates an order for an explicit shop and warehouse
    #[instrument(skip(self, requester, request), fields(user_id = requester.user_id, shop_id = request.shop_id))]
    pub async fn create_order(
        &self,
        requester: &Requester,
        request: CreateOrderRequest,
    ) -> Result<OrderSummary, ServiceError> {
        request.validate()?;
        Self::validate_items(&request.items)?;
        let payment_method = PaymentMethod::parse(&request.payment_method)?;
        requester.ensure_shop_access(request.shop_id)?;

        self.place(
            requester,
            OrderDraft {
                customer_id: request.customer_id,
                shop_id: request.shop_id,
                warehouse_id: request.warehouse_id,
                payment_method,
                items: request.items,
            },
        )
        .await
    }

    /// Creates an order in the caller's own shop and warehouse
    #[instrument(skip(self, requester, request), fields(user_id = requester.user_id))]
    pub async fn create_order_as_staff(
        &self,
        requester: &Requester,
        request: StaffOrderRequest,
    ) -> Result<OrderSummary, ServiceError> {
        request.validate()?;
        Self::validate_items(&request.items)?;
        let payment_method = PaymentMethod::parse(&request.payment_method)?;
        let shop_id = requester.assigned_shop()?;

        let warehouses = warehouse::Entity::find()
            .filter(warehouse::Column::ShopId.eq(shop_id))
            .order_by_asc(warehouse::Column::Id)
            .all(&*self.db)
            .await?;
        let warehouse = warehouses.first().ok_or_else(|| {
            ServiceError::ValidationError(format!("shop {} has no warehouse", shop_id))
        })?;
        if warehouses.len() > 1 {
            warn!(
                shop_id,
                count = warehouses.len(),
                chosen = warehouse.id,
                "Shop has several warehouses, using the first"
            );
        }

        self.place(
            requester,
            OrderDraft {
                customer_id: request.customer_id,
                shop_id,
                warehouse_id: warehouse.id,
                payment_method,
                items: request.items,
            },
        )
        .await
    }

    async fn place(
        &self,
        requester: &Requester,
        draft: OrderDraft,
    ) -> Result<OrderSummary, ServiceError> {
        let timeout = self.order_timeout;
        let draft = &draft;
        let placed = with_metrics("shopstock.orders.create", move || async move {
            match tokio::time::timeout(timeout, self.build_order(requester, draft)).await {
                Ok(result) => result,
                Err(_) => {
                    counter!("shopstock.orders.timeouts", 1);
                    Err(ServiceError::Busy(format!(
                        "order creation exceeded {}s",
                        timeout.as_secs()
                    )))
                }
            }
        })
        .await?;

        counter!("shopstock.orders.created", 1);
        info!(order_id = placed.order.id, code = %placed.order.code, "Order created");

        for ((product_id, deductions), item) in placed.allocations.iter().zip(&draft.items) {
            self.event_sender
                .send_or_log(Event::StockAllocated {
                    product_id: *product_id,
                    warehouse_id: placed.order.warehouse_id,
                    quantity: item.quantity,
                    lot_ids: deductions.iter().map(|d| d.lot_id).collect(),
                });
        }
        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: placed.order.id,
                code: placed.order.code.clone(),
                shop_id: placed.order.shop_id,
                total_price: placed.order.total_price,
            });

        Ok(OrderSummary {
            order_id: placed.order.id,
            code: placed.order.code,
            subtotal: placed.order.subtotal.normalize(),
            tax: placed.order.tax.normalize(),
            total_price: placed.order.total_price.normalize(),
            status: OrderStatus::Processing,
        })
    }

    async fn build_order(
        &self,
        requester: &Requester,
        draft: &OrderDraft,
    ) -> Result<PlacedOrder, ServiceError> {
        let txn = self.db.begin().await?;
        match self.build_order_in(&txn, requester, draft).await {
            Ok(placed) => {
                txn.commit().await?;
                Ok(placed)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "Order rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn build_order_in(
        &self,
        txn: &DatabaseTransaction,
        requester: &Requester,
        draft: &OrderDraft,
    ) -> Result<PlacedOrder, ServiceError> {
        customer::Entity::find_by_id(draft.customer_id)
            .one(txn)
            .await?
            .ok_or(ServiceError::CustomerNotFound(draft.customer_id))?;

        shop::Entity::find_by_id(draft.shop_id)
            .one(txn)
            .await?
            .ok_or(ServiceError::ShopNotFound(draft.shop_id))?;

        let warehouse = warehouse::Entity::find_by_id(draft.warehouse_id)
            .one(txn)
            .await?
            .ok_or(ServiceError::WarehouseNotFound(draft.warehouse_id))?;
        if warehouse.shop_id != draft.shop_id {
            return Err(ServiceError::ValidationError(format!(
                "warehouse {} does not belong to shop {}",
                warehouse.id, draft.shop_id
            )));
        }

        // Every line is checked before any stock moves.
        let mut resolved = Vec::with_capacity(draft.items.len());
        for item in &draft.items {
            let product = product::Entity::find_by_id(item.product_id)
                .one(txn)
                .await?
                .ok_or(ServiceError::ProductNotFound(item.product_id))?;
            if let Some(category_id) = item.category_id {
                category::Entity::find_by_id(category_id)
                    .one(txn)
                    .await?
                    .filter(|c| c.warehouse_id == warehouse.id)
                    .ok_or(ServiceError::CategoryNotFound(category_id))?;
            }
            let unit_price = effective_unit_price(product.id, product.price, product.promo_price)?;
            resolved.push(ResolvedItem {
                product,
                unit_price,
                quantity: item.quantity,
                category_id: item.category_id,
            });
        }

        let mut allocations = Vec::with_capacity(resolved.len());
        for item in &resolved {
            let key = StockKey {
                product_id: item.product.id,
                shop_id: draft.shop_id,
                warehouse_id: warehouse.id,
                category_id: item.category_id,
            };
            let deductions = self
                .ledger
                .allocate(txn, key, item.quantity, requester.user_id)
                .await?;
            allocations.push((item.product.id, deductions));
        }

        let category_ids: Vec<i32> = allocations
            .iter()
            .flat_map(|(_, deductions)| deductions.iter().map(|d| d.category_id))
            .collect();
        let category_names: HashMap<i32, String> = category::Entity::find()
            .filter(category::Column::Id.is_in(category_ids))
            .all(txn)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let priced: Vec<PricedLine> = resolved
            .iter()
            .zip(&allocations)
            .map(|(item, (_, deductions))| {
                let mut line = PricedLine::new(item.product.id, item.unit_price, item.quantity);
                for d in deductions {
                    line.add_slice(d.quantity, category_names.get(&d.category_id).cloned());
                }
                line
            })
            .collect();
        let totals = self.pricing.totals(&priced);

        let code = self.codes.next_code(txn, draft.shop_id).await?;
        let now = Utc::now();

        let order = order::ActiveModel {
            code: Set(code),
            customer_id: Set(draft.customer_id),
            shop_id: Set(draft.shop_id),
            warehouse_id: Set(warehouse.id),
            subtotal: Set(totals.subtotal),
            tax: Set(totals.tax),
            total_price: Set(totals.total),
            status: Set(OrderStatus::Processing.to_string()),
            payment_method: Set(draft.payment_method.to_string()),
            created_by: Set(requester.user_id),
            updated_by: Set(None),
            created_at: Set(now),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        for ((item, line), (_, deductions)) in resolved.iter().zip(&priced).zip(&allocations) {
            let saved_line = order_line::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(item.product.id),
                product_code: Set(item.product.code.clone()),
                product_name: Set(item.product.name.clone()),
                quantity: Set(item.quantity),
                unit_price: Set(line.unit_price),
                total_price: Set(line.line_total),
                category_id: Set(item.category_id),
                created_by: Set(requester.user_id),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(txn)
            .await?;

            for d in deductions {
                order_line_allocation::ActiveModel {
                    order_line_id: Set(saved_line.id),
                    stock_lot_id: Set(d.lot_id),
                    category_id: Set(d.category_id),
                    quantity: Set(d.quantity),
                    ..Default::default()
                }
                .insert(txn)
                .await?;
            }
        }

        Ok(PlacedOrder { order, allocations })
    }

    async fn load_visible(
        &self,
        requester: &Requester,
        order_id: i32,
    ) -> Result<order::Model, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;
        requester.ensure_shop_access(order.shop_id)?;
        Ok(order)
    }

    #[instrument(skip(self, requester), fields(user_id = requester.user_id))]
    pub async fn get_order(
        &self,
        requester: &Requester,
        order_id: i32,
    ) -> Result<OrderView, ServiceError> {
        Ok(self.load_visible(requester, order_id).await?.into())
    }

    /// Header, customer and lines with their lot allocations
    #[instrument(skip(self, requester), fields(user_id = requester.user_id))]
    pub async fn get_order_details(
        &self,
        requester: &Requester,
        order_id: i32,
    ) -> Result<OrderDetails, ServiceError> {
        let order = self.load_visible(requester, order_id).await?;
        let customer = customer::Entity::find_by_id(order.customer_id)
            .one(&*self.db)
            .await?;

        let lines = order_line::Entity::find()
            .filter(order_line::Column::OrderId.eq(order.id))
            .order_by_asc(order_line::Column::Id)
            .find_with_related(order_line_allocation::Entity)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|(line, allocations)| OrderLineView {
                id: line.id,
                product_id: line.product_id,
                product_code: line.product_code,
                product_name: line.product_name,
                quantity: line.quantity,
                unit_price: line.unit_price.normalize(),
                total_price: line.total_price.normalize(),
                category_id: line.category_id,
                allocations: allocations
                    .into_iter()
                    .map(|a| LotDeduction {
                        lot_id: a.stock_lot_id,
                        category_id: a.category_id,
                        quantity: a.quantity,
                    })
                    .collect(),
            })
            .collect();

        Ok(OrderDetails {
            order: order.into(),
            customer_name: customer.as_ref().map(|c| c.name.clone()),
            customer_phone: customer.map(|c| c.phone),
            lines,
        })
    }

    /// Newest first. Staff see only their own shop.
    #[instrument(skip(self, requester), fields(user_id = requester.user_id))]
    pub async fn list_orders(
        &self,
        requester: &Requester,
        query: OrderListQuery,
    ) -> Result<OrderPage, ServiceError> {
        let mut condition = Condition::all();

        if let Some(shop_id) = requester.shop_scope() {
            condition = condition.add(order::Column::ShopId.eq(shop_id));
        }

        if let Some(raw) = query.status.as_deref().filter(|s| !s.trim().is_empty()) {
            let status = OrderStatus::parse(raw)?;
            condition = condition.add(order::Column::Status.eq(status.to_string()));
        }

        if let Some(term) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let matching_customers = Query::select()
                .column(customer::Column::Id)
                .from(customer::Entity)
                .cond_where(
                    Condition::any()
                        .add(customer::Column::Name.contains(term))
                        .add(customer::Column::Phone.contains(term)),
                )
                .to_owned();
            condition = condition.add(
                Condition::any()
                    .add(order::Column::Code.contains(term))
                    .add(order::Column::CustomerId.in_subquery(matching_customers)),
            );
        }

        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            if start > end {
                return Err(ServiceError::ValidationError(
                    "startDate must not be after endDate".to_string(),
                ));
            }
        }
        if let Some(start) = query.start_date {
            condition = condition.add(order::Column::CreatedAt.gte(start_of_day(start)));
        }
        if let Some(end) = query.end_date {
            condition =
                condition.add(order::Column::CreatedAt.lt(start_of_day(end) + ChronoDuration::days(1)));
        }

        let limit = query
            .limit
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);
        let page = query.page.unwrap_or(1).max(1);

        let paginator = order::Entity::find()
            .filter(condition)
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let items = paginator
            .fetch_page(page - 1)
            .await?
            .into_iter()
            .map(OrderView::from)
            .collect();

        Ok(OrderPage {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn payment_methods_accept_both_spellings() {
        assert_eq!(PaymentMethod::parse("cash").unwrap(), PaymentMethod::Cash);
        assert_eq!(
            PaymentMethod::parse("bank-transfer").unwrap(),
            PaymentMethod::BankTransfer
        );
        assert_eq!(
            PaymentMethod::parse("BANK_TRANSFER").unwrap(),
            PaymentMethod::BankTransfer
        );
        assert_eq!(PaymentMethod::BankTransfer.to_string(), "bank_transfer");
        assert_matches!(
            PaymentMethod::parse("card"),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn empty_item_list_fails_validation() {
        let request = CreateOrderRequest {
            customer_id: 1,
            shop_id: 1,
            warehouse_id: 1,
            payment_method: "cash".into(),
            items: vec![],
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("items"));
    }

    #[test]
    fn non_positive_quantity_fails_item_validation() {
        let items = vec![OrderItemRequest {
            product_id: 1,
            quantity: 0,
            category_id: None,
        }];
        assert_matches!(
            OrderService::validate_items(&items),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn order_request_reads_camel_case() {
        let request: CreateOrderRequest = serde_json::from_value(serde_json::json!({
            "customerId": 3,
            "shopId": 1,
            "warehouseId": 2,
            "paymentMethod": "cash",
            "items": [{ "productId": 5, "quantity": 2, "categoryId": 7 }]
        }))
        .unwrap();
        assert_eq!(request.items[0].category_id, Some(7));
        assert_eq!(request.warehouse_id, 2);
    }

    #[test]
    fn day_bounds_are_utc_midnight() {
        let start = start_of_day(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(start.to_rfc3339(), "2024-03-05T00:00:00+00:00");
    }
}
