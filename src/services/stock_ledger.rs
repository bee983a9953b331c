use crate::{
    auth::Requester,
    entities::{category, product, stock_lot, stock_out, warehouse},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, DbBackend, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Source of "today" for expiry checks
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Clock pinned to a date, for replaying or testing expiry behaviour
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Identifies a stock pool. Without a category every category of the
/// (product, shop, warehouse) triple is pooled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StockKey {
    pub product_id: i32,
    pub shop_id: i32,
    pub warehouse_id: i32,
    pub category_id: Option<i32>,
}

/// Quantity taken from one lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LotDeduction {
    pub lot_id: i32,
    pub category_id: i32,
    pub quantity: i32,
}

/// The parts of a lot the planner looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LotLevel {
    pub id: i32,
    pub category_id: i32,
    pub quantity: i32,
    pub expiry_date: Option<NaiveDate>,
}

impl From<&stock_lot::Model> for LotLevel {
    fn from(lot: &stock_lot::Model) -> Self {
        Self {
            id: lot.id,
            category_id: lot.category_id,
            quantity: lot.quantity,
            expiry_date: lot.expiry_date,
        }
    }
}

/// Units the pool is short by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall(pub i32);

/// Orders lots first-expiry-first-out: dated lots by expiry, then undated lots,
/// ties broken by lot id.
pub fn sort_fefo(lots: &mut [LotLevel]) {
    lots.sort_by_key(|lot| (lot.expiry_date.is_none(), lot.expiry_date, lot.id));
}

/// Plans which lots cover `requested` units without touching storage.
/// Lots that are empty or expired before `as_of` are skipped.
pub fn plan_fefo(
    lots: &[LotLevel],
    requested: i32,
    as_of: NaiveDate,
) -> Result<Vec<LotDeduction>, Shortfall> {
    let mut eligible: Vec<LotLevel> = lots
        .iter()
        .copied()
        .filter(|lot| lot.quantity > 0 && lot.expiry_date.map_or(true, |d| d >= as_of))
        .collect();
    sort_fefo(&mut eligible);

    let mut remaining = requested;
    let mut plan = Vec::new();
    for lot in eligible {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(lot.quantity);
        plan.push(LotDeduction {
            lot_id: lot.id,
            category_id: lot.category_id,
            quantity: take,
        });
        remaining -= take;
    }

    if remaining > 0 {
        Err(Shortfall(remaining))
    } else {
        Ok(plan)
    }
}

/// Stock intake into a warehouse category
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveStockRequest {
    #[validate(range(min = 1))]
    pub product_id: i32,
    #[validate(range(min = 1))]
    pub category_id: i32,
    #[validate(range(min = 1))]
    pub warehouse_id: i32,
    pub image_id: Option<i32>,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i32,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetLotQuantityRequest {
    #[validate(range(min = 0, message = "quantity cannot be negative"))]
    pub quantity: i32,
}

/// Removal of stock that is not an order (damage, loss, returns to supplier)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockOutRequest {
    #[validate(range(min = 1))]
    pub product_id: i32,
    #[validate(range(min = 1))]
    pub warehouse_id: i32,
    #[validate(range(min = 1, message = "quantity must be positive"))]
    pub quantity: i32,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Result of a stock-out: the record plus the lots it drew from
#[derive(Debug, Clone)]
pub struct StockOutResult {
    pub stock_out: stock_out::Model,
    pub deductions: Vec<LotDeduction>,
}

/// Filters for the lot listing. Staff are always held to their own shop.
#[derive(Debug, Clone, Default, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct StockLotQuery {
    #[validate(range(min = 1))]
    pub shop_id: Option<i32>,
    #[validate(range(min = 1))]
    pub warehouse_id: Option<i32>,
    #[validate(range(min = 1))]
    pub category_id: Option<i32>,
    #[validate(range(min = 1))]
    pub product_id: Option<i32>,
    /// Also return lots whose expiry date has passed
    #[serde(default)]
    pub include_expired: bool,
    /// Leave out lots with nothing left
    #[serde(default)]
    pub in_stock_only: bool,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

/// A lot with the names a stock screen shows next to it
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockLotListing {
    pub id: i32,
    pub product_id: i32,
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub category_id: i32,
    pub category_name: Option<String>,
    pub warehouse_id: i32,
    pub shop_id: i32,
    pub image_id: Option<i32>,
    pub quantity: i32,
    pub expiry_date: Option<NaiveDate>,
    pub expired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockLotPage {
    pub items: Vec<StockLotListing>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct StockTotalsQuery {
    #[validate(range(min = 1))]
    pub warehouse_id: i32,
    #[validate(range(min = 1))]
    pub category_id: Option<i32>,
}

/// Usable stock of one product in a warehouse, summed over its lots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductStockTotal {
    pub product_id: i32,
    pub product_code: String,
    pub product_name: String,
    pub available: i64,
    pub lot_count: u32,
    pub category_names: Vec<String>,
    pub nearest_expiry: Option<NaiveDate>,
}

/// Running totals for one product while folding its lots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductTally {
    pub available: i64,
    pub lot_count: u32,
    pub category_ids: BTreeSet<i32>,
    pub nearest_expiry: Option<NaiveDate>,
}

/// Folds usable lots into per-product tallies. Empty and expired lots are
/// ignored.
pub fn tally_by_product(
    lots: &[stock_lot::Model],
    as_of: NaiveDate,
) -> BTreeMap<i32, ProductTally> {
    let mut tallies: BTreeMap<i32, ProductTally> = BTreeMap::new();
    for lot in lots.iter().filter(|lot| lot.is_eligible(as_of)) {
        let tally = tallies.entry(lot.product_id).or_default();
        tally.available += i64::from(lot.quantity);
        tally.lot_count += 1;
        tally.category_ids.insert(lot.category_id);
        tally.nearest_expiry = match (tally.nearest_expiry, lot.expiry_date) {
            (Some(current), Some(candidate)) => Some(current.min(candidate)),
            (current, candidate) => current.or(candidate),
        };
    }
    tallies
}

/// Per-lot stock quantities and the only code that changes them
#[derive(Debug, Clone)]
pub struct StockLedger {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
    default_page_size: u64,
    max_page_size: u64,
}

impl StockLedger {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        clock: Arc<dyn Clock>,
        max_retries: u32,
    ) -> Self {
        Self {
            db,
            event_sender,
            clock,
            max_retries: max_retries.max(1),
            default_page_size: 20,
            max_page_size: 100,
        }
    }

    pub fn with_page_limits(mut self, default_page_size: u64, max_page_size: u64) -> Self {
        self.max_page_size = max_page_size.max(1);
        self.default_page_size = default_page_size.clamp(1, self.max_page_size);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    fn pool_condition(key: &StockKey, as_of: NaiveDate) -> Condition {
        let mut cond = Condition::all()
            .add(stock_lot::Column::ProductId.eq(key.product_id))
            .add(stock_lot::Column::ShopId.eq(key.shop_id))
            .add(stock_lot::Column::WarehouseId.eq(key.warehouse_id))
            .add(stock_lot::Column::Quantity.gt(0))
            .add(
                Condition::any()
                    .add(stock_lot::Column::ExpiryDate.is_null())
                    .add(stock_lot::Column::ExpiryDate.gte(as_of)),
            );
        if let Some(category_id) = key.category_id {
            cond = cond.add(stock_lot::Column::CategoryId.eq(category_id));
        }
        cond
    }

    /// Sum of usable quantity in the pool as of today
    #[instrument(skip(self))]
    pub async fn query_available(&self, key: StockKey) -> Result<i32, ServiceError> {
        self.available_in(&*self.db, key, self.today()).await
    }

    pub async fn available_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: StockKey,
        as_of: NaiveDate,
    ) -> Result<i32, ServiceError> {
        let lots = stock_lot::Entity::find()
            .filter(Self::pool_condition(&key, as_of))
            .all(conn)
            .await?;
        let total: i64 = lots.iter().map(|lot| i64::from(lot.quantity.max(0))).sum();
        Ok(i32::try_from(total).unwrap_or(i32::MAX))
    }

    async fn eligible_lots<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: &StockKey,
        as_of: NaiveDate,
    ) -> Result<Vec<LotLevel>, ServiceError> {
        let mut query = stock_lot::Entity::find()
            .filter(Self::pool_condition(key, as_of))
            .order_by_asc(stock_lot::Column::Id);
        if conn.get_database_backend() == DbBackend::Postgres {
            query = query.lock_exclusive();
        }
        let mut lots: Vec<LotLevel> = query.all(conn).await?.iter().map(LotLevel::from).collect();
        sort_fefo(&mut lots);
        Ok(lots)
    }

    /// Deducts `requested` units from the pool, earliest expiry first.
    ///
    /// Runs in its own nested transaction: either every deduction lands or none
    /// does, and the whole allocation still rolls back with an enclosing
    /// transaction.
    #[instrument(skip(self, conn), fields(product_id = key.product_id, warehouse_id = key.warehouse_id))]
    pub async fn allocate<C>(
        &self,
        conn: &C,
        key: StockKey,
        requested: i32,
        actor: i32,
    ) -> Result<Vec<LotDeduction>, ServiceError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        if requested <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }

        let txn = conn.begin().await?;
        match self.allocate_in(&txn, &key, requested, actor).await {
            Ok(deductions) => {
                txn.commit().await?;
                Ok(deductions)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "Allocation rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn allocate_in<C: ConnectionTrait>(
        &self,
        txn: &C,
        key: &StockKey,
        requested: i32,
        actor: i32,
    ) -> Result<Vec<LotDeduction>, ServiceError> {
        let as_of = self.today();
        let lots = self.eligible_lots(txn, key, as_of).await?;

        let insufficient = |shortfall: i32| {
            counter!("shopstock.stock.insufficient", 1);
            ServiceError::InsufficientStock {
                product_id: key.product_id,
                requested,
                shortfall,
            }
        };

        // Reject early when the snapshot already cannot cover the request.
        if let Err(Shortfall(shortfall)) = plan_fefo(&lots, requested, as_of) {
            return Err(insufficient(shortfall));
        }

        let mut remaining = requested;
        let mut deductions = Vec::new();
        for lot in lots {
            if remaining == 0 {
                break;
            }
            let mut observed = lot.quantity;
            let mut attempts = 0;
            while observed > 0 {
                let take = remaining.min(observed);
                let result = stock_lot::Entity::update_many()
                    .col_expr(stock_lot::Column::Quantity, Expr::value(observed - take))
                    .col_expr(stock_lot::Column::UpdatedBy, Expr::value(Some(actor)))
                    .col_expr(stock_lot::Column::UpdatedAt, Expr::value(Some(Utc::now())))
                    .filter(stock_lot::Column::Id.eq(lot.id))
                    .filter(stock_lot::Column::Quantity.eq(observed))
                    .exec(txn)
                    .await?;

                if result.rows_affected == 1 {
                    deductions.push(LotDeduction {
                        lot_id: lot.id,
                        category_id: lot.category_id,
                        quantity: take,
                    });
                    remaining -= take;
                    break;
                }

                // Somebody else moved this lot between our read and write.
                attempts += 1;
                counter!("shopstock.stock.allocation_retries", 1);
                if attempts >= self.max_retries {
                    warn!(lot_id = lot.id, attempts, "Giving up on contended lot");
                    return Err(ServiceError::Busy(format!(
                        "stock lot {} is under heavy contention",
                        lot.id
                    )));
                }
                observed = stock_lot::Entity::find_by_id(lot.id)
                    .one(txn)
                    .await?
                    .map_or(0, |fresh| fresh.quantity);
            }
        }

        if remaining > 0 {
            return Err(insufficient(remaining));
        }

        Ok(deductions)
    }

    /// Puts `quantity` units back on a lot
    #[instrument(skip(self, conn))]
    pub async fn release<C: ConnectionTrait>(
        &self,
        conn: &C,
        lot_id: i32,
        quantity: i32,
        actor: i32,
    ) -> Result<stock_lot::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }

        let result = stock_lot::Entity::update_many()
            .col_expr(
                stock_lot::Column::Quantity,
                Expr::col(stock_lot::Column::Quantity).add(quantity),
            )
            .col_expr(stock_lot::Column::UpdatedBy, Expr::value(Some(actor)))
            .col_expr(stock_lot::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(stock_lot::Column::Id.eq(lot_id))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("stock lot {}", lot_id)));
        }

        stock_lot::Entity::find_by_id(lot_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("stock lot {}", lot_id)))
    }

    /// Stock intake: credits the matching lot or opens a new one
    #[instrument(skip(self, requester, request), fields(user_id = requester.user_id))]
    pub async fn receive(
        &self,
        requester: &Requester,
        request: ReceiveStockRequest,
    ) -> Result<stock_lot::Model, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;

        let warehouse = warehouse::Entity::find_by_id(request.warehouse_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::WarehouseNotFound(request.warehouse_id))?;
        requester.ensure_shop_access(warehouse.shop_id)?;

        product::Entity::find_by_id(request.product_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::ProductNotFound(request.product_id))?;

        let category = category::Entity::find_by_id(request.category_id)
            .one(&txn)
            .await?
            .filter(|c| c.warehouse_id == warehouse.id)
            .ok_or(ServiceError::CategoryNotFound(request.category_id))?;

        let existing = stock_lot::Entity::find()
            .filter(stock_lot::Column::ProductId.eq(request.product_id))
            .filter(stock_lot::Column::CategoryId.eq(category.id))
            .filter(stock_lot::Column::WarehouseId.eq(warehouse.id))
            .filter(stock_lot::Column::ShopId.eq(warehouse.shop_id))
            .filter(match request.image_id {
                Some(image_id) => stock_lot::Column::ImageId.eq(image_id),
                None => stock_lot::Column::ImageId.is_null(),
            })
            .filter(match request.expiry_date {
                Some(expiry) => stock_lot::Column::ExpiryDate.eq(expiry),
                None => stock_lot::Column::ExpiryDate.is_null(),
            })
            .order_by_asc(stock_lot::Column::Id)
            .one(&txn)
            .await?;

        let lot = match existing {
            Some(lot) => {
                self.release(&txn, lot.id, request.quantity, requester.user_id)
                    .await?
            }
            None => {
                stock_lot::ActiveModel {
                    product_id: Set(request.product_id),
                    category_id: Set(category.id),
                    warehouse_id: Set(warehouse.id),
                    shop_id: Set(warehouse.shop_id),
                    image_id: Set(request.image_id),
                    quantity: Set(request.quantity),
                    expiry_date: Set(request.expiry_date),
                    created_by: Set(Some(requester.user_id)),
                    updated_by: Set(Some(requester.user_id)),
                    created_at: Set(Utc::now()),
                    updated_at: Set(None),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };

        txn.commit().await?;

        info!(lot_id = lot.id, quantity = request.quantity, "Stock received");
        self.event_sender
            .send_or_log(Event::StockReceived {
                lot_id: lot.id,
                product_id: lot.product_id,
                warehouse_id: lot.warehouse_id,
                quantity: request.quantity,
            });

        Ok(lot)
    }

    /// Overwrites a lot's quantity after a physical count
    #[instrument(skip(self, requester), fields(user_id = requester.user_id))]
    pub async fn set_quantity(
        &self,
        requester: &Requester,
        lot_id: i32,
        quantity: i32,
    ) -> Result<stock_lot::Model, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "quantity cannot be negative".to_string(),
            ));
        }

        let lot = stock_lot::Entity::find_by_id(lot_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("stock lot {}", lot_id)))?;
        requester.ensure_shop_access(lot.shop_id)?;

        let old_quantity = lot.quantity;
        let mut active: stock_lot::ActiveModel = lot.into();
        active.quantity = Set(quantity);
        active.updated_by = Set(Some(requester.user_id));
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::StockAdjusted {
                lot_id,
                old_quantity,
                new_quantity: quantity,
            });

        Ok(updated)
    }

    /// Deletes an emptied lot
    #[instrument(skip(self, requester), fields(user_id = requester.user_id))]
    pub async fn delete_lot(&self, requester: &Requester, lot_id: i32) -> Result<(), ServiceError> {
        let lot = stock_lot::Entity::find_by_id(lot_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("stock lot {}", lot_id)))?;
        requester.ensure_shop_access(lot.shop_id)?;

        // Guard against a concurrent credit landing between read and delete.
        let result = stock_lot::Entity::delete_many()
            .filter(stock_lot::Column::Id.eq(lot_id))
            .filter(stock_lot::Column::Quantity.eq(0))
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ValidationError(format!(
                "stock lot {} still holds stock and cannot be deleted",
                lot_id
            )));
        }

        info!(lot_id, "Stock lot deleted");
        Ok(())
    }

    /// Removes stock from a (product, warehouse) pool and records why
    #[instrument(skip(self, requester, request), fields(user_id = requester.user_id))]
    pub async fn stock_out(
        &self,
        requester: &Requester,
        request: StockOutRequest,
    ) -> Result<StockOutResult, ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;

        let warehouse = warehouse::Entity::find_by_id(request.warehouse_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::WarehouseNotFound(request.warehouse_id))?;
        requester.ensure_shop_access(warehouse.shop_id)?;

        product::Entity::find_by_id(request.product_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::ProductNotFound(request.product_id))?;

        let key = StockKey {
            product_id: request.product_id,
            shop_id: warehouse.shop_id,
            warehouse_id: warehouse.id,
            category_id: None,
        };
        let deductions = self
            .allocate(&txn, key, request.quantity, requester.user_id)
            .await?;

        let record = stock_out::ActiveModel {
            product_id: Set(request.product_id),
            warehouse_id: Set(warehouse.id),
            shop_id: Set(warehouse.shop_id),
            quantity: Set(request.quantity),
            reason: Set(request.reason.clone()),
            created_by: Set(requester.user_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::StockOut {
                stock_out_id: record.id,
                product_id: record.product_id,
                warehouse_id: record.warehouse_id,
                quantity: record.quantity,
            });

        Ok(StockOutResult {
            stock_out: record,
            deductions,
        })
    }

    /// Lots visible to the requester, earliest expiry first
    #[instrument(skip(self, requester), fields(user_id = requester.user_id))]
    pub async fn list_lots(
        &self,
        requester: &Requester,
        query: StockLotQuery,
    ) -> Result<StockLotPage, ServiceError> {
        query.validate()?;
        let today = self.today();

        let mut condition = Condition::all();
        if let Some(shop_id) = query.shop_id {
            requester.ensure_shop_access(shop_id)?;
            condition = condition.add(stock_lot::Column::ShopId.eq(shop_id));
        }
        if let Some(shop_id) = requester.shop_scope() {
            condition = condition.add(stock_lot::Column::ShopId.eq(shop_id));
        }
        if let Some(warehouse_id) = query.warehouse_id {
            condition = condition.add(stock_lot::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(category_id) = query.category_id {
            condition = condition.add(stock_lot::Column::CategoryId.eq(category_id));
        }
        if let Some(product_id) = query.product_id {
            condition = condition.add(stock_lot::Column::ProductId.eq(product_id));
        }
        if !query.include_expired {
            condition = condition.add(
                Condition::any()
                    .add(stock_lot::Column::ExpiryDate.is_null())
                    .add(stock_lot::Column::ExpiryDate.gte(today)),
            );
        }
        if query.in_stock_only {
            condition = condition.add(stock_lot::Column::Quantity.gt(0));
        }

        let limit = query
            .limit
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);
        let page = query.page.unwrap_or(1).max(1);

        let paginator = stock_lot::Entity::find()
            .filter(condition)
            .order_by(Expr::col(stock_lot::Column::ExpiryDate).is_null(), Order::Asc)
            .order_by_asc(stock_lot::Column::ExpiryDate)
            .order_by_asc(stock_lot::Column::Id)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let lots = paginator.fetch_page(page - 1).await?;

        let product_ids: BTreeSet<i32> = lots.iter().map(|lot| lot.product_id).collect();
        let category_ids: BTreeSet<i32> = lots.iter().map(|lot| lot.category_id).collect();
        let products: HashMap<i32, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let categories: HashMap<i32, String> = category::Entity::find()
            .filter(category::Column::Id.is_in(category_ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let items = lots
            .into_iter()
            .map(|lot| {
                let product = products.get(&lot.product_id);
                StockLotListing {
                    id: lot.id,
                    product_id: lot.product_id,
                    product_code: product.map(|p| p.code.clone()),
                    product_name: product.map(|p| p.name.clone()),
                    category_id: lot.category_id,
                    category_name: categories.get(&lot.category_id).cloned(),
                    warehouse_id: lot.warehouse_id,
                    shop_id: lot.shop_id,
                    image_id: lot.image_id,
                    quantity: lot.quantity,
                    expiry_date: lot.expiry_date,
                    expired: lot.expiry_date.map_or(false, |d| d < today),
                    created_at: lot.created_at,
                    updated_at: lot.updated_at,
                }
            })
            .collect();

        Ok(StockLotPage {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Orderable stock per product in one warehouse, sorted by product name
    #[instrument(skip(self, requester), fields(user_id = requester.user_id))]
    pub async fn product_totals(
        &self,
        requester: &Requester,
        query: StockTotalsQuery,
    ) -> Result<Vec<ProductStockTotal>, ServiceError> {
        query.validate()?;

        let warehouse = warehouse::Entity::find_by_id(query.warehouse_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::WarehouseNotFound(query.warehouse_id))?;
        requester.ensure_shop_access(warehouse.shop_id)?;

        let mut lots = stock_lot::Entity::find()
            .filter(stock_lot::Column::WarehouseId.eq(warehouse.id))
            .filter(stock_lot::Column::ShopId.eq(warehouse.shop_id))
            .filter(stock_lot::Column::Quantity.gt(0));
        if let Some(category_id) = query.category_id {
            lots = lots.filter(stock_lot::Column::CategoryId.eq(category_id));
        }
        let lots = lots.all(&*self.db).await?;
        let tallies = tally_by_product(&lots, self.today());

        let products = product::Entity::find()
            .filter(product::Column::Id.is_in(tallies.keys().copied()))
            .all(&*self.db)
            .await?;
        let category_names: HashMap<i32, String> = category::Entity::find()
            .filter(category::Column::WarehouseId.eq(warehouse.id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();

        let mut totals: Vec<ProductStockTotal> = products
            .into_iter()
            .filter_map(|product| {
                let tally = tallies.get(&product.id)?;
                let mut names: Vec<String> = tally
                    .category_ids
                    .iter()
                    .filter_map(|id| category_names.get(id).cloned())
                    .collect();
                names.sort();
                Some(ProductStockTotal {
                    product_id: product.id,
                    product_code: product.code,
                    product_name: product.name,
                    available: tally.available,
                    lot_count: tally.lot_count,
                    category_names: names,
                    nearest_expiry: tally.nearest_expiry,
                })
            })
            .collect();
        totals.sort_by(|a, b| {
            a.product_name
                .cmp(&b.product_name)
                .then(a.product_id.cmp(&b.product_id))
        });
        Ok(totals)
    }
}
