use crate::{
    auth::Requester,
    entities::order,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, sync::Arc};
use strum::{Display, EnumIter, EnumString};
use tracing::{info, instrument};
use utoipa::ToSchema;

/// Lifecycle of an order. Moves only forward; `Completed` is terminal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum OrderStatus {
    #[strum(serialize = "processing")]
    Processing,
    #[serde(alias = "ready-for-pickup")]
    #[strum(to_string = "ready_for_pickup", serialize = "ready-for-pickup")]
    ReadyForPickup,
    #[strum(serialize = "completed")]
    Completed,
}

impl OrderStatus {
    fn rank(self) -> u8 {
        match self {
            OrderStatus::Processing => 0,
            OrderStatus::ReadyForPickup => 1,
            OrderStatus::Completed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == OrderStatus::Completed
    }

    /// Forward moves only, including skipping straight to completed
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Parses a status from request input
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        OrderStatus::from_str(raw.trim())
            .map_err(|_| ServiceError::InvalidStatus(raw.to_string()))
    }
}

/// Outcome of a status update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: i32,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl StatusChange {
    /// Same-state requests succeed without touching the row
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, requester), fields(user_id = requester.user_id))]
    pub async fn update_status(
        &self,
        requester: &Requester,
        order_id: i32,
        raw_status: &str,
    ) -> Result<StatusChange, ServiceError> {
        let target = OrderStatus::parse(raw_status)?;

        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))?;
        requester.ensure_shop_access(order.shop_id)?;

        let current = OrderStatus::from_str(&order.status).map_err(|_| {
            ServiceError::InternalError(format!(
                "order {} has unknown stored status '{}'",
                order_id, order.status
            ))
        })?;

        if current == target {
            return Ok(StatusChange {
                order_id,
                from: current,
                to: target,
            });
        }
        if !current.can_transition_to(target) {
            return Err(ServiceError::InvalidTransition {
                from: current.to_string(),
                to: target.to_string(),
            });
        }

        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(target.to_string()))
            .col_expr(order::Column::UpdatedBy, Expr::value(Some(requester.user_id)))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(current.to_string()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // Lost a race with another update; report what the row holds now.
            let latest = order::Entity::find_by_id(order_id)
                .one(&*self.db)
                .await?
                .ok_or(ServiceError::OrderNotFound(order_id))?;
            if OrderStatus::from_str(&latest.status).ok() == Some(target) {
                return Ok(StatusChange {
                    order_id,
                    from: target,
                    to: target,
                });
            }
            return Err(ServiceError::ConcurrencyConflict(format!(
                "order {} status changed concurrently",
                order_id
            )));
        }

        info!(order_id, from = %current, to = %target, "Order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: current.to_string(),
                new_status: target.to_string(),
            });

        Ok(StatusChange {
            order_id,
            from: current,
            to: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case("processing", OrderStatus::Processing)]
    #[case("ready_for_pickup", OrderStatus::ReadyForPickup)]
    #[case("ready-for-pickup", OrderStatus::ReadyForPickup)]
    #[case("COMPLETED", OrderStatus::Completed)]
    fn parses_canonical_and_legacy_spellings(#[case] raw: &str, #[case] expected: OrderStatus) {
        assert_eq!(OrderStatus::parse(raw).unwrap(), expected);
    }

    #[test]
    fn unknown_status_is_invalid() {
        assert!(matches!(
            OrderStatus::parse("shipped"),
            Err(ServiceError::InvalidStatus(s)) if s == "shipped"
        ));
    }

    #[test]
    fn display_uses_canonical_form() {
        assert_eq!(OrderStatus::ReadyForPickup.to_string(), "ready_for_pickup");
        assert_eq!(
            serde_json::to_string(&OrderStatus::ReadyForPickup).unwrap(),
            "\"ready_for_pickup\""
        );
        let legacy: OrderStatus = serde_json::from_str("\"ready-for-pickup\"").unwrap();
        assert_eq!(legacy, OrderStatus::ReadyForPickup);
    }

    #[rstest]
    #[case(OrderStatus::Processing, OrderStatus::ReadyForPickup, true)]
    #[case(OrderStatus::Processing, OrderStatus::Completed, true)]
    #[case(OrderStatus::ReadyForPickup, OrderStatus::Completed, true)]
    #[case(OrderStatus::ReadyForPickup, OrderStatus::Processing, false)]
    #[case(OrderStatus::Completed, OrderStatus::Processing, false)]
    #[case(OrderStatus::Completed, OrderStatus::ReadyForPickup, false)]
    fn transitions_only_move_forward(
        #[case] from: OrderStatus,
        #[case] to: OrderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn nothing_leaves_completed() {
        for next in OrderStatus::iter() {
            assert!(!OrderStatus::Completed.can_transition_to(next));
        }
        assert!(OrderStatus::Completed.is_terminal());
    }
}
