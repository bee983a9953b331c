use crate::{
    entities::{order, order_code_sequence},
    errors::ServiceError,
};
use metrics::counter;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait, QueryFilter,
    QuerySelect, Set,
};
use tracing::{debug, warn};

/// `{prefix}{shop_id}-{seq:04}`, e.g. `ORD1-0001`
pub fn format_order_code(prefix: &str, shop_id: i32, sequence: i32) -> String {
    format!("{}{}-{:04}", prefix, shop_id, sequence)
}

/// Hands out per-shop order codes inside the caller's transaction
#[derive(Debug, Clone)]
pub struct OrderCodeGenerator {
    prefix: String,
    max_attempts: u32,
}

impl OrderCodeGenerator {
    pub fn new(prefix: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            prefix: prefix.into(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Advances the shop's sequence and returns the first code not already
    /// used by an order. The bump is only durable if the caller commits.
    pub async fn next_code<C: ConnectionTrait>(
        &self,
        conn: &C,
        shop_id: i32,
    ) -> Result<String, ServiceError> {
        order_code_sequence::Entity::insert(order_code_sequence::ActiveModel {
            shop_id: Set(shop_id),
            next_value: Set(0),
        })
        .on_conflict(
            OnConflict::column(order_code_sequence::Column::ShopId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

        for attempt in 1..=self.max_attempts {
            let mut query = order_code_sequence::Entity::find_by_id(shop_id);
            if conn.get_database_backend() == DbBackend::Postgres {
                query = query.lock_exclusive();
            }
            let current = query
                .one(conn)
                .await?
                .ok_or_else(|| {
                    ServiceError::InternalError(format!("order code sequence for shop {} vanished", shop_id))
                })?
                .next_value;
            let next = current + 1;

            let bumped = order_code_sequence::Entity::update_many()
                .col_expr(order_code_sequence::Column::NextValue, Expr::value(next))
                .filter(order_code_sequence::Column::ShopId.eq(shop_id))
                .filter(order_code_sequence::Column::NextValue.eq(current))
                .exec(conn)
                .await?;
            if bumped.rows_affected == 0 {
                debug!(shop_id, attempt, "Order code sequence moved underneath us");
                continue;
            }

            let code = format_order_code(&self.prefix, shop_id, next);
            let taken = order::Entity::find()
                .filter(order::Column::Code.eq(code.as_str()))
                .count(conn)
                .await?
                > 0;
            if taken {
                warn!(shop_id, %code, attempt, "Order code already in use, skipping");
                continue;
            }

            return Ok(code);
        }

        counter!("shopstock.orders.code_exhausted", 1);
        Err(ServiceError::CodeGenerationExhausted(self.max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use sea_orm::{DatabaseConnection, MockDatabase, MockExecResult, Value};
    use std::collections::BTreeMap;

    fn sequence(next_value: i32) -> Vec<order_code_sequence::Model> {
        vec![order_code_sequence::Model {
            shop_id: 1,
            next_value,
        }]
    }

    fn existing_orders(n: i32) -> Vec<BTreeMap<&'static str, Value>> {
        vec![BTreeMap::from([("num_items", Value::Int(Some(n)))])]
    }

    fn rows(affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: affected,
        }
    }

    async fn code_from(conn: DatabaseConnection, max_attempts: u32) -> Result<String, ServiceError> {
        OrderCodeGenerator::new("ORD", max_attempts)
            .next_code(&conn, 1)
            .await
    }

    #[rstest]
    #[case("ORD", 1, 1, "ORD1-0001")]
    #[case("ORD", 12, 345, "ORD12-0345")]
    #[case("SO", 3, 12345, "SO3-12345")]
    fn codes_are_zero_padded_per_shop(
        #[case] prefix: &str,
        #[case] shop_id: i32,
        #[case] sequence: i32,
        #[case] expected: &str,
    ) {
        assert_eq!(format_order_code(prefix, shop_id, sequence), expected);
    }

    #[test]
    fn at_least_one_attempt_is_made() {
        assert_eq!(OrderCodeGenerator::new("ORD", 0).max_attempts, 1);
    }

    #[tokio::test]
    async fn rereads_the_sequence_after_losing_the_bump() {
        let conn = MockDatabase::new(DbBackend::Sqlite)
            .append_query_results([sequence(4)])
            .append_query_results([sequence(5)])
            .append_query_results([existing_orders(0)])
            .append_exec_results([rows(0), rows(0), rows(1)])
            .into_connection();

        assert_eq!(code_from(conn, 3).await.unwrap(), "ORD1-0006");
    }

    #[tokio::test]
    async fn skips_codes_already_held_by_an_order() {
        let conn = MockDatabase::new(DbBackend::Sqlite)
            .append_query_results([sequence(0)])
            .append_query_results([existing_orders(1)])
            .append_query_results([sequence(1)])
            .append_query_results([existing_orders(0)])
            .append_exec_results([rows(1), rows(1), rows(1)])
            .into_connection();

        assert_eq!(code_from(conn, 3).await.unwrap(), "ORD1-0002");
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let conn = MockDatabase::new(DbBackend::Sqlite)
            .append_query_results([sequence(0), sequence(0)])
            .append_exec_results([rows(1), rows(0), rows(0)])
            .into_connection();

        assert!(matches!(
            code_from(conn, 2).await,
            Err(ServiceError::CodeGenerationExhausted(2))
        ));
    }
}
