use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product master record. Read-only from the order engine's point of view.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub code: String,

    pub name: String,

    /// List price
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub price: Decimal,

    /// Promotional price, effective only when positive
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub promo_price: Option<Decimal>,

    pub description: Option<String>,

    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub weight: Option<Decimal>,

    pub unit: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub created_by: Option<i32>,
    pub updated_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::product_image::Entity")]
    ProductImage,
    #[sea_orm(has_many = "super::stock_lot::Entity")]
    StockLot,
}

impl Related<super::product_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductImage.def()
    }
}

impl Related<super::stock_lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockLot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
