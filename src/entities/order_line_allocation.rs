use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Which lot an order line drew from, and how much
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_line_allocations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub order_line_id: i32,
    pub stock_lot_id: i32,
    pub category_id: i32,
    pub quantity: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order_line::Entity",
        from = "Column::OrderLineId",
        to = "super::order_line::Column::Id",
        on_delete = "Cascade"
    )]
    OrderLine,
}

impl Related<super::order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
