use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_tenancy_tables::Migration),
            Box::new(m20240101_000002_create_catalog_tables::Migration),
            Box::new(m20240101_000003_create_stock_tables::Migration),
            Box::new(m20240101_000004_create_order_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_tenancy_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_tenancy_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Shops::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Shops::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Shops::Name).string().not_null())
                        .col(ColumnDef::new(Shops::Address).string().null())
                        .col(
                            ColumnDef::new(Shops::Region)
                                .string()
                                .not_null()
                                .default("other"),
                        )
                        .col(
                            ColumnDef::new(Shops::Status)
                                .string()
                                .not_null()
                                .default("active"),
                        )
                        .col(
                            ColumnDef::new(Shops::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Warehouses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Warehouses::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Warehouses::Name).string().not_null())
                        .col(ColumnDef::new(Warehouses::ShopId).integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_warehouses_shop_id")
                                .from(Warehouses::Table, Warehouses::ShopId)
                                .to(Shops::Table, Shops::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_warehouses_shop_id")
                        .table(Warehouses::Table)
                        .col(Warehouses::ShopId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Categories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Categories::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Categories::Name).string().not_null())
                        .col(ColumnDef::new(Categories::WarehouseId).integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_categories_warehouse_id")
                                .from(Categories::Table, Categories::WarehouseId)
                                .to(Warehouses::Table, Warehouses::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Users::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                        .col(ColumnDef::new(Users::Role).string().not_null())
                        .col(ColumnDef::new(Users::ShopId).integer().null())
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_users_shop_id")
                                .from(Users::Table, Users::ShopId)
                                .to(Shops::Table, Shops::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Categories::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Warehouses::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Shops::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Shops {
        Table,
        Id,
        Name,
        Address,
        Region,
        Status,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Warehouses {
        Table,
        Id,
        Name,
        ShopId,
    }

    #[derive(DeriveIden)]
    pub(super) enum Categories {
        Table,
        Id,
        Name,
        WarehouseId,
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Name,
        Email,
        Role,
        ShopId,
        CreatedAt,
    }
}

mod m20240101_000002_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Code).string().not_null().unique_key())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Price).decimal_len(16, 4).not_null())
                        .col(ColumnDef::new(Products::PromoPrice).decimal_len(16, 4).null())
                        .col(ColumnDef::new(Products::Description).text().null())
                        .col(ColumnDef::new(Products::Weight).decimal_len(16, 4).null())
                        .col(ColumnDef::new(Products::Unit).string().null())
                        .col(ColumnDef::new(Products::ExpiryDate).date().null())
                        .col(ColumnDef::new(Products::CreatedBy).integer().null())
                        .col(ColumnDef::new(Products::UpdatedBy).integer().null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductImages::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductImages::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ProductImages::ProductId).integer().not_null())
                        .col(ColumnDef::new(ProductImages::Url).string().not_null())
                        .col(
                            ColumnDef::new(ProductImages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_images_product_id")
                                .from(ProductImages::Table, ProductImages::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Customers::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::Phone).string().not_null().unique_key())
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ProductImages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Code,
        Name,
        Price,
        PromoPrice,
        Description,
        Weight,
        Unit,
        ExpiryDate,
        CreatedBy,
        UpdatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductImages {
        Table,
        Id,
        ProductId,
        Url,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Customers {
        Table,
        Id,
        Name,
        Phone,
        CreatedAt,
    }
}

mod m20240101_000003_create_stock_tables {
    use super::m20240101_000001_create_tenancy_tables::{Categories, Warehouses};
    use super::m20240101_000002_create_catalog_tables::Products;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockLots::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLots::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(StockLots::ProductId).integer().not_null())
                        .col(ColumnDef::new(StockLots::CategoryId).integer().not_null())
                        .col(ColumnDef::new(StockLots::WarehouseId).integer().not_null())
                        .col(ColumnDef::new(StockLots::ShopId).integer().not_null())
                        .col(ColumnDef::new(StockLots::ImageId).integer().null())
                        .col(
                            ColumnDef::new(StockLots::Quantity)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(StockLots::Quantity).gte(0)),
                        )
                        .col(ColumnDef::new(StockLots::ExpiryDate).date().null())
                        .col(ColumnDef::new(StockLots::CreatedBy).integer().null())
                        .col(ColumnDef::new(StockLots::UpdatedBy).integer().null())
                        .col(
                            ColumnDef::new(StockLots::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockLots::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_lots_product_id")
                                .from(StockLots::Table, StockLots::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_lots_category_id")
                                .from(StockLots::Table, StockLots::CategoryId)
                                .to(Categories::Table, Categories::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_lots_warehouse_id")
                                .from(StockLots::Table, StockLots::WarehouseId)
                                .to(Warehouses::Table, Warehouses::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_lots_pool")
                        .table(StockLots::Table)
                        .col(StockLots::ProductId)
                        .col(StockLots::ShopId)
                        .col(StockLots::WarehouseId)
                        .col(StockLots::CategoryId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(StockOuts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockOuts::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(StockOuts::ProductId).integer().not_null())
                        .col(ColumnDef::new(StockOuts::WarehouseId).integer().not_null())
                        .col(ColumnDef::new(StockOuts::ShopId).integer().not_null())
                        .col(ColumnDef::new(StockOuts::Quantity).integer().not_null())
                        .col(ColumnDef::new(StockOuts::Reason).string().null())
                        .col(ColumnDef::new(StockOuts::CreatedBy).integer().not_null())
                        .col(
                            ColumnDef::new(StockOuts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockOuts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockLots::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockLots {
        Table,
        Id,
        ProductId,
        CategoryId,
        WarehouseId,
        ShopId,
        ImageId,
        Quantity,
        ExpiryDate,
        CreatedBy,
        UpdatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum StockOuts {
        Table,
        Id,
        ProductId,
        WarehouseId,
        ShopId,
        Quantity,
        Reason,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240101_000004_create_order_tables {
    use super::m20240101_000001_create_tenancy_tables::Shops;
    use super::m20240101_000002_create_catalog_tables::Customers;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Orders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Orders::Code).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerId).integer().not_null())
                        .col(ColumnDef::new(Orders::ShopId).integer().not_null())
                        .col(ColumnDef::new(Orders::WarehouseId).integer().not_null())
                        .col(ColumnDef::new(Orders::Subtotal).decimal_len(16, 4).not_null())
                        .col(ColumnDef::new(Orders::Tax).decimal_len(16, 4).not_null())
                        .col(ColumnDef::new(Orders::TotalPrice).decimal_len(16, 4).not_null())
                        .col(
                            ColumnDef::new(Orders::Status)
                                .string()
                                .not_null()
                                .default("processing"),
                        )
                        .col(ColumnDef::new(Orders::PaymentMethod).string().not_null())
                        .col(ColumnDef::new(Orders::CreatedBy).integer().not_null())
                        .col(ColumnDef::new(Orders::UpdatedBy).integer().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_customer_id")
                                .from(Orders::Table, Orders::CustomerId)
                                .to(Customers::Table, Customers::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_shop_id")
                                .from(Orders::Table, Orders::ShopId)
                                .to(Shops::Table, Shops::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // Backstop for the code generator: duplicates fail the insert.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_code_unique")
                        .table(Orders::Table)
                        .col(Orders::Code)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_shop_id_created_at")
                        .table(Orders::Table)
                        .col(Orders::ShopId)
                        .col(Orders::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderLines::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OrderLines::OrderId).integer().not_null())
                        .col(ColumnDef::new(OrderLines::ProductId).integer().not_null())
                        .col(ColumnDef::new(OrderLines::ProductCode).string().not_null())
                        .col(ColumnDef::new(OrderLines::ProductName).string().not_null())
                        .col(ColumnDef::new(OrderLines::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderLines::UnitPrice).decimal_len(16, 4).not_null())
                        .col(ColumnDef::new(OrderLines::TotalPrice).decimal_len(16, 4).not_null())
                        .col(ColumnDef::new(OrderLines::CategoryId).integer().null())
                        .col(ColumnDef::new(OrderLines::CreatedBy).integer().not_null())
                        .col(
                            ColumnDef::new(OrderLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_lines_order_id")
                                .from(OrderLines::Table, OrderLines::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_lines_order_id")
                        .table(OrderLines::Table)
                        .col(OrderLines::OrderId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderLineAllocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderLineAllocations::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(OrderLineAllocations::OrderLineId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderLineAllocations::StockLotId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderLineAllocations::CategoryId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderLineAllocations::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_line_allocations_order_line_id")
                                .from(
                                    OrderLineAllocations::Table,
                                    OrderLineAllocations::OrderLineId,
                                )
                                .to(OrderLines::Table, OrderLines::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderCodeSequences::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderCodeSequences::ShopId)
                                .integer()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(OrderCodeSequences::NextValue)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderCodeSequences::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderLineAllocations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        Code,
        CustomerId,
        ShopId,
        WarehouseId,
        Subtotal,
        Tax,
        TotalPrice,
        Status,
        PaymentMethod,
        CreatedBy,
        UpdatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderLines {
        Table,
        Id,
        OrderId,
        ProductId,
        ProductCode,
        ProductName,
        Quantity,
        UnitPrice,
        TotalPrice,
        CategoryId,
        CreatedBy,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderLineAllocations {
        Table,
        Id,
        OrderLineId,
        StockLotId,
        CategoryId,
        Quantity,
    }

    #[derive(DeriveIden)]
    enum OrderCodeSequences {
        Table,
        ShopId,
        NextValue,
    }
}
