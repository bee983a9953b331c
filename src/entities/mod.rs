pub mod category;
pub mod customer;
pub mod order;
pub mod order_code_sequence;
pub mod order_line;
pub mod order_line_allocation;
pub mod product;
pub mod product_image;
pub mod shop;
pub mod stock_lot;
pub mod stock_out;
pub mod user;
pub mod warehouse;
