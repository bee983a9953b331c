// Stock
pub mod stock_ledger;

// Orders
pub mod order_codes;
pub mod order_status;
pub mod orders;
pub mod pricing;

// Customers
pub mod customers;
