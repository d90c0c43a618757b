//! Order line items and order transactions.

mod line;

pub use line::{
    NewOrderLine, OrderLine, OrderTransaction, ensure_user_minimum, submitted_total,
};
pub(crate) use line::validate_pricing;
