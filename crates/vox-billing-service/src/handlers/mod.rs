//! API handlers.

pub mod accounts;
pub mod credits;
pub mod health;
pub mod invoices;
pub mod purchases;
pub mod usage;
