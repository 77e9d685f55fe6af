//! dhcpd configuration for network gateways: pool validation, dynamic range
//! allocation around static reservations, and rendering.

pub mod config;
pub mod pools;
pub mod ranges;

pub use config::DhcpConfigWriter;
pub use pools::{is_secondary, validate_pool};
pub use ranges::pool_ranges;
