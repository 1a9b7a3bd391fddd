//! Port traits: the boundaries between the canvas core and the outside world.

pub mod config_port;
pub mod market_data_port;
pub mod order_execution_port;
