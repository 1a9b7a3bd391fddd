//! Market data port trait.

use crate::domain::error::CanvasError;
use crate::domain::order::{Security, TimeAndSale};

pub trait MarketDataPort {
    /// Every time and sale print for `security`, oldest first.
    fn load_time_and_sales(&self, security: &Security) -> Result<Vec<TimeAndSale>, CanvasError>;
}
