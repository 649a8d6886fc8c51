pub mod discord;

use crate::source::Item;
use crate::Result;

/// Delivery port for notifications.
///
/// A failed delivery is reported to the caller and never advances any
/// de-duplication state; the scheduler retries the same item next cycle.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, destination_id: &str, item: &Item) -> Result<()>;

    fn name(&self) -> &'static str;
}
