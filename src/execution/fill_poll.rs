use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::exchange::VenueApi;
use crate::execution::StrategyInstance;
use crate::models::Contract;

const POLL_BASE_DELAY: Duration = Duration::from_secs(2);
const POLL_MAX_DELAY: Duration = Duration::from_secs(30);
const POLL_MAX_ATTEMPTS: u32 = 10;

/// Poll an entry order until it fills, with capped exponential backoff
///
/// Backfills the owning trade's entry price/quantity on fill. After
/// `POLL_MAX_ATTEMPTS` unsuccessful polls the task gives up and surfaces a
/// terminal "poll abandoned" event on the instance's log stream. The
/// `shutdown` watch cancels the poller between attempts.
pub fn spawn_fill_poll(
    api: Arc<dyn VenueApi>,
    contract: Contract,
    instance: Arc<Mutex<StrategyInstance>>,
    order_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut delay = POLL_BASE_DELAY;

        for attempt in 1..=POLL_MAX_ATTEMPTS {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                tracing::debug!("fill poll for order {} cancelled by shutdown", order_id);
                return;
            }

            match api.order_status(&contract, &order_id).await {
                Some(status) if status.is_filled() => {
                    let mut inst = instance.lock().unwrap();
                    if inst.backfill_fill(&order_id, &status) {
                        inst.events.append(format!(
                            "entry order {} on {} filled at {}",
                            order_id, contract.symbol, status.avg_price
                        ));
                    }
                    return;
                }
                Some(status) => {
                    tracing::info!(
                        "{} order {} status: {} (attempt {})",
                        contract.venue,
                        order_id,
                        status.status,
                        attempt
                    );
                }
                None => {
                    tracing::warn!(
                        "order status poll failed for {} on {} (attempt {})",
                        order_id,
                        contract.symbol,
                        attempt
                    );
                }
            }

            delay = (delay * 2).min(POLL_MAX_DELAY);
        }

        let inst = instance.lock().unwrap();
        inst.events.append(format!(
            "poll abandoned for order {} on {} after {} attempts; entry fill unconfirmed",
            order_id, contract.symbol, POLL_MAX_ATTEMPTS
        ));
    })
}
