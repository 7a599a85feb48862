use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::metrics::ACTIVE_BANS;
use crate::store::AccessStore;

// Background sweep - purges lapsed rate windows and ban records
pub async fn sweep_worker(store: Arc<AccessStore>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval = ?every, "sweep worker started");

    loop {
        ticker.tick().await;

        let report = store.sweep();
        ACTIVE_BANS.set(store.active_bans() as f64);

        if report.rate_windows > 0 || report.ban_records > 0 {
            debug!(
                rate_windows = report.rate_windows,
                ban_records = report.ban_records,
                "sweep removed expired entries"
            );
        }
    }
}
