use std::time::Duration;

use super::AlertQueue;
use crate::store::{ResourceStore, RetryPolicy};

pub fn spawn_scheduler<S>(store: S, alerts: AlertQueue, retry: RetryPolicy, every: Duration)
where
    S: ResourceStore + 'static,
{
    if every.is_zero() {
        log::info!("Degraded-resource scanner disabled");
        return;
    }
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            log::debug!("Running degraded-resource scan");
            if let Some(count) = super::generators::check_degraded_resources(&store, &alerts, &retry).await {
                log::debug!("Degraded-resource scan: {count} unowned");
            }
        }
    });
}
