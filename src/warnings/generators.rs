use chrono::Utc;

use super::{Alert, AlertQueue, Severity};
use crate::store::{ResourceStore, RetryPolicy, with_retry};

pub const DEGRADED_SOURCE: &str = "scheduled.degraded_resources";
const DEGRADED_DEDUP: &str = "degraded_resources";

/// Check for resources without an owner.
///
/// Raises one deduplicated alert while any exist, and clears it once the
/// backlog has been claimed. Returns the count seen, or `None` if the store
/// could not be reached.
pub async fn check_degraded_resources<S: ResourceStore>(
    store: &S,
    alerts: &AlertQueue,
    retry: &RetryPolicy,
) -> Option<i64> {
    let count = match with_retry(retry, "count degraded resources", || store.count_degraded()).await {
        Ok(n) => n,
        Err(e) => {
            log::error!("Generator check_degraded_resources query failed: {e}");
            return None;
        }
    };

    if count == 0 {
        if alerts.resolve(DEGRADED_SOURCE) > 0 {
            log::info!("All degraded resources have been claimed");
        }
        return Some(0);
    }

    if alerts.exists(DEGRADED_SOURCE, DEGRADED_DEDUP) {
        return Some(count);
    }

    alerts.raise(Alert {
        id: crate::store::new_id("alr"),
        severity: Severity::Medium,
        category: "data_integrity".to_string(),
        source_action: DEGRADED_SOURCE.to_string(),
        message: format!("{count} resource(s) have no owner and are restricted to ownership assignment"),
        dedup: Some(DEGRADED_DEDUP.to_string()),
        resource: None,
        actor: None,
        raised_at: Utc::now(),
    });
    Some(count)
}
