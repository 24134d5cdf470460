use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use retrochat_core::RoomService;

/// Background task that purges rows left behind by a room that no longer
/// exists. Runs until `cancel` fires.
pub async fn run_sweep_loop(service: RoomService, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        match service.sweep_orphans().await {
            Ok(0) => debug!("Sweep: nothing orphaned"),
            Ok(_) => {}
            Err(e) => warn!("Sweep error: {}", e),
        }
    }
}
