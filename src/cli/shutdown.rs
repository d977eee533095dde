use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Cancels `cancelation` on ctrl-c. Returns early if something else cancels it first.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for ctrl-c {e:?}");
            }
            info!("Received ctrl-c, shutting down");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
