use anyhow::Result;

/// The engine's poll and tick tasks are cooperative and share a single thread.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
