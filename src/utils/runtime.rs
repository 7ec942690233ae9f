use anyhow::Result;

/// The tracker is a single logical thread: ticks, watcher notifications and commands interleave
/// on one runtime thread.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
