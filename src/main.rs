use anyhow::Result;
use tracing::error;
use zenbox::{cli::run_cli, utils::runtime::single_thread_runtime};

fn main() -> Result<()> {
    let runtime = single_thread_runtime()?;
    let result = runtime.block_on(async {
        run_cli().await.inspect_err(|e| {
            error!("Error running cli {e:?}");
        })
    });
    // A request to a hung service would otherwise keep the process alive on exit.
    runtime.shutdown_background();
    result
}
