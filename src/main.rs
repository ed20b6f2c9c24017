use futurebot::{Config, run};

fn main() -> anyhow::Result<()> {
    // Only the runtime size is needed here; `run` loads the config again
    // after the command line is parsed.
    let worker_threads = Config::load().map_or(0, |c| c.general.worker_threads);

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();

    if worker_threads > 0 {
        builder.worker_threads(worker_threads);
    }

    let runtime = builder.build()?;
    runtime.block_on(run())
}
