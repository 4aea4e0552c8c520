use super::{runtime, Context};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use watchpost_cases::{index_rebuilder, CaseStore, ReindexScheduler};
use watchpost_core::FrameBuffer;
use watchpost_pipeline::{
    DirectoryFrameSource, IngestSettings, Ingestor, InferenceDispatcher, JsonlNotifier,
    LogNotifier, Notifier, Publisher,
};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub fn run(spool: Option<PathBuf>) -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let spool = spool.unwrap_or_else(|| ctx.paths.spool_dir());
    std::fs::create_dir_all(&spool)?;
    runtime()?.block_on(serve(ctx, spool))
}

async fn serve(ctx: Context, spool: PathBuf) -> anyhow::Result<()> {
    let config = &ctx.config;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let retriever = Arc::new(ctx.retriever());
    let rebuild = index_rebuilder(
        ctx.paths.kb_source_dir(),
        ctx.paths.index_path(),
        Arc::clone(&retriever),
        ctx.build_options(),
    );
    let scheduler = ReindexScheduler::spawn(
        rebuild,
        Arc::clone(&retriever),
        config.reindex_debounce(),
        config.refresh_grace(),
        shutdown_rx.clone(),
    );
    let cases = Arc::new(CaseStore::new(&ctx.paths)?.with_reindex(scheduler.handle()));

    let notifiers: Vec<Arc<dyn Notifier>> = vec![
        Arc::new(LogNotifier),
        Arc::new(JsonlNotifier::new(ctx.paths.alarm_feed())),
    ];
    let (publisher, publisher_task) = Publisher::spawn(notifiers, config.notify_queue);

    let orchestrator = ctx
        .orchestrator(Arc::clone(&retriever))?
        .with_cases(cases)
        .with_publisher(publisher);
    let dispatcher = Arc::new(InferenceDispatcher::new(
        Arc::new(orchestrator),
        config.infer_interval(),
    ));
    let ingestor = Ingestor::new(
        DirectoryFrameSource::new(&spool),
        Arc::new(FrameBuffer::new()),
        Arc::clone(&dispatcher),
        IngestSettings::from_config(config),
    );

    info!(
        spool = %spool.display(),
        vision = %config.vision_model,
        reasoning = %config.reasoning_model,
        "watching for frames, Ctrl-C to stop"
    );
    let ingest_task = tokio::spawn(ingestor.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);

    let stats = ingest_task.await?;
    scheduler.join().await;

    // The publisher drains once the last in-flight cycle drops its handle.
    drop(dispatcher);
    if tokio::time::timeout(DRAIN_TIMEOUT, publisher_task).await.is_err() {
        warn!("notification queue did not drain in time");
    }

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
