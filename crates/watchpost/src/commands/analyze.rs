use super::{runtime, Context};
use anyhow::Context as _;
use std::path::Path;
use std::sync::Arc;
use watchpost_core::Frame;

/// One cycle over a single image. Nothing is persisted.
pub fn run(image: &Path) -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let bytes =
        std::fs::read(image).with_context(|| format!("failed to read {}", image.display()))?;
    let frame = Frame::decode(&bytes, 1)?;

    let retriever = Arc::new(ctx.retriever());
    let orchestrator = ctx.orchestrator(retriever)?;
    let report = runtime()?.block_on(orchestrator.run_cycle(frame))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
