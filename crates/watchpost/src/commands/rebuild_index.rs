use super::Context;
use watchpost_index::{build_index, embedder_for};

pub fn run() -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let embedder = embedder_for(&ctx.config)?;
    let report = build_index(
        &ctx.paths.kb_source_dir(),
        &ctx.paths.index_path(),
        embedder.as_ref(),
        ctx.build_options(),
    )?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
