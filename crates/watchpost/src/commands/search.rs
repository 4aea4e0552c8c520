use super::Context;

pub fn run(query: &str, top_k: Option<usize>, threshold: Option<f32>) -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let top_k = top_k.unwrap_or(ctx.config.top_k);
    let threshold = threshold.unwrap_or(ctx.config.similarity_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        anyhow::bail!("threshold must be within [0, 1]");
    }

    let retriever = ctx.retriever();
    if !retriever.index_path().exists() {
        anyhow::bail!("no knowledge index yet, run `watchpost rebuild-index` first");
    }
    let documents = retriever.query(query, top_k, threshold);

    println!("{}", serde_json::to_string_pretty(&documents)?);
    Ok(())
}
