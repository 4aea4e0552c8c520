use super::Context;
use watchpost_cases::CaseStore;

pub fn run() -> anyhow::Result<()> {
    let ctx = Context::load()?;
    let cases = CaseStore::new(&ctx.paths)?;

    let output = serde_json::json!({
        "home": ctx.paths.root,
        "cases": cases.stats()?,
        "retriever": ctx.retriever().stats(),
        "models": {
            "vision": ctx.config.vision_model,
            "reasoning": ctx.config.reasoning_model,
            "embedding": ctx.config.embedding_model,
        },
        "api_key_configured": ctx.config.api_key.is_some(),
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
