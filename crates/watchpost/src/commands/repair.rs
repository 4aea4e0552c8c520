use anyhow::Context as _;
use std::io::Read;
use std::path::Path;
use watchpost_repair::recover_with;

pub fn run(file: Option<&Path>, model: &str) -> anyhow::Result<()> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let recovery = recover_with(&raw, model);
    let output = serde_json::json!({
        "stage": format!("{:?}", recovery.stage).to_lowercase(),
        "applied": recovery.applied,
        "value": recovery.value,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
