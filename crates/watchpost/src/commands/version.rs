pub fn run() -> anyhow::Result<()> {
    println!("watchpost {}", env!("CARGO_PKG_VERSION"));
    println!("Perception-to-decision pipeline for site security monitoring");
    Ok(())
}
