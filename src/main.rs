#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = material_review::run().await {
        eprintln!("material-review fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
