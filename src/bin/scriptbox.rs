use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    scriptbox::cli::run().await
}
