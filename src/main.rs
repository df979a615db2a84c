#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flowrunner_lib::run().await
}
