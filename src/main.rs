#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vm_drs::cli::run().await
}
