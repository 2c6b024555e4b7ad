#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nlsql_server::start().await
}
