use anyhow::Result;
use medilink::bootstrap::Launcher;

#[tokio::main]
async fn main() -> Result<()> {
    Launcher::from_env()?.launch().await
}
