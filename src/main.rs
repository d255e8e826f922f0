use std::path::PathBuf;

const DATA_DIR_ENV: &str = "MINI_SELLER_CONSOLE_DATA_DIR";
const DEFAULT_DATA_DIR: &str = ".mini-seller-console";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(DATA_DIR_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    mini_seller_console_lib::run(data_dir)
        .await
        .map_err(anyhow::Error::msg)
}
