//! sheetcol - spreadsheet column collector bot.

use anyhow::Result;
use sheetcol_channels::start;
use sheetcol_common::config::{config_path, Config};
use sheetcol_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_logging(&config.observability);

    tracing::info!("sheetcol v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(path = %config_path().display(), "Configuration file");

    start(&config).await
}
