//! whois42d - WHOIS server for the dn42 registry.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    whois42_cli::run().await
}
