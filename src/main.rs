use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use marquee::config::{has_flag, Config, USAGE, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let config = Config::from_args(&args)?;
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "startup", "marquee {} starting: RUST_LOG='{}', port={}, env={}", VERSION, rust_log, config.port, config.env);

    marquee::server::run(config).await
}
