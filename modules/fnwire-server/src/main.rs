use anyhow::{anyhow, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fnwire_invoker::InvokerConfig;

mod functions;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("fnwire=info".parse()?);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = InvokerConfig::from_env()?;
    config.log_summary();

    let function = functions::lookup(&config.target).ok_or_else(|| {
        anyhow!(
            "unknown FUNCTION_TARGET {:?}, expected one of: {}",
            config.target,
            functions::TARGETS.join(", ")
        )
    })?;
    info!(function_target = %config.target, signature = %function.signature(), "loaded function");

    fnwire_invoker::serve(&config, function).await
}
