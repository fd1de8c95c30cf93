use swcache_config::{SwcacheConfig, validate};
use swcache_core::master::Master;
use tracing::warn;
use utils::init_tracing;

const CONFIG_FILE: &str = "swcache.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = SwcacheConfig::from_file_or_default(CONFIG_FILE);
    init_tracing(cfg.global.log_level());

    let report = validate(&cfg);
    for w in report.warnings() {
        warn!(target: "swcache::config", "{w}");
    }
    if report.has_errors() {
        anyhow::bail!("invalid {CONFIG_FILE}:\n{}", report.format());
    }
    cfg.print();

    let master = Master::new(cfg);
    master.run().await?;

    Ok(())
}
