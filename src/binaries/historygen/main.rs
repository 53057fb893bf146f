use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use historygen_tsdb::{generate_blocks, instance_fleet, FormatOptions, Opts};
use historygen_utils::time::now_millis;
use serde::Deserialize;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Generate Prometheus TSDB blocks of synthetic history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Parser)]
#[clap(about, version, author)]
struct Config {
    /// Time duration of historical data to generate
    #[clap(short = 'd', long, default_value = "720h", value_parser = humantime::parse_duration)]
    pub duration: Duration,

    /// Output directory to generate TSDB blocks in
    #[clap(short = 'o', long, default_value = "data/")]
    pub output: String,

    /// Number of time series to generate
    #[clap(short = 'c', long, default_value_t = 1)]
    pub count: usize,

    /// Start index for time series instance names
    #[clap(short = 'n', long, default_value_t = 0)]
    pub start_index: usize,

    /// Duration between samples
    #[clap(short = 'i', long, default_value = "15s", value_parser = humantime::parse_duration)]
    pub interval: Duration,

    /// TSDB block length
    #[clap(short = 'b', long, default_value = "2h", value_parser = humantime::parse_duration)]
    pub block_length: Duration,

    /// Number of samples in each chunk
    #[clap(long, default_value_t = 120)]
    pub samples_per_chunk: usize,

    /// Maximum encoded size of a chunk in bytes
    #[clap(long, default_value_t = 16384)]
    pub max_chunk_size: usize,

    /// Seed for block ids, the current time when not set
    #[clap(long)]
    pub seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::parse();
    info!("generate Prometheus TSDB test data, config: {:?}", config);

    let end_time = now_millis();
    let start_time = end_time - config.duration.as_millis() as i64;

    let mut opts = Opts::new(instance_fleet(
        config.count,
        config.start_index,
        start_time,
    ));
    opts.output_dir = Some(PathBuf::from(&config.output));
    opts.start_time = Some(start_time);
    opts.end_time = Some(end_time);
    opts.sample_interval = Some(config.interval);
    opts.block_length = Some(config.block_length);
    opts.seed = config.seed;
    opts.format = FormatOptions {
        samples_per_chunk: config.samples_per_chunk,
        max_chunk_size: config.max_chunk_size,
        ..Default::default()
    };

    let metas = generate_blocks(opts).await?;

    info!(blocks = metas.len(), "TSDB data generation complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use crate::Config;

    #[test]
    fn test_config_defaults() {
        let config = Config::try_parse_from(["historygen"]).unwrap();
        assert_eq!(config.duration, Duration::from_secs(720 * 3600));
        assert_eq!(config.interval, Duration::from_secs(15));
        assert_eq!(config.block_length, Duration::from_secs(2 * 3600));
        assert_eq!(config.samples_per_chunk, 120);
        assert_eq!(config.max_chunk_size, 16384);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_config_durations() {
        let config =
            Config::try_parse_from(["historygen", "-d", "1h 30m", "-i", "500ms", "-b", "1day"])
                .unwrap();
        assert_eq!(config.duration, Duration::from_secs(90 * 60));
        assert_eq!(config.interval, Duration::from_millis(500));
        assert_eq!(config.block_length, Duration::from_secs(24 * 3600));

        assert!(Config::try_parse_from(["historygen", "-i", "15"]).is_err());
        assert!(Config::try_parse_from(["historygen", "-d", "-1h"]).is_err());
    }
}
