use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

/// cgroup-limits: detects whether the current process runs inside a
/// resource-constrained container and reports the effective memory, CPU and
/// task limits from the Linux cgroup v1 or v2 filesystem.
///
/// The library is usable from Rust through [`container::OsContainer`] and from
/// C through the functions in [`capi`].
pub mod capi;
pub mod cgroup;
pub mod config;
pub mod container;
pub mod error;
pub mod fsutil;
pub mod host;
pub mod mountinfo;

/// Prints the container limits that apply to this process.
#[derive(Debug, Parser)]
#[command(name = "cgroup-limits", version)]
pub struct Cli {
    #[arg(long, help = "Print the report as one JSON object per line")]
    pub json: bool,
    #[arg(
        long,
        env = "CONTAINER_REPORT_INTERVAL_SECS",
        default_value_t = 0,
        help = "Repeat the report every N seconds; 0 prints it once"
    )]
    pub interval: u64,
}

impl Cli {
    fn interval(&self) -> Option<Duration> {
        (self.interval > 0).then(|| Duration::from_secs(self.interval))
    }
}

fn print_report(container: &container::OsContainer, json: bool) -> Result<(), serde_json::Error> {
    let report = container.report();
    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

/// Runs the cgroup-limits reporter with the process command line.
///
/// See [`run_with`].
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    run_with(Cli::parse()).await
}

/// Detects the container environment using [`config::ContainerConfig::from_env`]
/// and prints a report of all container metrics, as text or, with `--json`, as
/// one JSON object per line. With a positive `--interval`
/// (`CONTAINER_REPORT_INTERVAL_SECS`) the report is repeated at that interval
/// until the process is terminated.
///
/// # Errors
///
/// Returns an error if a report cannot be serialized.
pub async fn run_with(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let json = cli.json;
    let config = config::ContainerConfig::from_env();
    log::debug!("Configuration: {config:?}");

    let container = tokio::task::spawn_blocking(move || container::OsContainer::init(&config))
        .await?;
    let container = Arc::new(container);
    log::info!(
        "Containerized: {} ({})",
        container.is_containerized(),
        container.container_type().unwrap_or("no cgroup subsystem")
    );

    let Some(period) = cli.interval() else {
        print_report(&container, json)?;
        return Ok(());
    };

    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let container = Arc::clone(&container);

        tokio::task::spawn_blocking(move || {
            let before = std::time::Instant::now();
            let result = print_report(&container, json);
            log::trace!("report took {} microseconds", before.elapsed().as_micros());
            result
        })
        .await??;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["cgroup-limits"]).unwrap();
        assert!(!cli.json);
        assert_eq!(cli.interval(), None);
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from(["cgroup-limits", "--json", "--interval", "5"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.interval(), Some(Duration::from_secs(5)));

        let cli = Cli::try_parse_from(["cgroup-limits", "--interval", "0"]).unwrap();
        assert_eq!(cli.interval(), None);
    }

    #[test]
    fn test_cli_rejects_unknown_arguments() {
        assert!(Cli::try_parse_from(["cgroup-limits", "--yaml"]).is_err());
        assert!(Cli::try_parse_from(["cgroup-limits", "--interval", "soon"]).is_err());
    }
}
