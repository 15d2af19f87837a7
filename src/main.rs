/// Entry point of the cgroup-limits reporter.
///
/// Prints the container limits that apply to this process. Logging is
/// configured through `RUST_LOG`.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug cargo run -- --json
/// CONTAINER_REPORT_INTERVAL_SECS=5 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    cgroup_limits::run().await
}
