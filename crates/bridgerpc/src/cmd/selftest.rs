use std::time::{Duration, Instant};

use bridgerpc_peer::{BridgeRpc, Router};
use bridgerpc_transport::DuplexTransport;
use tracing::warn;

use crate::cmd::serve::echo_router;
use crate::cmd::SelftestArgs;
use crate::exit::{CliError, CliResult, HEALTH_CHECK_FAILED, SUCCESS, USAGE};
use crate::output::{print_selftest, OutputFormat, SelftestOutput};

const SELFTEST_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn run(args: SelftestArgs, format: OutputFormat) -> CliResult<i32> {
    if args.chunk_size == Some(0) {
        return Err(CliError::new(USAGE, "--chunk-size must be greater than zero"));
    }
    let report = loopback(args.count, args.chunk_size).await;
    print_selftest(&report, format);
    Ok(if report.ok() {
        SUCCESS
    } else {
        HEALTH_CHECK_FAILED
    })
}

async fn loopback(count: usize, chunk_size: Option<usize>) -> SelftestOutput {
    let started = Instant::now();
    let (client_end, server_end) = DuplexTransport::pair_with_chunk_size(chunk_size);
    let server = BridgeRpc::new(server_end, echo_router());
    let client = BridgeRpc::new(client_end, Router::new());

    let mut passed = 0;
    for n in 0..count {
        let body = format!("selftest payload {n} {}", "x".repeat(n));
        match client.request("/echo", body.clone()).await {
            Ok(response) if response.is_success() && response.body == body.as_bytes() => {
                passed += 1;
            }
            Ok(response) => warn!(n, status = %response.status, "echo mismatch"),
            Err(err) => warn!(n, error = %err, "echo failed"),
        }
    }
    let probe = client.probe_with_timeout(SELFTEST_PROBE_TIMEOUT).await;

    let _ = client.shutdown().await;
    drop(server);

    SelftestOutput {
        requests: count,
        passed,
        chunk_size,
        probe,
        elapsed_ms: started.elapsed().as_millis(),
    }
}
