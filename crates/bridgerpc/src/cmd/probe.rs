use std::time::Instant;

use bridgerpc_peer::{BridgeRpc, Router};
use bridgerpc_transport::UnixSocketListener;

use crate::cmd::{parse_duration, ProbeArgs};
use crate::exit::{transport_error, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_probe, OutputFormat, ProbeOutput};

pub async fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let started = Instant::now();

    let transport = UnixSocketListener::connect(&args.socket)
        .await
        .map_err(|err| transport_error("connect failed", err))?;
    let rpc = BridgeRpc::new(transport, Router::new());
    let alive = rpc.probe_with_timeout(timeout).await;
    if let Err(err) = rpc.shutdown().await {
        tracing::debug!(error = %err, "shutdown after probe");
    }

    print_probe(
        &ProbeOutput {
            socket: args.socket.display().to_string(),
            alive,
            elapsed_ms: started.elapsed().as_millis(),
        },
        format,
    );
    Ok(if alive { SUCCESS } else { TIMEOUT })
}
