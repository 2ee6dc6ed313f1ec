use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bridgerpc_peer::{BridgeRpc, Router, UnaryRequest};
use bridgerpc_transport::UnixSocketListener;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::cmd::ServeArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

/// Router served by `bridgerpc serve`: `/echo` returns the request body.
pub fn echo_router() -> Router {
    let mut router = Router::new();
    router.add_unary("/echo", |req: UnaryRequest| async move { Ok(req.body) });
    router
}

pub async fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let listener =
        UnixSocketListener::bind(&args.socket).map_err(|err| transport_error("bind failed", err))?;
    info!(socket = %args.socket.display(), "serving");

    let closed = Arc::new(AtomicUsize::new(0));
    let drained = Arc::new(Notify::new());
    let mut accepted = 0usize;

    loop {
        let transport = tokio::select! {
            accept = listener.accept(), if args.max_connections.is_none_or(|max| accepted < max) => {
                accept.map_err(|err| transport_error("accept failed", err))?
            }
            _ = drained.notified() => break,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        };
        accepted += 1;
        let connection = accepted;
        info!(connection, "connection accepted");

        let token = transport.closed_token();
        let rpc = BridgeRpc::new(transport, echo_router());
        let closed = Arc::clone(&closed);
        let drained = Arc::clone(&drained);
        let limit = args.max_connections;
        tokio::spawn(async move {
            token.cancelled().await;
            if let Err(err) = rpc.shutdown().await {
                debug!(connection, error = %err, "shutdown after disconnect");
            }
            info!(connection, "connection closed");
            let done = closed.fetch_add(1, Ordering::SeqCst) + 1;
            if limit.is_some_and(|max| done >= max) {
                drained.notify_one();
            }
        });
    }

    Ok(SUCCESS)
}
