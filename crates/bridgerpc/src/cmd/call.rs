use std::fs;

use bridgerpc_peer::{BridgeRpc, Headers, Router, RpcConfig, Value};
use bridgerpc_protocol::wire;
use bridgerpc_transport::UnixSocketListener;
use bytes::Bytes;

use crate::cmd::{parse_duration, CallArgs};
use crate::convert::json_to_value;
use crate::exit::{
    io_error, peer_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, USAGE,
};
use crate::output::{print_call, CallOutput, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let body = resolve_payload(&args)?;
    let headers = parse_headers(&args.headers)?;

    let transport = UnixSocketListener::connect(&args.socket)
        .await
        .map_err(|err| transport_error("connect failed", err))?;
    let config = RpcConfig::default().with_request_timeout(Some(timeout));
    let rpc = BridgeRpc::with_config(transport, Router::new(), config);

    let result = rpc.request_with_headers(&args.path, headers, body).await;
    if let Err(err) = rpc.shutdown().await {
        tracing::debug!(error = %err, "shutdown after call");
    }
    let response = result.map_err(|err| peer_error("call failed", err))?;

    print_call(&CallOutput::new(&args.path, &response), &response.body, format);
    if response.is_success() {
        Ok(SUCCESS)
    } else {
        Ok(FAILURE)
    }
}

fn resolve_payload(args: &CallArgs) -> CliResult<Bytes> {
    if let Some(json) = &args.json {
        let parsed = serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return wire::encode_value(&json_to_value(&parsed))
            .map_err(|err| CliError::new(USAGE, format!("--json could not be encoded: {err}")));
    }
    if let Some(data) = &args.data {
        return Ok(Bytes::from(data.clone()));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map(Bytes::from)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Bytes::new())
}

fn parse_headers(pairs: &[String]) -> CliResult<Option<Headers>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut headers = Headers::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::new(
                USAGE,
                format!("header must be key=value: {pair}"),
            ));
        };
        if key.is_empty() {
            return Err(CliError::new(USAGE, format!("header key is empty: {pair}")));
        }
        headers.insert(key.to_string(), Value::from(value));
    }
    Ok(Some(headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_split_on_first_equals() {
        let headers = parse_headers(&["a=1".into(), "b=x=y".into()])
            .unwrap()
            .unwrap();
        assert_eq!(headers.get("a").and_then(Value::as_str), Some("1"));
        assert_eq!(headers.get("b").and_then(Value::as_str), Some("x=y"));
    }

    #[test]
    fn no_headers_is_none() {
        assert!(parse_headers(&[]).unwrap().is_none());
    }

    #[test]
    fn malformed_header_is_usage_error() {
        assert_eq!(parse_headers(&["novalue".into()]).unwrap_err().code, USAGE);
        assert_eq!(parse_headers(&["=v".into()]).unwrap_err().code, USAGE);
    }
}
