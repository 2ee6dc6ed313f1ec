use std::io::{IsTerminal, Write};

use bridgerpc_peer::UnaryResponse;
use bridgerpc_protocol::wire;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::convert::{headers_to_json, value_to_json};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize, Debug)]
pub struct CallOutput {
    pub id: String,
    pub path: String,
    pub status: &'static str,
    pub body_size: usize,
    /// Body decoded as msgpack if possible, otherwise a text preview.
    pub body: serde_json::Value,
    pub headers: Option<serde_json::Value>,
    pub trailers: Option<serde_json::Value>,
}

impl CallOutput {
    pub fn new(path: &str, response: &UnaryResponse) -> Self {
        Self {
            id: response.id.to_string(),
            path: path.to_string(),
            status: response.status.as_str(),
            body_size: response.body.len(),
            body: body_preview(&response.body),
            headers: response.headers.as_ref().map(headers_to_json),
            trailers: response.trailers.as_ref().map(headers_to_json),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ProbeOutput {
    pub socket: String,
    pub alive: bool,
    pub elapsed_ms: u128,
}

#[derive(Serialize, Debug)]
pub struct SelftestOutput {
    pub requests: usize,
    pub passed: usize,
    pub chunk_size: Option<usize>,
    pub probe: bool,
    pub elapsed_ms: u128,
}

impl SelftestOutput {
    pub fn ok(&self) -> bool {
        self.probe && self.passed == self.requests
    }
}

pub fn print_call(out: &CallOutput, body: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => print_table(
            vec!["ID", "PATH", "STATUS", "SIZE", "BODY"],
            vec![vec![
                out.id.clone(),
                out.path.clone(),
                out.status.to_string(),
                out.body_size.to_string(),
                compact(&out.body),
            ]],
        ),
        OutputFormat::Pretty => println!(
            "id={} path={} status={} size={} body={}",
            out.id,
            out.path,
            out.status,
            out.body_size,
            compact(&out.body)
        ),
        OutputFormat::Raw => print_raw(body),
    }
}

pub fn print_probe(out: &ProbeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => print_table(
            vec!["SOCKET", "ALIVE", "ELAPSED_MS"],
            vec![vec![
                out.socket.clone(),
                out.alive.to_string(),
                out.elapsed_ms.to_string(),
            ]],
        ),
        OutputFormat::Pretty | OutputFormat::Raw => println!(
            "socket={} alive={} elapsed_ms={}",
            out.socket, out.alive, out.elapsed_ms
        ),
    }
}

pub fn print_selftest(out: &SelftestOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => print_table(
            vec!["REQUESTS", "PASSED", "CHUNK_SIZE", "PROBE", "ELAPSED_MS"],
            vec![vec![
                out.requests.to_string(),
                out.passed.to_string(),
                out.chunk_size
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                out.probe.to_string(),
                out.elapsed_ms.to_string(),
            ]],
        ),
        OutputFormat::Pretty | OutputFormat::Raw => println!(
            "selftest {}: {}/{} requests, probe={}, {} ms",
            if out.ok() { "passed" } else { "failed" },
            out.passed,
            out.requests,
            out.probe,
            out.elapsed_ms
        ),
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn print_table(header: Vec<&str>, rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn body_preview(body: &[u8]) -> serde_json::Value {
    if body.is_empty() {
        return serde_json::Value::Null;
    }
    if let Ok(value) = wire::decode_value(body) {
        return value_to_json(&value);
    }
    match std::str::from_utf8(body) {
        Ok(text) => serde_json::Value::String(text.to_string()),
        Err(_) => serde_json::Value::String(format!("<binary {} bytes>", body.len())),
    }
}

fn compact(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
