//! Hatago Hub Bridge — stdio-to-HTTP proxy.
//!
//! Reads JSON-RPC messages from stdin, forwards them to a running hub's
//! HTTP gateway, and writes responses to stdout. This lets stdio-only MCP
//! clients talk to a hub that only one process keeps running.
//!
//! Usage:
//!   hatago-hub-bridge [--port <PORT>]

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

struct Args {
    port: u16,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut port: u16 = 3100;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--port" => {
                let val = args.next().ok_or("--port requires a value")?;
                port = val.parse().map_err(|_| format!("invalid port: {}", val))?;
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
    }

    Ok(Args { port })
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("hatago-hub-bridge: {}", e);
            eprintln!("Usage: hatago-hub-bridge [--port <PORT>]");
            return std::process::ExitCode::from(1);
        }
    };

    let url = format!("http://127.0.0.1:{}/", args.port);
    let client = reqwest::Client::new();
    let mut session_id: Option<String> = None;

    eprintln!("hatago-hub-bridge: proxying stdio <-> {}", url);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Err(e) = handle_line(&client, &url, &line, &mut stdout, &mut session_id).await {
                            eprintln!("hatago-hub-bridge: error: {}", e);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        eprintln!("hatago-hub-bridge: stdin error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("hatago-hub-bridge: interrupted");
                break;
            }
        }
    }

    if let Some(id) = &session_id {
        eprintln!("hatago-hub-bridge: shutting down, sending DELETE for session cleanup");
        let _ = client.delete(&url).header("mcp-session-id", id).send().await;
    }

    std::process::ExitCode::SUCCESS
}

async fn handle_line(
    client: &reqwest::Client,
    url: &str,
    line: &str,
    stdout: &mut tokio::io::Stdout,
    session_id: &mut Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let value: serde_json::Value = serde_json::from_str(line)?;

    let mut request = client.post(url).header("Content-Type", "application/json");
    if let Some(id) = session_id.as_ref() {
        request = request.header("mcp-session-id", id);
    }

    let response = match request.json(&value).send().await {
        Ok(r) => r,
        Err(e) => {
            if let Some(id) = value.get("id") {
                write_error(stdout, id.clone(), format!("hub unreachable: {}", e)).await?;
            }
            return Ok(());
        }
    };

    if let Some(id) = response.headers().get("mcp-session-id").and_then(|v| v.to_str().ok()) {
        *session_id = Some(id.to_string());
    }

    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
        if let Some(id) = value.get("id") {
            let text = String::from_utf8_lossy(&body).into_owned();
            write_error(stdout, id.clone(), format!("HTTP {}: {}", status.as_u16(), text)).await?;
        }
        return Ok(());
    }

    // The hub returns a literal `null` body for notifications.
    if body.as_ref() == b"null" {
        return Ok(());
    }

    stdout.write_all(&body).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;

    Ok(())
}

async fn write_error(
    stdout: &mut tokio::io::Stdout,
    id: serde_json::Value,
    message: String,
) -> std::io::Result<()> {
    let err = serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": -32000, "message": message },
    });
    let mut out = serde_json::to_vec(&err).unwrap_or_default();
    out.push(b'\n');
    stdout.write_all(&out).await?;
    stdout.flush().await
}
