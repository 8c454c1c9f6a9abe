mod db;
mod ipc;
mod recap;
mod store;

use std::io::{self, BufRead, Write};

fn main() {
    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "absensid=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let mut state = ipc::AppState::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply with an id we never parsed.
                let msg = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", msg);
                let _ = stdout.flush();
                continue;
            }
        };

        // Reply first, then any subscription events the request triggered.
        for msg in ipc::handle_request(&mut state, req) {
            let _ = writeln!(
                stdout,
                "{}",
                serde_json::to_string(&msg).unwrap_or_else(|_| "{\"ok\":false}".to_string())
            );
        }
        let _ = stdout.flush();
    }
}
