//! Interactive WebSocket client for exercising a running broker by hand.
//! Developer convenience only — no server logic lives here.

use futures_util::{SinkExt, StreamExt};
use std::io::{self, Write};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

fn print_banner() {
    println!("========================================");
    println!(" Relay Broker CLI");
    println!("========================================");
    println!("commands:");
    println!("  subscribe <client_id> <topic> [last_n]");
    println!("  unsubscribe <client_id> <topic>");
    println!("  publish <client_id> <topic> <json payload>");
    println!("  ping");
    println!("  quit");
    println!();
}

#[tokio::main]
async fn main() {
    print_banner();

    let url = std::env::var("RELAY_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:8080/ws/".to_string());
    println!("connecting to {url} ...");

    let (ws_stream, _) = match connect_async(&url).await {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("failed to connect: {e}");
            return;
        }
    };
    println!("connected.");

    let (mut write, mut read) = ws_stream.split();

    tokio::spawn(async move {
        while let Some(Ok(msg)) = read.next().await {
            if let Message::Text(text) = msg {
                println!("<- {text}");
            }
        }
        println!("connection closed by server.");
    });

    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }

        let frame = match build_frame(line) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        if write.send(Message::Text(frame.into())).await.is_err() {
            println!("send failed, connection likely closed.");
            break;
        }
    }
}

fn build_frame(line: &str) -> Result<String, String> {
    let mut head = line.splitn(2, ' ');
    let command = head.next().unwrap_or("");
    let rest = head.next().unwrap_or("").trim();
    let request_id = Uuid::new_v4();

    let value = match command {
        "ping" => serde_json::json!({ "type": "ping", "request_id": request_id }),
        "subscribe" => {
            let mut args = rest.splitn(3, ' ');
            let client_id = args.next().filter(|s| !s.is_empty()).ok_or("usage: subscribe <client_id> <topic> [last_n]")?;
            let topic = args.next().ok_or("usage: subscribe <client_id> <topic> [last_n]")?;
            let last_n = args.next().and_then(|s| s.parse::<usize>().ok());
            serde_json::json!({
                "type": "subscribe",
                "request_id": request_id,
                "topic": topic,
                "client_id": client_id,
                "last_n": last_n,
            })
        }
        "unsubscribe" => {
            let mut args = rest.splitn(2, ' ');
            let client_id = args.next().filter(|s| !s.is_empty()).ok_or("usage: unsubscribe <client_id> <topic>")?;
            let topic = args.next().ok_or("usage: unsubscribe <client_id> <topic>")?;
            serde_json::json!({
                "type": "unsubscribe",
                "request_id": request_id,
                "topic": topic,
                "client_id": client_id,
            })
        }
        "publish" => {
            let mut args = rest.splitn(3, ' ');
            let client_id = args.next().filter(|s| !s.is_empty()).ok_or("usage: publish <client_id> <topic> <json payload>")?;
            let topic = args.next().ok_or("usage: publish <client_id> <topic> <json payload>")?;
            let raw_payload = args.next().ok_or("usage: publish <client_id> <topic> <json payload>")?;
            let payload: serde_json::Value =
                serde_json::from_str(raw_payload).map_err(|e| format!("invalid JSON payload: {e}"))?;
            serde_json::json!({
                "type": "publish",
                "request_id": request_id,
                "topic": topic,
                "client_id": client_id,
                "message": { "payload": payload },
            })
        }
        other => return Err(format!("unknown command '{other}'")),
    };

    serde_json::to_string(&value).map_err(|e| e.to_string())
}
