//! End-to-end scenarios driven against a real bound server: WebSocket
//! traffic via `tokio-tungstenite`, admin mutations via `reqwest`.

use futures_util::{SinkExt, StreamExt};
use relay_broker::{BrokerState, Config};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server() -> SocketAddr {
    let mut config = Config::default();
    config.bind_addr = "127.0.0.1:0".parse().unwrap();
    let state = BrokerState::new(config);
    let app = relay_broker::build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    // give the listener a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

async fn connect(addr: SocketAddr) -> WsStream {
    let url = format!("ws://{addr}/ws/");
    let (stream, _) = tokio_tungstenite::connect_async(&url).await.expect("ws connect");
    stream
}

async fn recv_json(stream: &mut WsStream) -> Value {
    loop {
        match stream.next().await.expect("stream closed").expect("ws error") {
            Message::Text(t) => return serde_json::from_str(&t).expect("valid json frame"),
            _ => continue,
        }
    }
}

async fn send_json(stream: &mut WsStream, value: &Value) {
    stream
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

fn subscribe_frame(topic: &str, client_id: &str) -> Value {
    json!({
        "type": "subscribe",
        "request_id": uuid::Uuid::new_v4(),
        "topic": topic,
        "client_id": client_id,
    })
}

fn publish_frame(topic: &str, client_id: &str, payload: Value) -> Value {
    json!({
        "type": "publish",
        "request_id": uuid::Uuid::new_v4(),
        "topic": topic,
        "client_id": client_id,
        "message": { "payload": payload },
    })
}

#[tokio::test]
async fn fan_out_reaches_all_subscribers_excluding_the_publisher() {
    let addr = spawn_server().await;

    let mut publisher = connect(addr).await;
    let _ = recv_json(&mut publisher).await; // connected

    let mut subscribers = Vec::new();
    for name in ["alice", "bob", "charlie"] {
        let mut s = connect(addr).await;
        let _ = recv_json(&mut s).await; // connected
        send_json(&mut s, &subscribe_frame("test-topic", name)).await;
        let subscribed = recv_json(&mut s).await;
        assert_eq!(subscribed["type"], "subscribed");
        assert_eq!(subscribed["client_id"], name);
        assert_eq!(subscribed["status"], "success");
        subscribers.push(s);
    }

    send_json(
        &mut publisher,
        &publish_frame("test-topic", "publisher", json!({ "content": "hi", "sequence": 1 })),
    )
    .await;
    let published = recv_json(&mut publisher).await;
    assert_eq!(published["type"], "published");
    assert_eq!(published["client_id"], "publisher");
    let message_id = published["message_id"].clone();

    for mut s in subscribers {
        let frame = recv_json(&mut s).await;
        assert_eq!(frame["type"], "message");
        assert_eq!(frame["topic"], "test-topic");
        assert_eq!(frame["message"]["id"], message_id);
        assert_eq!(frame["message"]["payload"]["content"], "hi");
        assert_eq!(frame["message"]["payload"]["sequence"], 1);
        assert_eq!(frame["publisher_client_id"], "publisher");
        assert!(frame.get("request_id").is_none());
    }
}

#[tokio::test]
async fn publisher_also_subscribed_does_not_self_deliver() {
    let addr = spawn_server().await;

    let mut p = connect(addr).await;
    let _ = recv_json(&mut p).await; // connected
    send_json(&mut p, &subscribe_frame("t", "p")).await;
    let _ = recv_json(&mut p).await; // subscribed

    let mut q = connect(addr).await;
    let _ = recv_json(&mut q).await;
    send_json(&mut q, &subscribe_frame("t", "q")).await;
    let _ = recv_json(&mut q).await;

    send_json(&mut p, &publish_frame("t", "p", json!({ "v": 1 }))).await;
    let published = recv_json(&mut p).await;
    assert_eq!(published["type"], "published");
    assert!(published.get("delivered_count").is_none());

    let delivered = recv_json(&mut q).await;
    assert_eq!(delivered["type"], "message");
    assert_eq!(delivered["publisher_client_id"], "p");
}

#[tokio::test]
async fn last_n_replays_newest_first_after_the_subscribed_ack() {
    let addr = spawn_server().await;

    let mut publisher = connect(addr).await;
    let _ = recv_json(&mut publisher).await;
    let http = reqwest::Client::new();
    http.post(format!("http://{addr}/topics/create/"))
        .json(&json!({ "name": "weather" }))
        .send()
        .await
        .unwrap();

    for seq in 1..=3 {
        send_json(&mut publisher, &publish_frame("weather", "publisher", json!({ "seq": seq }))).await;
        let _ = recv_json(&mut publisher).await; // published ack
    }

    let mut subscriber = connect(addr).await;
    let _ = recv_json(&mut subscriber).await; // connected
    send_json(
        &mut subscriber,
        &json!({
            "type": "subscribe",
            "request_id": uuid::Uuid::new_v4(),
            "topic": "weather",
            "client_id": "s",
            "last_n": 5,
        }),
    )
    .await;

    let subscribed = recv_json(&mut subscriber).await;
    assert_eq!(subscribed["type"], "subscribed");

    let first = recv_json(&mut subscriber).await;
    assert_eq!(first["type"], "message");
    assert_eq!(first["message"]["payload"]["seq"], 3);
    let second = recv_json(&mut subscriber).await;
    assert_eq!(second["message"]["payload"]["seq"], 2);
    let third = recv_json(&mut subscriber).await;
    assert_eq!(third["message"]["payload"]["seq"], 1);
}

#[tokio::test]
async fn admin_deletion_notifies_live_subscribers_and_evicts_topic() {
    let addr = spawn_server().await;

    let mut subscriber = connect(addr).await;
    let _ = recv_json(&mut subscriber).await;
    send_json(&mut subscriber, &subscribe_frame("goner", "alice")).await;
    let _ = recv_json(&mut subscriber).await; // subscribed

    let http = reqwest::Client::new();
    let resp = http
        .delete(format!("http://{addr}/topics/goner/delete/"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "deleted");
    assert_eq!(body["topic"], "goner");

    let notice = recv_json(&mut subscriber).await;
    assert_eq!(notice["type"], "info");
    assert_eq!(notice["topic"], "goner");
    assert_eq!(notice["msg"], "topic_deleted");

    let mut publisher = connect(addr).await;
    let _ = recv_json(&mut publisher).await;
    send_json(&mut publisher, &publish_frame("goner", "publisher", json!({ "x": 1 }))).await;
    let error = recv_json(&mut publisher).await;
    assert_eq!(error["type"], "error");
}

#[tokio::test]
async fn disconnect_drops_subscriber_count_and_cascades_subscriptions() {
    let addr = spawn_server().await;

    let http = reqwest::Client::new();
    http.post(format!("http://{addr}/topics/create/"))
        .json(&json!({ "name": "weather" }))
        .send()
        .await
        .unwrap();

    let mut subscriber = connect(addr).await;
    let _ = recv_json(&mut subscriber).await;
    send_json(&mut subscriber, &subscribe_frame("weather", "alice")).await;
    let _ = recv_json(&mut subscriber).await;

    let resp = http.get(format!("http://{addr}/topics/weather/subscribers/")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["subscribers_count"], 1);

    drop(subscriber);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let resp = http.get(format!("http://{addr}/topics/weather/")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["subscriber_count"], 0);

    let resp = http.get(format!("http://{addr}/topics/weather/subscribers/")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["subscribers_count"], 0);
}

#[tokio::test]
async fn malformed_request_without_request_id_gets_a_bare_error() {
    let addr = spawn_server().await;
    let mut conn = connect(addr).await;
    let _ = recv_json(&mut conn).await; // connected

    conn.send(Message::Text(json!({ "type": "publish", "topic": "t" }).to_string().into()))
        .await
        .unwrap();

    let error = recv_json(&mut conn).await;
    assert_eq!(error["type"], "error");
    assert!(error.get("request_id").is_none());
    assert_eq!(error["error"], "Invalid or missing request_id");

    // the connection stays open: a subsequent valid ping still succeeds.
    let req_id = uuid::Uuid::new_v4();
    send_json(&mut conn, &json!({ "type": "ping", "request_id": req_id })).await;
    let pong = recv_json(&mut conn).await;
    assert_eq!(pong["type"], "pong");
    assert_eq!(pong["request_id"], req_id.to_string());
}

#[tokio::test]
async fn publish_to_unknown_topic_reports_not_found() {
    let addr = spawn_server().await;
    let mut conn = connect(addr).await;
    let _ = recv_json(&mut conn).await;

    let req_id = uuid::Uuid::new_v4();
    send_json(
        &mut conn,
        &json!({
            "type": "publish",
            "request_id": req_id,
            "topic": "ghost",
            "client_id": "p",
            "message": { "payload": {} },
        }),
    )
    .await;

    let error = recv_json(&mut conn).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["request_id"], req_id.to_string());
}

#[tokio::test]
async fn unsubscribe_of_a_missing_subscription_is_a_strict_not_found() {
    let addr = spawn_server().await;
    let mut conn = connect(addr).await;
    let _ = recv_json(&mut conn).await;

    send_json(
        &mut conn,
        &json!({
            "type": "unsubscribe",
            "request_id": uuid::Uuid::new_v4(),
            "topic": "never-subscribed",
            "client_id": "p",
        }),
    )
    .await;
    let error = recv_json(&mut conn).await;
    assert_eq!(error["type"], "error");
}

#[tokio::test]
async fn resubscribe_is_idempotent_and_still_acks() {
    let addr = spawn_server().await;
    let mut conn = connect(addr).await;
    let _ = recv_json(&mut conn).await;

    send_json(&mut conn, &subscribe_frame("t", "p")).await;
    let first = recv_json(&mut conn).await;
    assert_eq!(first["type"], "subscribed");

    send_json(&mut conn, &subscribe_frame("t", "p")).await;
    let second = recv_json(&mut conn).await;
    assert_eq!(second["type"], "subscribed");
}

#[tokio::test]
async fn admin_messages_endpoint_paginates_and_clamps_limit() {
    let addr = spawn_server().await;
    let http = reqwest::Client::new();
    http.post(format!("http://{addr}/topics/create/"))
        .json(&json!({ "name": "weather" }))
        .send()
        .await
        .unwrap();

    let mut publisher = connect(addr).await;
    let _ = recv_json(&mut publisher).await;
    for seq in 1..=3 {
        send_json(&mut publisher, &publish_frame("weather", "p", json!({ "seq": seq }))).await;
        let _ = recv_json(&mut publisher).await;
    }

    let resp = http
        .get(format!("http://{addr}/topics/weather/messages/?limit=101&offset=0"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["limit"], 100);
    assert_eq!(body["total_count"], 3);
    assert_eq!(body["messages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn create_topic_rejects_duplicate_and_empty_names() {
    let addr = spawn_server().await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("http://{addr}/topics/create/"))
        .json(&json!({ "name": "dup" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);

    let resp = http
        .post(format!("http://{addr}/topics/create/"))
        .json(&json!({ "name": "dup" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Topic already exists");

    let resp = http
        .post(format!("http://{addr}/topics/create/"))
        .json(&json!({ "name": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_and_stats_report_topic_and_subscriber_counts() {
    let addr = spawn_server().await;
    let http = reqwest::Client::new();
    http.post(format!("http://{addr}/topics/create/"))
        .json(&json!({ "name": "weather" }))
        .send()
        .await
        .unwrap();

    let mut conn = connect(addr).await;
    let _ = recv_json(&mut conn).await;
    send_json(&mut conn, &subscribe_frame("weather", "alice")).await;
    let _ = recv_json(&mut conn).await;

    let resp = http.get(format!("http://{addr}/health/")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["topics"], 1);
    assert_eq!(body["subscribers"], 1);

    let resp = http.get(format!("http://{addr}/stats/")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["topics"]["weather"]["subscribers"], 1);
}
