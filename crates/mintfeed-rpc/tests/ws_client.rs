//! WebSocket client integration tests against a loopback JSON-RPC server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use mintfeed_core::transport::RpcTransport;
use mintfeed_rpc::{SubscriptionId, WsClientConfig, WsRpcClient};

// ─── Helpers ──────────────────────────────────────────────────────────────────

const WAIT: Duration = Duration::from_secs(5);

fn fast_reconnect() -> WsClientConfig {
    WsClientConfig {
        reconnect_initial: Duration::from_millis(20),
        reconnect_max: Duration::from_millis(100),
        max_reconnect_attempts: None,
    }
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

async fn read_request(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

async fn reply(ws: &mut WebSocketStream<TcpStream>, id: &Value, result: Value) {
    let msg = json!({ "jsonrpc": "2.0", "id": id, "result": result });
    ws.send(Message::Text(msg.to_string())).await.unwrap();
}

async fn notify(ws: &mut WebSocketStream<TcpStream>, subscription: u64, signature: &str) {
    let msg = json!({
        "jsonrpc": "2.0",
        "method": "logsNotification",
        "params": {
            "subscription": subscription,
            "result": {
                "context": { "slot": 1 },
                "value": { "signature": signature, "err": null, "logs": [] }
            }
        }
    });
    ws.send(Message::Text(msg.to_string())).await.unwrap();
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn logs_subscribe_receives_notifications() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let req = read_request(&mut ws).await;
        assert_eq!(req["method"], "logsSubscribe");
        assert_eq!(req["params"][0]["mentions"][0], "Prog1");
        assert_eq!(req["params"][1]["commitment"], "confirmed");
        reply(&mut ws, &req["id"], json!(11)).await;
        notify(&mut ws, 11, "SIG1").await;
        // Keep the connection open until the client is done.
        let _ = ws.next().await;
    });

    let client = WsRpcClient::connect(format!("ws://{addr}"), fast_reconnect())
        .await
        .unwrap();
    let (id, mut rx) = client.logs_subscribe("Prog1", "confirmed").await.unwrap();
    assert_eq!(id, SubscriptionId("11".into()));

    let msg = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(msg["value"]["signature"], "SIG1");

    drop(client);
    timeout(WAIT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn plain_calls_are_multiplexed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        loop {
            let req = read_request(&mut ws).await;
            reply(&mut ws, &req["id"], json!(req["method"].as_str().unwrap().len())).await;
        }
    });

    let client = WsRpcClient::connect(format!("ws://{addr}"), fast_reconnect())
        .await
        .unwrap();
    let slot = timeout(WAIT, client.call("getSlot", json!([]))).await.unwrap().unwrap();
    assert_eq!(slot, json!(7));
}

#[tokio::test]
async fn resubscribes_after_disconnect_under_new_id() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut first = accept(&listener).await;
        let req = read_request(&mut first).await;
        reply(&mut first, &req["id"], json!(1)).await;
        notify(&mut first, 1, "before").await;
        drop(first);

        let mut second = accept(&listener).await;
        let req = read_request(&mut second).await;
        assert_eq!(req["method"], "logsSubscribe");
        reply(&mut second, &req["id"], json!(2)).await;
        notify(&mut second, 2, "after").await;
        let _ = second.next().await;
    });

    let client = WsRpcClient::connect(format!("ws://{addr}"), fast_reconnect())
        .await
        .unwrap();
    let (_, mut rx) = client.logs_subscribe("Prog1", "confirmed").await.unwrap();

    let first = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first["value"]["signature"], "before");
    let second = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(second["value"]["signature"], "after");
    assert_eq!(client.subscription_count(), 1);
}

#[tokio::test]
async fn swapped_ids_after_reconnect_keep_feeds_apart() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        for id in [0, 1] {
            let req = read_request(&mut first).await;
            let program = req["params"][0]["mentions"][0].clone();
            reply(&mut first, &req["id"], json!(id)).await;
            assert_eq!(program, if id == 0 { "ProgA" } else { "ProgB" });
        }
        drop(first);

        // The new connection hands out the old ids the other way round.
        let mut second = accept(&listener).await;
        let mut programs = Vec::new();
        for _ in 0..2 {
            let req = read_request(&mut second).await;
            let program = req["params"][0]["mentions"][0].as_str().unwrap().to_owned();
            let id = if program == "ProgA" { 1 } else { 0 };
            reply(&mut second, &req["id"], json!(id)).await;
            programs.push(program);
        }
        notify(&mut second, 1, "for-a").await;
        notify(&mut second, 0, "for-b").await;
        let _ = second.next().await;
        programs
    });

    let client = WsRpcClient::connect(format!("ws://{addr}"), fast_reconnect())
        .await
        .unwrap();
    let (_, mut a) = client.logs_subscribe("ProgA", "confirmed").await.unwrap();
    let (_, mut b) = client.logs_subscribe("ProgB", "confirmed").await.unwrap();

    let got_a = timeout(WAIT, a.recv()).await.unwrap().unwrap();
    let got_b = timeout(WAIT, b.recv()).await.unwrap().unwrap();
    assert_eq!(got_a["value"]["signature"], "for-a");
    assert_eq!(got_b["value"]["signature"], "for-b");
    assert_eq!(client.subscription_count(), 2);

    drop(client);
    let mut programs = server.await.unwrap();
    programs.sort();
    assert_eq!(programs, ["ProgA", "ProgB"]);
}

#[tokio::test]
async fn rejected_resubscribe_ends_only_that_feed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut first = accept(&listener).await;
        for id in [1, 2] {
            let req = read_request(&mut first).await;
            reply(&mut first, &req["id"], json!(id)).await;
        }
        drop(first);

        let mut second = accept(&listener).await;
        for _ in 0..2 {
            let req = read_request(&mut second).await;
            if req["params"][0]["mentions"][0] == "ProgA" {
                let msg = json!({
                    "jsonrpc": "2.0",
                    "id": req["id"],
                    "error": { "code": -32602, "message": "Invalid params" }
                });
                second.send(Message::Text(msg.to_string())).await.unwrap();
            } else {
                reply(&mut second, &req["id"], json!(7)).await;
            }
        }
        notify(&mut second, 7, "still-b").await;
        let _ = second.next().await;
    });

    let client = WsRpcClient::connect(format!("ws://{addr}"), fast_reconnect())
        .await
        .unwrap();
    let (_, mut a) = client.logs_subscribe("ProgA", "confirmed").await.unwrap();
    let (_, mut b) = client.logs_subscribe("ProgB", "confirmed").await.unwrap();

    assert!(timeout(WAIT, a.recv()).await.unwrap().is_none());
    let got_b = timeout(WAIT, b.recv()).await.unwrap().unwrap();
    assert_eq!(got_b["value"]["signature"], "still-b");
    assert_eq!(client.subscription_count(), 1);
}

#[tokio::test]
async fn feed_ends_when_endpoint_is_gone_for_good() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let req = read_request(&mut ws).await;
        reply(&mut ws, &req["id"], json!(1)).await;
        // Stop listening, then drop the connection.
        drop(listener);
        drop(ws);
    });

    let config = WsClientConfig {
        max_reconnect_attempts: Some(2),
        ..fast_reconnect()
    };
    let client = WsRpcClient::connect(format!("ws://{addr}"), config).await.unwrap();
    let (_, mut rx) = client.logs_subscribe("Prog1", "confirmed").await.unwrap();

    assert!(timeout(WAIT, rx.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn connect_fails_fast_on_dead_endpoint() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let result = WsRpcClient::connect(format!("ws://{addr}"), WsClientConfig::default()).await;
    assert!(result.is_err());
}
