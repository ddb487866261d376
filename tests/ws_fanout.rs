//! WebSocket clients receive change events published on the channel.

mod support;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use taskflow::application::tasks::CreateTaskCommand;
use taskflow::events::{Broadcaster, ListenerState, MemoryBus, NotificationListener};
use taskflow::infra::http::{NotificationsState, build_notifications_router};

use support::{CHANNEL, TaskHarness};

const WAIT: Duration = Duration::from_secs(3);

struct Server {
    addr: SocketAddr,
    broadcaster: Broadcaster,
    _shutdown: watch::Sender<bool>,
}

async fn start(bus: &MemoryBus) -> Server {
    let broadcaster = Broadcaster::new(16);
    let listener = Arc::new(NotificationListener::new(
        Arc::new(bus.clone()),
        broadcaster.clone(),
        CHANNEL,
        Duration::from_millis(20),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(Arc::clone(&listener).run(shutdown_rx));

    let router = build_notifications_router(NotificationsState {
        broadcaster: broadcaster.clone(),
        listener: Arc::clone(&listener),
    });
    let tcp = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = tcp.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(tcp, router.into_make_service())
            .await
            .expect("server runs");
    });

    wait_until(|| listener.state() == ListenerState::Subscribed).await;

    Server {
        addr,
        broadcaster,
        _shutdown: shutdown_tx,
    }
}

async fn wait_until(mut ready: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !ready() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

async fn next_json<S>(socket: &mut S) -> Value
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = timeout(WAIT, socket.next())
            .await
            .expect("frame arrives")
            .expect("socket open")
            .expect("valid frame");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("JSON frame");
        }
    }
}

#[tokio::test]
async fn every_socket_receives_the_created_event() {
    let bus = MemoryBus::new();
    let server = start(&bus).await;
    let url = format!("ws://{}/ws", server.addr);

    let (mut first, _) = connect_async(url.as_str()).await.expect("first client");
    let (mut second, _) = connect_async(url.as_str()).await.expect("second client");
    wait_until(|| server.broadcaster.connection_count() == 2).await;

    let harness = TaskHarness::with_bus(bus.clone());
    let created = harness
        .service
        .create_task(CreateTaskCommand {
            title: "x".to_string(),
            description: "y".to_string(),
            ..Default::default()
        })
        .await
        .expect("create succeeds")
        .value;

    for socket in [&mut first, &mut second] {
        let frame = next_json(socket).await;
        assert_eq!(frame["event"], "task-update");
        assert_eq!(frame["data"]["action"], "created");
        assert_eq!(frame["data"]["task"]["id"], json!(created.id));
        assert_eq!(frame["data"]["task"]["status"], "pending");
    }
}

#[tokio::test]
async fn client_frames_are_ignored_and_close_detaches() {
    let bus = MemoryBus::new();
    let server = start(&bus).await;
    let url = format!("ws://{}/ws", server.addr);

    let (mut socket, _) = connect_async(url.as_str()).await.expect("client");
    wait_until(|| server.broadcaster.connection_count() == 1).await;

    socket
        .send(Message::Text("hello".into()))
        .await
        .expect("client send");

    let payload = r#"{"action":"deleted","taskId":"7f0c5a1e-3c1b-4f53-9a43-2b3e0d0f7a11"}"#;
    bus.inject(CHANNEL, payload);
    let frame = next_json(&mut socket).await;
    assert_eq!(
        frame,
        json!({
            "event": "task-update",
            "data": {"action": "deleted", "taskId": "7f0c5a1e-3c1b-4f53-9a43-2b3e0d0f7a11"}
        })
    );

    socket.close(None).await.expect("close handshake");
    wait_until(|| server.broadcaster.connection_count() == 0).await;
}

#[tokio::test]
async fn malformed_payloads_never_reach_clients() {
    let bus = MemoryBus::new();
    let server = start(&bus).await;
    let url = format!("ws://{}/ws", server.addr);

    let (mut socket, _) = connect_async(url.as_str()).await.expect("client");
    wait_until(|| server.broadcaster.connection_count() == 1).await;

    bus.inject(CHANNEL, "{not json");
    bus.inject(CHANNEL, r#"{"action":"created"}"#);
    bus.inject(
        CHANNEL,
        r#"{"action":"deleted","taskId":"0b6d6f0e-9f55-4a57-8a0e-6f1f3f1b2c3d"}"#,
    );

    let frame = next_json(&mut socket).await;
    assert_eq!(frame["data"]["action"], "deleted");
    assert_eq!(
        frame["data"]["taskId"],
        "0b6d6f0e-9f55-4a57-8a0e-6f1f3f1b2c3d"
    );
}
