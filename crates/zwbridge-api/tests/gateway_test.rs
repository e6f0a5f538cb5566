// Integration tests for `GatewayDriver` against an in-process WebSocket server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use zwbridge_api::{
    CommandClassId, Driver, DriverCommand, DriverEvent, GatewayDriver, NetworkId, NodeId,
    ReconnectConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn listen() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = Url::parse(&format!("ws://{addr}")).unwrap();
    (listener, url)
}

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        max_retries: Some(50),
    }
}

async fn next_event(rx: &mut tokio::sync::mpsc::Receiver<DriverEvent>) -> DriverEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn next_command<S>(ws: &mut S) -> DriverCommand
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for command")
            .expect("client went away")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn forwards_events_in_order_and_skips_garbage() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        ws.send(Message::text(r#"{"event":"driver-ready","network_id":42}"#))
            .await
            .unwrap();
        ws.send(Message::text("not json")).await.unwrap();
        ws.send(Message::text(
            r#"{"event":"value-removed","node_id":5,"class_id":37,"instance":1,"index":0}"#,
        ))
        .await
        .unwrap();
        ws.send(Message::text(r#"{"event":"scan-complete"}"#))
            .await
            .unwrap();

        let command = next_command(&mut ws).await;
        let _ = ws.close(None).await;
        command
    });

    let cancel = CancellationToken::new();
    let (driver, mut events) = GatewayDriver::spawn(url, fast_reconnect(), cancel.clone());

    driver
        .send(DriverCommand::Connect {
            port: "/dev/ttyACM0".into(),
        })
        .unwrap();

    assert_eq!(
        next_event(&mut events).await,
        DriverEvent::DriverReady {
            network_id: NetworkId(42)
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        DriverEvent::ValueRemoved {
            node_id: NodeId(5),
            class_id: CommandClassId(0x25),
            instance: 1,
            index: 0,
        }
    );
    assert_eq!(next_event(&mut events).await, DriverEvent::ScanComplete);

    let received = server.await.unwrap();
    assert_eq!(
        received,
        DriverCommand::Connect {
            port: "/dev/ttyACM0".into()
        }
    );

    driver.shutdown();
}

#[tokio::test]
async fn reports_link_loss_and_reconnects() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        // First session: drop the socket right away.
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);

        // Second session: the command queued during the outage arrives.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        next_command(&mut ws).await
    });

    let cancel = CancellationToken::new();
    let (driver, mut events) = GatewayDriver::spawn(url, fast_reconnect(), cancel.clone());

    assert_eq!(next_event(&mut events).await, DriverEvent::DriverFailed);

    driver.send(DriverCommand::WriteConfig).unwrap();
    let received = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server timed out")
        .unwrap();
    assert_eq!(received, DriverCommand::WriteConfig);

    cancel.cancel();
    assert!(driver.send(DriverCommand::RemoveNode).is_err());
}

#[tokio::test]
async fn unreachable_gateway_surfaces_as_driver_failed() {
    // Bind then drop to get a port nobody listens on.
    let (listener, url) = listen().await;
    drop(listener);

    let config = ReconnectConfig {
        max_retries: Some(0),
        ..fast_reconnect()
    };
    let (_driver, mut events) = GatewayDriver::spawn(url, config, CancellationToken::new());

    assert_eq!(next_event(&mut events).await, DriverEvent::DriverFailed);
    // The loop gives up after the retry budget and closes the channel.
    let closed = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn flushes_queued_commands_on_shutdown() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::text(r#"{"event":"driver-ready","network_id":7}"#))
            .await
            .unwrap();
        next_command(&mut ws).await
    });

    let (driver, mut events) =
        GatewayDriver::spawn(url, fast_reconnect(), CancellationToken::new());
    assert_eq!(
        next_event(&mut events).await,
        DriverEvent::DriverReady {
            network_id: NetworkId(7)
        }
    );

    driver
        .send(DriverCommand::SetNodeName {
            node_id: NodeId(3),
            name: "Porch".into(),
        })
        .unwrap();
    driver.shutdown();

    let received = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server timed out")
        .unwrap();
    assert_eq!(
        received,
        DriverCommand::SetNodeName {
            node_id: NodeId(3),
            name: "Porch".into()
        }
    );
}
