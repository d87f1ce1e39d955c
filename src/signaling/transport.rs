//! WebSocket client transport
//!
//! One [`SignalingInstance`] lives exactly as long as one connection. Outbound
//! texts are queued on an unbounded channel and written by a dedicated task,
//! so `send_message` never blocks session code.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::dispatcher::OutboundTransport;
use super::instance::SignalingInstance;
use crate::config::SignalingConfig;
use crate::error::{AppError, Result};
use crate::session::SessionFactory;

impl OutboundTransport for mpsc::UnboundedSender<String> {
    fn send_message(&self, message: String) {
        if self.send(message).is_err() {
            debug!("Outbound channel closed, dropping message");
        }
    }
}

/// Keep a signaling connection up until `cancel` fires
///
/// Reconnects after `reconnect_delay_ms`; a zero delay returns after the
/// first connection ends.
pub async fn run_client(
    config: SignalingConfig,
    factory: Arc<dyn SessionFactory>,
    cancel: CancellationToken,
) -> Result<()> {
    let url = config.url();

    loop {
        match connect_once(&url, factory.clone(), &cancel).await {
            Ok(()) => info!("Signaling connection to {} ended", url),
            Err(e) => warn!("Signaling connection to {} failed: {}", url, e),
        }

        if cancel.is_cancelled() || config.reconnect_delay_ms == 0 {
            break;
        }

        debug!("Reconnecting in {} ms", config.reconnect_delay_ms);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_millis(config.reconnect_delay_ms)) => {}
        }
    }

    Ok(())
}

async fn connect_once(
    url: &str,
    factory: Arc<dyn SessionFactory>,
    cancel: &CancellationToken,
) -> Result<()> {
    let (ws_stream, _) = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        connected = tokio_tungstenite::connect_async(url) => connected
            .map_err(|e| AppError::Transport(format!("connect failed: {}", e)))?,
    };
    info!("Connected to signaling server {}", url);

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let instance = SignalingInstance::new(Arc::new(out_tx), factory);

    let mut writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            trace!("Signaling >> {}", text);
            if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                warn!("Signaling write failed: {}", e);
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Pings are answered by tungstenite on the next read
    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            _ = &mut writer => break Err(AppError::Transport("writer stopped".to_string())),
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    trace!("Signaling << {}", text.as_str());
                    let _ = instance.receive_message(&text).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!("Ignoring {} byte binary frame", data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("Server closed signaling connection: {:?}", frame);
                    break Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(AppError::Transport(e.to_string())),
                None => break Ok(()),
            },
        }
    };

    instance.shutdown().await;
    drop(instance);

    if !writer.is_finished()
        && tokio::time::timeout(Duration::from_secs(1), &mut writer)
            .await
            .is_err()
    {
        writer.abort();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::FakeFactory;
    use tokio::net::TcpListener;

    #[test]
    fn test_unbounded_sender_transport() {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        tx.send_message("one".to_string());
        assert_eq!(rx.try_recv().unwrap(), "one");

        drop(rx);
        // Closed channel is tolerated
        tx.send_message("two".to_string());
    }

    #[tokio::test]
    async fn test_client_round_trip_against_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let start = r#"{"method":"start","parameter":"","source":"peerA","destination":""}"#;
            ws.send(Message::Text(start.to_string().into())).await.unwrap();

            let reply = loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => break text.to_string(),
                    Some(Ok(_)) => continue,
                    other => panic!("connection ended early: {:?}", other),
                }
            };
            let _ = ws.close(None).await;
            reply
        });

        let config = SignalingConfig {
            host: "127.0.0.1".to_string(),
            port,
            path: "/wssrv".to_string(),
            reconnect_delay_ms: 0,
        };
        let factory = Arc::new(FakeFactory::default());
        let client = tokio::spawn(run_client(config, factory.clone(), CancellationToken::new()));

        let reply = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        let offer = crate::signaling::Envelope::decode(&reply).unwrap();
        assert_eq!(offer.method, "offer");
        assert_eq!(offer.destination, "peerA");

        tokio::time::timeout(Duration::from_secs(5), client)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        // Connection teardown closed the session
        assert_eq!(factory.count("peerA:close"), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_reconnect_loop() {
        let cancel = CancellationToken::new();
        let config = SignalingConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            path: "/wssrv".to_string(),
            reconnect_delay_ms: 10_000,
        };
        let client = tokio::spawn(run_client(
            config,
            Arc::new(FakeFactory::default()),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), client)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
