//! A standalone Roomhub server.
//!
//! ```text
//! cargo run -p echo-hub -- 0.0.0.0:8080
//! RUST_LOG=roomhub_room=trace cargo run -p echo-hub
//! ```
//!
//! Connect with any WebSocket client, send `{"type":"create","name":"ada"}`,
//! and everything sent afterwards is echoed to the whole room.

use roomhub::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("roomhub=info".parse()?)
                .add_directive("roomhub_room=info".parse()?)
                .add_directive("echo_hub=info".parse()?),
        )
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string());

    let server = HubServer::builder()
        .bind(&addr)
        .config(HubConfig::default())
        .build()
        .await?;
    tracing::info!(addr = %server.local_addr()?, "echo hub listening");

    server.run().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn start() -> String {
        let server = HubServer::builder().bind("127.0.0.1:0").build().await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    async fn ws(addr: &str) -> Ws {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        ws
    }

    async fn recv(ws: &mut Ws) -> Message {
        tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout")
            .unwrap()
            .unwrap()
    }

    async fn say_hello(ws: &mut Ws, hello: ClientHello) -> ServerHello {
        ws.send(Message::text(serde_json::to_string(&hello).unwrap()))
            .await
            .unwrap();
        serde_json::from_slice(&recv(ws).await.into_data()).unwrap()
    }

    #[tokio::test]
    async fn test_three_clients_share_a_room() {
        let addr = start().await;

        let mut host = ws(&addr).await;
        let code = match say_hello(&mut host, ClientHello::Create { name: "host".into() }).await {
            ServerHello::Welcome { room, .. } => room,
            other => panic!("expected Welcome, got {other:?}"),
        };

        let mut guests = Vec::new();
        for name in ["g1", "g2"] {
            let mut guest = ws(&addr).await;
            let reply = say_hello(
                &mut guest,
                ClientHello::Join { room: code.clone(), name: name.into() },
            )
            .await;
            assert!(matches!(reply, ServerHello::Welcome { .. }));
            guests.push(guest);
        }

        host.send(Message::text("round one")).await.unwrap();
        assert_eq!(recv(&mut host).await.into_data().as_ref(), b"round one");
        for guest in &mut guests {
            assert_eq!(recv(guest).await.into_data().as_ref(), b"round one");
        }
    }
}
