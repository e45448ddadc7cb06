//! Per-connection handler: join handshake, then hand-off to the pumps.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive ClientHello (within `handshake_timeout`)
//!   2. Create / join / resume → get a Member
//!   3. Send ServerHello::Welcome
//!   4. Attach the member; the pumps own the connection until it ends
//!
//! Any failure in steps 1–2 answers with ServerHello::Rejected and closes.

use std::sync::Arc;

use bytes::Bytes;
use roomhub_protocol::{ClientHello, Codec, ProtocolError, ServerHello};
use roomhub_room::{ConnectionState, Member, RoomError};
use roomhub_transport::{Connection, TransportError};

use crate::HubError;
use crate::server::ServerState;

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C, K>(
    mut conn: C,
    state: Arc<ServerState<K>>,
) -> Result<(), HubError>
where
    C: Connection,
    K: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1 + 2: Hello ---
    let member = match perform_handshake(&mut conn, &state).await {
        Ok(member) => member,
        Err(e) => {
            reject(conn, &state.codec, &e).await;
            return Err(e);
        }
    };

    // --- Step 3: Welcome ---
    let welcome = ServerHello::Welcome {
        room: member.room().code().clone(),
        member: member.id(),
        name: member.name().to_owned(),
    };
    conn.send(Bytes::from(state.codec.encode(&welcome)?)).await?;

    tracing::info!(
        %conn_id,
        room = %member.room().code(),
        member = %member.id(),
        "member connected"
    );

    // --- Step 4: Pumps ---
    let pumps = member.attach(conn).await?;
    pumps.join().await;

    tracing::debug!(%conn_id, member = %member.id(), "connection finished");
    Ok(())
}

/// Reads the hello and resolves it to a member ready to attach.
async fn perform_handshake<C, K>(
    conn: &mut C,
    state: &ServerState<K>,
) -> Result<Member, HubError>
where
    C: Connection,
    K: Codec,
{
    let config = state.registry.config();

    let data = match tokio::time::timeout(config.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(TransportError::ConnectionClosed("closed before hello".into()).into());
        }
        Ok(Err(e)) => return Err(HubError::Transport(e)),
        Err(_) => return Err(invalid("hello timed out")),
    };

    if data.len() > config.max_message_size {
        return Err(invalid(format!(
            "hello of {} bytes exceeds {} byte limit",
            data.len(),
            config.max_message_size
        )));
    }

    let hello: ClientHello = state.codec.decode(&data)?;
    tracing::debug!(conn_id = %conn.id(), ?hello, "hello received");

    match hello {
        ClientHello::Create { name } => {
            let name = validate_name(name)?;
            let room = state.registry.create_room().await?;
            Ok(room.admit(name).await?)
        }

        ClientHello::Join { room, name } => {
            let name = validate_name(name)?;
            let room = state.registry.get_room(&room).await?;
            Ok(room.admit(name).await?)
        }

        ClientHello::Resume { room, member } => {
            let room = state.registry.get_room(&room).await?;
            if !room.state().is_joinable() {
                return Err(RoomError::NotAdmitted(room.code().clone()).into());
            }
            let member = room.get_member(member).await?;
            if let ConnectionState::Attached(connection) = member.connection_state() {
                return Err(RoomError::AlreadyAttached {
                    member: member.id(),
                    connection,
                }
                .into());
            }
            Ok(member)
        }
    }
}

/// Tells the peer why it is being turned away, then closes.
///
/// Best effort: the connection is going away regardless.
async fn reject<C, K>(mut conn: C, codec: &K, err: &HubError)
where
    C: Connection,
    K: Codec,
{
    let conn_id = conn.id();
    let Some(code) = err.rejection_code() else {
        tracing::debug!(%conn_id, error = %err, "handshake failed");
        return;
    };
    tracing::info!(%conn_id, code, error = %err, "rejecting connection");

    let rejected = ServerHello::Rejected {
        code,
        message: err.to_string(),
    };
    match codec.encode(&rejected) {
        Ok(bytes) => {
            if let Err(e) = conn.send(Bytes::from(bytes)).await {
                tracing::debug!(%conn_id, error = %e, "failed to send rejection");
            }
        }
        Err(e) => tracing::error!(%conn_id, error = %e, "failed to encode rejection"),
    }
    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "close after rejection failed");
    }
}

/// Display names are trimmed and must not be empty.
fn validate_name(name: String) -> Result<String, HubError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    Ok(trimmed.to_owned())
}

fn invalid(message: impl Into<String>) -> HubError {
    HubError::Protocol(ProtocolError::InvalidMessage(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_trims() {
        assert_eq!(validate_name("  ada ".into()).unwrap(), "ada");
    }

    #[test]
    fn test_validate_name_rejects_blank() {
        let err = validate_name(" \t".into()).unwrap_err();
        assert_eq!(err.rejection_code(), Some(400));
    }
}
