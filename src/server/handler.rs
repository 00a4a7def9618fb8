use std::{net::SocketAddr, sync::Arc};
use futures_util::{Stream, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::{self, Instant},
};
use tracing::{debug, info, instrument, warn};
use tungstenite::Message;

use crate::{
    server::{
        client::{pump_outbound, Client},
        dispatch::dispatch_message,
        ServerState,
    },
    utils::error::RelayError,
};

/// Runs one accepted TCP connection, upgrading it to TLS first when the
/// server is in production mode. Errors end only this connection.
pub async fn handle_tcp(stream: TcpStream, addr: SocketAddr, state: Arc<ServerState>) {
    let result = match state.tls_acceptor.clone() {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => handle_connection(tls_stream, state, addr).await,
            Err(e) => Err(RelayError::ConnectionError(format!("TLS handshake failed: {}", e))),
        },
        None => handle_connection(stream, state, addr).await,
    };

    match result {
        Ok(()) => debug!("Connection closed: {}", addr),
        Err(e) => warn!("Connection {} ended: {}", addr, e),
    }
}

/// Handles a WebSocket connection from handshake to disconnect.
///
/// The client holds one of the `max_connections` slots and stays registered
/// for broadcasts for the lifetime of the session. Both are released when it
/// ends, whatever the reason.
///
/// # Errors
/// Returns `RelayError` if the handshake fails, the server is full, or the
/// socket errors while reading.
#[instrument(skip(state, stream))]
pub async fn handle_connection<S>(
    stream: S,
    state: Arc<ServerState>,
    addr: SocketAddr,
) -> Result<(), RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| RelayError::ConnectionError(format!("WebSocket handshake failed: {}", e)))?;

    let (writer, mut reader) = ws_stream.split();
    let (client, outbound) = Client::new(addr, state.config.max_queued_messages);
    let mut writer_task = tokio::spawn(pump_outbound(writer, outbound));

    let Ok(_slot) = state.connection_slots.clone().try_acquire_owned() else {
        client.close()?;
        let _ = writer_task.await;
        return Err(RelayError::ConnectionLimit(state.config.max_connections));
    };

    state.clients.add(client.clone());
    state.metrics.connections.inc();
    info!(client = %client.id, "A client connected");

    let result = read_events(&mut reader, &client, &state).await;

    let _ = state.clients.remove(&client.id);
    state.metrics.connections.dec();
    let _ = client.close();
    drop(client);
    // A peer that stopped reading can keep the writer blocked on the socket.
    if time::timeout(state.config.ping_timeout(), &mut writer_task).await.is_err() {
        writer_task.abort();
    }

    info!("A client disconnected");
    result
}

/// Reads frames until the client closes, errors, goes silent for longer than
/// the ping timeout, or is dropped from the registry for lagging. Pings are
/// sent every ping interval.
async fn read_events<R>(
    reader: &mut R,
    client: &Client,
    state: &ServerState,
) -> Result<(), RelayError>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let ping_interval = state.config.ping_interval();
    let mut heartbeat = time::interval_at(Instant::now() + ping_interval, ping_interval);

    loop {
        tokio::select! {
            msg = reader.next() => {
                let Some(msg) = msg else { return Ok(()) };
                let msg = msg.map_err(|e| RelayError::ConnectionError(e.to_string()))?;
                client.touch();

                match msg {
                    Message::Close(_) => return Ok(()),
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                    data => {
                        dispatch_message(state, data);
                    }
                }
            }
            _ = heartbeat.tick() => {
                if !state.clients.contains(&client.id) {
                    info!(client = %client.id, "Client fell behind and was dropped");
                    return Ok(());
                }
                if client.idle_for() > state.config.ping_timeout() {
                    info!(client = %client.id, "Client timed out");
                    return Ok(());
                }
                client.send(Message::Ping(Vec::new()))?;
            }
        }
    }
}
