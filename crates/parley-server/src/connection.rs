//! Per-connection control loop and the TCP accept loop.
//!
//! Each connection gets a reader loop (this task) and a writer task that
//! drains the connection's outbound queue. Inbound lines are decoded,
//! dispatched to the [`Hub`] and answered with exactly one reply frame.

use std::io;
use std::sync::Arc;

use parley_shared::protocol::{decode_request, Push, Reply, ReplyBody, Request};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ChatError, ChatResult};
use crate::hub::Hub;
use crate::sessions::{ConnId, ConnectionHandle, Outbound};

/// Greeting pushed to every new connection.
pub const GREETING: &str = "connected";

/// Accept connections forever, one task per connection.
pub async fn serve(listener: TcpListener, hub: Arc<Hub>) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "Chat server listening");
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "Could not set TCP_NODELAY");
        }
        let hub = hub.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer.to_string(), hub).await;
        });
    }
}

/// Drive one client connection until it disconnects or is closed by the
/// server. Always ends the connection's session exactly once.
pub async fn handle_connection<S>(stream: S, peer: String, hub: Arc<Hub>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (conn, rx) = ConnectionHandle::new(peer);
    info!(conn = %conn.id(), peer = conn.peer(), "Connection accepted");

    let write_task = tokio::spawn(write_loop(writer, rx, conn.id()));

    conn.send(&Push::System {
        message: GREETING.to_string(),
    });

    if let Err(e) = read_loop(BufReader::new(reader), &conn, &hub).await {
        debug!(conn = %conn.id(), error = %e, "Read error");
    }

    hub.disconnect(&conn).await;
    conn.close();
    drop(conn);
    if let Err(e) = write_task.await {
        warn!(error = %e, "Writer task panicked");
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Outbound>, id: ConnId)
where
    W: AsyncWrite + Unpin,
{
    let mut closing = false;
    'outer: while let Some(first) = rx.recv().await {
        // Write everything already queued, then flush once.
        let mut next = Some(first);
        while let Some(item) = next.take() {
            match item {
                Outbound::Line(line) => {
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        debug!(conn = %id, error = %e, "Write failed");
                        break 'outer;
                    }
                }
                Outbound::Close => {
                    closing = true;
                    break;
                }
            }
            next = rx.try_recv().ok();
        }
        if let Err(e) = writer.flush().await {
            debug!(conn = %id, error = %e, "Flush failed");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = writer.shutdown().await;
    info!(conn = %id, "Connection closed");
}

enum Inbound {
    Line,
    Oversized,
    Eof,
}

/// Read one `\n`-terminated line into `buf`, reading at most `limit` bytes.
/// An oversized line is consumed up to its terminator and reported.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> io::Result<Inbound>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader)
        .take(limit as u64 + 1)
        .read_until(b'\n', buf)
        .await?;
    if n == 0 {
        return Ok(Inbound::Eof);
    }
    if buf.ends_with(b"\n") || buf.len() <= limit {
        return Ok(Inbound::Line);
    }

    loop {
        buf.clear();
        let n = (&mut *reader)
            .take(limit as u64 + 1)
            .read_until(b'\n', buf)
            .await?;
        if n == 0 || buf.ends_with(b"\n") {
            buf.clear();
            return Ok(Inbound::Oversized);
        }
    }
}

async fn read_loop<R>(mut reader: R, conn: &ConnectionHandle, hub: &Hub) -> io::Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let limit = hub.config().max_frame_bytes;
    let mut buf = Vec::new();

    loop {
        let inbound = tokio::select! {
            _ = conn.closed() => {
                debug!(conn = %conn.id(), "Closed by server");
                return Ok(());
            }
            read = read_frame(&mut reader, &mut buf, limit) => read?,
        };

        match inbound {
            Inbound::Eof => {
                debug!(conn = %conn.id(), "Peer hung up");
                return Ok(());
            }
            Inbound::Oversized => {
                warn!(conn = %conn.id(), limit, "Skipping oversized frame");
                continue;
            }
            Inbound::Line => {}
        }

        let Ok(line) = std::str::from_utf8(&buf) else {
            warn!(conn = %conn.id(), "Skipping frame that is not UTF-8");
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request = match decode_request(line) {
            Ok(request) => request,
            Err(e) => {
                match e.action().map(str::to_string) {
                    Some(action) => {
                        debug!(conn = %conn.id(), error = %e, "Rejected frame");
                        conn.send(&ChatError::from(e).to_reply(&action));
                    }
                    None => warn!(conn = %conn.id(), error = %e, "Skipping malformed frame"),
                }
                continue;
            }
        };

        let action = request.action();
        debug!(conn = %conn.id(), action, "Dispatching");
        match dispatch(hub, conn, request).await {
            Ok(Some(body)) => {
                conn.send(&Reply::ok(action, body));
            }
            Ok(None) => {}
            Err(e) if e.is_fatal() => {
                warn!(conn = %conn.id(), error = %e, "Closing connection after internal error");
                conn.send(&e.to_reply(action));
                return Ok(());
            }
            Err(e) => {
                debug!(conn = %conn.id(), action, code = e.code(), "Request failed");
                conn.send(&e.to_reply(action));
            }
        }
    }
}

/// Run one request. `Ok(None)` means the operation already answered on
/// the connection itself.
async fn dispatch(
    hub: &Hub,
    conn: &ConnectionHandle,
    request: Request,
) -> ChatResult<Option<ReplyBody>> {
    let body = match request {
        Request::Register {
            username,
            password,
            display_name,
        } => {
            hub.register(&username, &password, &display_name).await?;
            ReplyBody::Message {
                message: "Registration successful".into(),
            }
        }
        Request::Login { username, password } => {
            hub.login(conn, &username, &password).await?;
            return Ok(None);
        }
        Request::Logout {} => {
            hub.logout(conn).await;
            ReplyBody::Empty {}
        }
        Request::SearchUsers { query } => ReplyBody::SearchResults {
            results: hub.search_users(&query).await,
        },
        Request::FriendRequest { to } => {
            hub.send_friend_request(conn, &to).await?;
            ReplyBody::Empty {}
        }
        Request::FriendAccept { from } => {
            hub.accept_friend_request(conn, &from).await?;
            ReplyBody::Empty {}
        }
        Request::FriendDecline { from } => {
            hub.decline_friend_request(conn, &from).await?;
            ReplyBody::Empty {}
        }
        Request::FriendRemove { username } => {
            hub.remove_friend(conn, &username).await?;
            ReplyBody::Empty {}
        }
        Request::CreateRoom { room_name } => ReplyBody::Room {
            room: hub.create_room(conn, &room_name).await?,
        },
        Request::JoinRoom { room_id } => ReplyBody::Room {
            room: hub.join_room(conn, &room_id).await?,
        },
        Request::LeaveRoom { room_id } => {
            hub.leave_room(conn, &room_id).await?;
            ReplyBody::Empty {}
        }
        Request::SendMessage(send) => {
            let message = hub.send_message(conn, send).await?;
            ReplyBody::Sent {
                sent_at: message.ts,
                message,
            }
        }
        Request::FetchHistory {
            target_type,
            to,
            limit,
        } => ReplyBody::History {
            messages: hub.fetch_history(conn, target_type, &to, limit).await?,
        },
        Request::Typing {
            target_type,
            to,
            is_typing,
        } => {
            hub.typing(conn, target_type, &to, is_typing).await?;
            ReplyBody::Empty {}
        }
        Request::ListFriends {} => {
            conn.send(&hub.list_friends(conn).await?);
            return Ok(None);
        }
        Request::ListRooms {} => {
            conn.send(&hub.list_rooms(conn).await?);
            return Ok(None);
        }
    };
    Ok(Some(body))
}
