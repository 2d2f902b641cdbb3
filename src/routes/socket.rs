use std::sync::Arc;

use rocket::futures::stream::SplitStream;
use rocket::futures::{SinkExt, StreamExt};
use rocket::{State, get};
use rocket_ws as ws;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, interval, timeout};

use crate::auth::AuthClaims;
use crate::ephemeral::{EphemeralStore, SESSION_TTL};
use crate::handlers;
use crate::hub::Hub;
use crate::protocol::{self, ClientEvent};

use super::{BearerToken, ClientIp};

/// How long an unauthenticated socket may wait for its `auth` frame.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Source = SplitStream<ws::stream::DuplexStream>;

/// WebSocket endpoint. The upgrade request is the handshake carrier: the
/// bearer token comes from the `Authorization` header, the `token` query
/// parameter, or a single `auth` frame, in that order of preference.
#[get("/ws?<token>")]
pub fn socket_connect(
    ws: ws::WebSocket,
    hub: &State<Arc<Hub>>,
    ip: ClientIp,
    bearer: BearerToken,
    token: Option<String>,
) -> ws::Channel<'static> {
    let hub = Arc::clone(hub.inner());
    let upgrade_token = bearer.0.or(token);

    ws.channel(move |stream| {
        Box::pin(async move {
            let max = hub.config.max_connections_per_ip;
            if !hub.ip_connections.acquire(&ip.0, max) {
                eprintln!("Connection limit reached for {}", ip.0);
                return Ok(());
            }
            let result = drive_connection(&hub, stream, upgrade_token).await;
            hub.ip_connections.release(&ip.0);
            result
        })
    })
}

async fn drive_connection(
    hub: &Arc<Hub>,
    stream: ws::stream::DuplexStream,
    upgrade_token: Option<String>,
) -> ws::result::Result<()> {
    let (mut sink, mut source) = stream.split();
    let connection_id = uuid::Uuid::new_v4().to_string();
    println!("Connection attempt: {connection_id}");

    // Authentication failures close the connection with no event emitted.
    let Some(claims) = resolve_claims(hub, &mut source, upgrade_token).await else {
        let _ = sink.close().await;
        return Ok(());
    };

    let (sender, mut outbound) = mpsc::unbounded_channel();
    handlers::register_connection(hub, &connection_id, sender, &claims).await;

    let ping_timeout = Duration::from_secs(hub.config.ping_timeout);
    let mut ping = interval(Duration::from_secs(hub.config.ping_interval));
    ping.tick().await; // the first tick completes immediately
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            inbound = source.next() => match inbound {
                Some(Ok(ws::Message::Text(text))) => {
                    last_seen = Instant::now();
                    match protocol::parse_client_event(&text) {
                        Ok(event) => handlers::dispatch(hub, &connection_id, event).await,
                        Err(e) => handlers::emit_error(hub, &connection_id, &e.client_message()),
                    }
                }
                Some(Ok(ws::Message::Ping(payload))) => {
                    last_seen = Instant::now();
                    if sink.send(ws::Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(ws::Message::Pong(_))) => last_seen = Instant::now(),
                Some(Ok(ws::Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if sink.send(ws::Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = ping.tick() => {
                if last_seen.elapsed() > ping_timeout {
                    println!("Connection {connection_id} timed out");
                    break;
                }
                if sink.send(ws::Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
                renew_session(hub, &connection_id, &claims).await;
            }
        }
    }

    handlers::disconnect_connection(hub, &connection_id).await;
    let _ = sink.close().await;
    Ok(())
}

/// Resolve and verify the handshake token. When the upgrade request carried
/// none, wait for a single `auth` frame; any other frame before
/// authentication disconnects.
async fn resolve_claims(
    hub: &Hub,
    source: &mut Source,
    upgrade_token: Option<String>,
) -> Option<AuthClaims> {
    let token = match upgrade_token {
        Some(token) => token,
        None => {
            let frame = timeout(HANDSHAKE_TIMEOUT, source.next()).await.ok()??;
            let text = match frame {
                Ok(ws::Message::Text(text)) => text,
                _ => return None,
            };
            match protocol::parse_client_event(&text) {
                Ok(ClientEvent::Auth(payload)) => payload.token,
                _ => {
                    eprintln!("No token provided before first event");
                    return None;
                }
            }
        }
    };

    handlers::authenticate(hub, &token).ok()
}

/// Heartbeat renewal of the session mirror's TTL.
async fn renew_session(hub: &Hub, connection_id: &str, claims: &AuthClaims) {
    if let Err(e) = hub
        .ephemeral
        .set_user_session(&claims.user_id, connection_id, &claims.raw, SESSION_TTL)
        .await
    {
        eprintln!("session renewal for {} failed: {e}", claims.user_id);
    }
}
