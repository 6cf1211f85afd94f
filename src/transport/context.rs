//! Shared CoAP client context.
//!
//! # Responsibilities
//! - Own the single UDP socket every probe sends through
//! - Allocate message ids and tokens for outgoing requests
//! - Route incoming responses to the exchange waiting for them
//!
//! # Design Decisions
//! - Exchanges are keyed by token in a concurrent map
//! - A guard removes the exchange when the requester finishes or gives up,
//!   so late responses find nothing and are dropped
//! - Confirmable responses are acknowledged; nothing is retransmitted

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use coap_lite::{CoapOption, MessageClass, MessageType, Packet, RequestType};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::transport::{Method, Request, Response, ResponseCode, Transport, TransportError};

const MAX_DATAGRAM: usize = 64 * 1024;
const TOKEN_LEN: usize = 4;

enum Reply {
    Response(Packet),
    Reset,
}

struct Pending {
    message_id: u16,
    reply: oneshot::Sender<Reply>,
}

type PendingMap = DashMap<Vec<u8>, Pending>;

/// The shared request context.
///
/// Share it behind an `Arc`; dropping it stops the receive task and
/// releases the socket.
pub struct CoapContext {
    socket: Arc<UdpSocket>,
    pending: Arc<PendingMap>,
    next_message_id: AtomicU16,
    receiver: JoinHandle<()>,
}

impl Drop for CoapContext {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

impl CoapContext {
    /// Bind the shared socket and start the receive task.
    pub async fn bind(local: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(local).await?);
        let pending = Arc::new(PendingMap::new());

        let receiver = tokio::spawn(receive_loop(socket.clone(), pending.clone()));

        tracing::debug!(local = %socket.local_addr()?, "CoAP context bound");

        Ok(Self {
            socket,
            pending,
            next_message_id: AtomicU16::new(fastrand::u16(..)),
            receiver,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Number of exchanges still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn next_message_id(&self) -> u16 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Reserve a token that no pending exchange is using.
    fn register(&self, message_id: u16, reply: oneshot::Sender<Reply>) -> PendingGuard {
        loop {
            let token = fastrand::u32(..).to_be_bytes().to_vec();
            match self.pending.entry(token.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(Pending { message_id, reply });
                    return PendingGuard {
                        pending: self.pending.clone(),
                        token,
                        message_id,
                    };
                }
                Entry::Occupied(_) => continue,
            }
        }
    }
}

impl Transport for CoapContext {
    async fn request(&self, request: &Request) -> Result<Response, TransportError> {
        let message_id = self.next_message_id();
        let (tx, rx) = oneshot::channel();
        let guard = self.register(message_id, tx);

        let bytes = encode_request(request, message_id, guard.token.clone())?;
        self.socket.send_to(&bytes, request.peer).await?;

        tracing::trace!(peer = %request.peer, message_id, "Request sent");

        match rx.await.map_err(|_| TransportError::Closed)? {
            Reply::Response(packet) => Ok(Response {
                code: ResponseCode(u8::from(packet.header.code)),
                payload: packet.payload,
            }),
            Reply::Reset => Err(TransportError::Reset),
        }
    }
}

/// Removes its exchange from the pending map on drop.
///
/// The token may already belong to a newer exchange once the receive task
/// has taken ours, so removal also matches the message id.
struct PendingGuard {
    pending: Arc<PendingMap>,
    token: Vec<u8>,
    message_id: u16,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let message_id = self.message_id;
        self.pending
            .remove_if(&self.token, |_, exchange| exchange.message_id == message_id);
    }
}

fn encode_request(
    request: &Request,
    message_id: u16,
    token: Vec<u8>,
) -> Result<Vec<u8>, TransportError> {
    debug_assert_eq!(token.len(), TOKEN_LEN);

    let mut packet = Packet::new();
    packet.header.set_version(1);
    packet.header.set_type(MessageType::Confirmable);
    packet.header.code = MessageClass::Request(request_type(request.method));
    packet.header.message_id = message_id;
    packet.set_token(token);
    for segment in &request.path {
        packet.add_option(CoapOption::UriPath, segment.as_bytes().to_vec());
    }
    for item in &request.query {
        packet.add_option(CoapOption::UriQuery, item.as_bytes().to_vec());
    }

    packet
        .to_bytes()
        .map_err(|e| TransportError::Encode(format!("{:?}", e)))
}

fn request_type(method: Method) -> RequestType {
    match method {
        Method::Get => RequestType::Get,
        Method::Post => RequestType::Post,
        Method::Put => RequestType::Put,
        Method::Delete => RequestType::Delete,
    }
}

async fn receive_loop(socket: Arc<UdpSocket>, pending: Arc<PendingMap>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                // ICMP errors from earlier sends surface here on some platforms.
                tracing::debug!(error = %e, "UDP receive failed");
                continue;
            }
        };

        match Packet::from_bytes(&buf[..len]) {
            Ok(packet) => dispatch(&socket, &pending, packet, peer).await,
            Err(e) => {
                tracing::debug!(peer = %peer, error = ?e, "Dropping undecodable datagram");
            }
        }
    }
}

async fn dispatch(socket: &UdpSocket, pending: &PendingMap, packet: Packet, peer: SocketAddr) {
    let message_type = packet.header.get_type();

    if matches!(message_type, MessageType::Reset) {
        fail_exchange(pending, packet.header.message_id);
        return;
    }

    if !matches!(packet.header.code, MessageClass::Response(_)) {
        // Empty ACK: the response will follow separately.
        return;
    }

    if matches!(message_type, MessageType::Confirmable) {
        acknowledge(socket, packet.header.message_id, peer).await;
    }

    let token = packet.get_token().to_vec();
    match pending.remove(&token) {
        Some((_, exchange)) => {
            let _ = exchange.reply.send(Reply::Response(packet));
        }
        None => {
            tracing::debug!(peer = %peer, token = ?token, "Dropping response with no pending exchange");
        }
    }
}

fn fail_exchange(pending: &PendingMap, message_id: u16) {
    let token = pending
        .iter()
        .find(|entry| entry.value().message_id == message_id)
        .map(|entry| entry.key().clone());

    if let Some((_, exchange)) = token.and_then(|t| pending.remove(&t)) {
        let _ = exchange.reply.send(Reply::Reset);
    }
}

async fn acknowledge(socket: &UdpSocket, message_id: u16, peer: SocketAddr) {
    let mut ack = Packet::new();
    ack.header.set_type(MessageType::Acknowledgement);
    ack.header.code = MessageClass::Empty;
    ack.header.message_id = message_id;

    match ack.to_bytes() {
        Ok(bytes) => {
            if let Err(e) = socket.send_to(&bytes, peer).await {
                tracing::debug!(peer = %peer, error = %e, "Failed to send ACK");
            }
        }
        Err(e) => tracing::debug!(error = ?e, "Failed to encode ACK"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CoapUri;
    use std::time::Duration;

    async fn server() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    async fn recv_packet(socket: &UdpSocket) -> (Packet, SocketAddr) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, from) = socket.recv_from(&mut buf).await.unwrap();
        (Packet::from_bytes(&buf[..len]).unwrap(), from)
    }

    fn reply_to(request: &Packet, kind: MessageType, code: MessageClass, payload: &[u8]) -> Vec<u8> {
        let mut reply = Packet::new();
        reply.header.set_type(kind);
        reply.header.code = code;
        reply.header.message_id = request.header.message_id;
        reply.set_token(request.get_token().to_vec());
        reply.payload = payload.to_vec();
        reply.to_bytes().unwrap()
    }

    async fn bound() -> Arc<CoapContext> {
        Arc::new(CoapContext::bind("127.0.0.1:0".parse().unwrap()).await.unwrap())
    }

    fn time_request(peer: SocketAddr) -> Request {
        let uri = CoapUri::parse("coap://127.0.0.1/time?fmt=iso").unwrap();
        Request::new(Method::Get, &uri, peer)
    }

    #[tokio::test]
    async fn test_piggybacked_response() {
        let (server, addr) = server().await;
        let context = bound().await;

        let request = time_request(addr);
        let client = context.clone();
        let call = tokio::spawn(async move { client.request(&request).await });

        let (packet, from) = recv_packet(&server).await;
        assert!(matches!(packet.header.code, MessageClass::Request(RequestType::Get)));
        assert!(matches!(packet.header.get_type(), MessageType::Confirmable));
        assert_eq!(packet.get_token().len(), TOKEN_LEN);

        let reply = reply_to(
            &packet,
            MessageType::Acknowledgement,
            MessageClass::from(ResponseCode::CONTENT.0),
            b"12:00",
        );
        server.send_to(&reply, from).await.unwrap();

        let response = call.await.unwrap().unwrap();
        assert_eq!(response.code, ResponseCode::CONTENT);
        assert_eq!(response.payload, b"12:00");
        assert_eq!(context.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_separate_response_is_acknowledged() {
        let (server, addr) = server().await;
        let context = bound().await;

        let request = time_request(addr);
        let client = context.clone();
        let call = tokio::spawn(async move { client.request(&request).await });

        let (packet, from) = recv_packet(&server).await;

        let mut empty_ack = Packet::new();
        empty_ack.header.set_type(MessageType::Acknowledgement);
        empty_ack.header.code = MessageClass::Empty;
        empty_ack.header.message_id = packet.header.message_id;
        server.send_to(&empty_ack.to_bytes().unwrap(), from).await.unwrap();

        let mut separate = Packet::new();
        separate.header.set_type(MessageType::Confirmable);
        separate.header.code = MessageClass::from(ResponseCode::CONTENT.0);
        separate.header.message_id = 0x4242;
        separate.set_token(packet.get_token().to_vec());
        separate.payload = b"later".to_vec();
        server.send_to(&separate.to_bytes().unwrap(), from).await.unwrap();

        let response = call.await.unwrap().unwrap();
        assert_eq!(response.payload, b"later");

        let (ack, _) = recv_packet(&server).await;
        assert!(matches!(ack.header.get_type(), MessageType::Acknowledgement));
        assert_eq!(ack.header.message_id, 0x4242);
    }

    #[tokio::test]
    async fn test_reset_fails_exchange() {
        let (server, addr) = server().await;
        let context = bound().await;

        let request = time_request(addr);
        let client = context.clone();
        let call = tokio::spawn(async move { client.request(&request).await });

        let (packet, from) = recv_packet(&server).await;
        let mut reset = Packet::new();
        reset.header.set_type(MessageType::Reset);
        reset.header.code = MessageClass::Empty;
        reset.header.message_id = packet.header.message_id;
        server.send_to(&reset.to_bytes().unwrap(), from).await.unwrap();

        let result = call.await.unwrap();
        assert!(matches!(result, Err(TransportError::Reset)));
        assert_eq!(context.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_exchange_is_removed() {
        let (server, addr) = server().await;
        let context = bound().await;
        let request = time_request(addr);

        let result =
            tokio::time::timeout(Duration::from_millis(50), context.request(&request)).await;
        assert!(result.is_err());
        assert_eq!(context.pending_count(), 0);

        // A late reply finds no exchange and is dropped quietly.
        let (packet, from) = recv_packet(&server).await;
        let reply = reply_to(
            &packet,
            MessageType::Acknowledgement,
            MessageClass::from(ResponseCode::CONTENT.0),
            b"late",
        );
        server.send_to(&reply, from).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(context.pending_count(), 0);
    }

    #[test]
    fn test_encode_carries_path_and_query() {
        let request = time_request("127.0.0.1:5683".parse().unwrap());
        let bytes = encode_request(&request, 7, vec![1, 2, 3, 4]).unwrap();
        let packet = Packet::from_bytes(&bytes).unwrap();

        assert_eq!(packet.header.message_id, 7);
        assert_eq!(packet.get_token().to_vec(), vec![1, 2, 3, 4]);

        let path: Vec<_> = packet
            .get_option(CoapOption::UriPath)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default();
        assert_eq!(path, vec![b"time".to_vec()]);

        let query: Vec<_> = packet
            .get_option(CoapOption::UriQuery)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default();
        assert_eq!(query, vec![b"fmt=iso".to_vec()]);
    }

    #[test]
    fn test_encode_sends_unescaped_options() {
        let uri = CoapUri::parse("coap://127.0.0.1/living%20room?unit=%C2%B0C").unwrap();
        let request = Request::new(Method::Get, &uri, "127.0.0.1:5683".parse().unwrap());
        let packet = Packet::from_bytes(&encode_request(&request, 1, vec![0; 4]).unwrap()).unwrap();

        let path: Vec<_> = packet
            .get_option(CoapOption::UriPath)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default();
        assert_eq!(path, vec![b"living room".to_vec()]);

        let query: Vec<_> = packet
            .get_option(CoapOption::UriQuery)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default();
        assert_eq!(query, vec!["unit=\u{b0}C".as_bytes().to_vec()]);
    }

    #[test]
    fn test_stale_guard_leaves_reused_token_alone() {
        let pending = Arc::new(PendingMap::new());
        let token = vec![9, 9, 9, 9];

        // The receive task already took exchange 1; exchange 2 drew the same token.
        let stale = PendingGuard {
            pending: pending.clone(),
            token: token.clone(),
            message_id: 1,
        };
        let (tx, _rx) = oneshot::channel();
        pending.insert(token.clone(), Pending { message_id: 2, reply: tx });

        drop(stale);
        assert_eq!(pending.get(&token).map(|p| p.message_id), Some(2));

        let current = PendingGuard {
            pending: pending.clone(),
            token: token.clone(),
            message_id: 2,
        };
        drop(current);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_context_releases_socket() {
        let context = CoapContext::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let local = context.local_addr().unwrap();
        drop(context);

        // The aborted receive task holds the last socket handle until it is reaped.
        let mut rebound = None;
        for _ in 0..50 {
            if let Ok(socket) = UdpSocket::bind(local).await {
                rebound = Some(socket);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(rebound.is_some(), "{} still bound", local);
    }
}
