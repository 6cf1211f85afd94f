//! Shared utilities for integration and scenario testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use coap_lite::{CoapOption, MessageClass, MessageType, Packet};
use coap_swarm::probe::{DelayRange, ProbeRecord, ProbeSettings};
use coap_swarm::transport::{
    CoapUri, Method, Request, Response, ResponseCode, Transport, TransportError,
};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// In-process transport that answers after a fixed latency.
#[allow(dead_code)]
pub struct ScriptedTransport {
    pub latency: Duration,
    pub payload: &'static str,
    /// Fail every n-th call with a reset instead of answering.
    pub fail_every: Option<u64>,
    /// Panic on this call number (1-based).
    pub panic_on: Option<u64>,
    pub calls: AtomicU64,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new(latency: Duration, payload: &'static str) -> Self {
        Self {
            latency,
            payload,
            fail_every: None,
            panic_on: None,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    async fn request(&self, _request: &Request) -> Result<Response, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_on == Some(call) {
            panic!("scripted transport panic on call {}", call);
        }

        tokio::time::sleep(self.latency).await;

        if self.fail_every.is_some_and(|n| call % n == 0) {
            return Err(TransportError::Reset);
        }
        Ok(Response {
            code: ResponseCode::CONTENT,
            payload: self.payload.as_bytes().to_vec(),
        })
    }
}

/// A GET for `/time` on `peer`.
pub fn time_request(peer: SocketAddr) -> Request {
    let uri = CoapUri::parse("coap://127.0.0.1/time").unwrap();
    Request::new(Method::Get, &uri, peer)
}

/// Timing used by the stock workload, with a cycle limit.
#[allow(dead_code)]
pub fn stock_settings(cycles: Option<u64>) -> ProbeSettings {
    ProbeSettings {
        delay: DelayRange::new(Duration::from_secs(2), Duration::from_secs(4)),
        deadline: Duration::from_micros(2100),
        cycles,
    }
}

/// Drain every record currently queued on a tap.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ProbeRecord>) -> Vec<ProbeRecord> {
    let mut records = Vec::new();
    while let Ok(record) = rx.try_recv() {
        records.push(record);
    }
    records
}

/// Start a CoAP server that answers with a fixed payload after `delay`.
#[allow(dead_code)]
pub async fn start_mock_server(delay: Duration, payload: &'static str) -> SocketAddr {
    start_programmable_server(move |_path| async move {
        tokio::time::sleep(delay).await;
        Some((ResponseCode::CONTENT, payload.as_bytes().to_vec()))
    })
    .await
}

/// Start a programmable CoAP server.
///
/// The handler receives the request's Uri-Path segments; `None` means no
/// reply is sent.
#[allow(dead_code)]
pub async fn start_programmable_server<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<(ResponseCode, Vec<u8>)>> + Send + 'static,
{
    let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let addr = socket.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        let mut buf = vec![0u8; 2048];
        loop {
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(_) => break,
            };
            let Ok(request) = Packet::from_bytes(&buf[..len]) else {
                continue;
            };
            if !matches!(request.header.code, MessageClass::Request(_)) {
                continue;
            }

            let path: Vec<String> = request
                .get_option(CoapOption::UriPath)
                .map(|values| {
                    values
                        .iter()
                        .map(|v| String::from_utf8_lossy(v).into_owned())
                        .collect()
                })
                .unwrap_or_default();

            let f = f.clone();
            let socket = socket.clone();
            tokio::spawn(async move {
                if let Some((code, payload)) = f(path).await {
                    let mut reply = Packet::new();
                    reply.header.set_type(MessageType::Acknowledgement);
                    reply.header.code = MessageClass::from(code.0);
                    reply.header.message_id = request.header.message_id;
                    reply.set_token(request.get_token().to_vec());
                    reply.payload = payload;
                    let _ = socket.send_to(&reply.to_bytes().unwrap(), peer).await;
                }
            });
        }
    });

    addr
}
