//! Remote debugging protocol client
//!
//! Owns the connection to the debugger server. Requests are sent to an actor and answered by
//! the next reply from that actor, anything the server sends of its own accord is handed on
//! to whoever has subscribed to events.

use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::codec::RdpCodec;
use crate::error::PadreError;
use crate::Result;

use futures::{future, Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};
use url::Url;

lazy_static! {
    static ref UNSOLICITED_NOTIFICATIONS: HashSet<&'static str> = [
        "addonListChanged",
        "consoleAPICall",
        "documentLoad",
        "evaluationResult",
        "frameUpdate",
        "logMessage",
        "networkEvent",
        "networkEventUpdate",
        "newGlobal",
        "newSource",
        "pageError",
        "reflowActivity",
        "tabDetached",
        "tabListChanged",
        "tabNavigated",
        "updatedSource",
        "workerListChanged",
    ]
    .iter()
    .cloned()
    .collect();
    static ref UNSOLICITED_PAUSES: HashSet<&'static str> = [
        "DOMEvent",
        "XHR",
        "breakpoint",
        "debuggerStatement",
        "eventBreakpoint",
        "exception",
        "getWatchpoint",
        "mutationBreakpoint",
        "resumeLimit",
        "setWatchpoint",
        "watchpoint",
    ]
    .iter()
    .cloned()
    .collect();
}

/// Packet types that report a change in a threads state
const THREAD_STATE_TYPES: [&str; 3] = ["paused", "resumed", "detached"];

type PacketStream = Pin<Box<dyn Stream<Item = Result<Value>> + Send>>;
type PacketSink = Pin<Box<dyn Sink<Value, Error = PadreError> + Send>>;

/// Where the debugger server is listening
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Endpoint {
    /// `host:port` to connect to with length prefixed packets
    Tcp(String),
    /// WebSocket URL, one packet per text message
    WebSocket(Url),
}

impl Endpoint {
    /// Understands `host:port`, `tcp://host:port` and `ws://` or `wss://` URLs
    pub fn parse(endpoint: &str) -> Result<Self> {
        if !endpoint.contains("://") {
            return Ok(Endpoint::Tcp(endpoint.to_string()));
        }

        let url =
            Url::parse(endpoint).map_err(|_| PadreError::InvalidEndpoint(endpoint.to_string()))?;

        match url.scheme() {
            "ws" | "wss" => Ok(Endpoint::WebSocket(url)),
            "tcp" => match (url.host_str(), url.port()) {
                (Some(host), Some(port)) => Ok(Endpoint::Tcp(format!("{}:{}", host, port))),
                _ => Err(PadreError::InvalidEndpoint(endpoint.to_string())),
            },
            _ => Err(PadreError::InvalidEndpoint(endpoint.to_string())),
        }
    }
}

/// Whether the server sent the packet of its own accord rather than as a reply
///
/// A `paused` packet is a reply when it comes from an `attach` or `interrupt` request,
/// otherwise the thread hit something and the packet is a notification.
pub fn is_unsolicited(packet: &Value) -> bool {
    let kind = match packet["type"].as_str() {
        Some(kind) => kind,
        None => return false,
    };

    if UNSOLICITED_NOTIFICATIONS.contains(kind) {
        return true;
    }

    if kind == "paused" {
        let why = &packet["why"];
        if why["onNext"].as_bool().unwrap_or(false) {
            return true;
        }
        if let Some(why_type) = why["type"].as_str() {
            return UNSOLICITED_PAUSES.contains(why_type);
        }
    }

    false
}

/// Whether the packet reports a thread changing state
pub fn is_thread_state(packet: &Value) -> bool {
    match packet["type"].as_str() {
        Some(kind) => THREAD_STATE_TYPES.contains(&kind),
        None => false,
    }
}

fn build_packet(to: &str, kind: &str, params: Value) -> Value {
    let mut packet = serde_json::json!({"to": to, "type": kind});

    if let (Value::Object(packet), Value::Object(params)) = (&mut packet, params) {
        packet.extend(params);
    }

    packet
}

#[derive(Debug, Default)]
struct Listeners {
    greeting: Option<oneshot::Sender<Result<Value>>>,
    responses: HashMap<String, VecDeque<oneshot::Sender<Result<Value>>>>,
    events: Option<mpsc::UnboundedSender<Value>>,
    closed: bool,
}

impl Listeners {
    fn send_event(&mut self, packet: Value) {
        let closed = match &self.events {
            Some(tx) => tx.send(packet).is_err(),
            None => {
                trace!("No event subscriber, dropping {}", packet);
                false
            }
        };

        if closed {
            self.events = None;
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.greeting = None;
        self.responses.clear();
        self.events = None;
    }
}

fn reply_result(from: &str, packet: Value) -> Result<Value> {
    if packet.get("error").is_some() {
        Err(PadreError::from_packet(from, &packet))
    } else {
        Ok(packet)
    }
}

/// Hand a packet from the server to whoever is waiting on it
fn route_packet(listeners: &Mutex<Listeners>, packet: Value) {
    let mut listeners = listeners.lock().unwrap();

    let from = match packet["from"].as_str() {
        Some(from) => from.to_string(),
        None => {
            warn!("Packet from unknown actor: {}", packet);
            return;
        }
    };

    if from == "root"
        && listeners.greeting.is_some()
        && (packet.get("applicationType").is_some() || packet.get("error").is_some())
    {
        if let Some(tx) = listeners.greeting.take() {
            if tx.send(reply_result(&from, packet)).is_err() {
                debug!("Nobody waiting on the handshake");
            }
        }
        return;
    }

    if !is_unsolicited(&packet) {
        let listener = match listeners.responses.get_mut(&from) {
            Some(queue) => {
                let listener = queue.pop_front();
                if queue.is_empty() {
                    listeners.responses.remove(&from);
                }
                listener
            }
            None => None,
        };

        if let Some(tx) = listener {
            if is_thread_state(&packet) {
                listeners.send_event(packet.clone());
            }
            if tx.send(reply_result(&from, packet)).is_err() {
                debug!("Nobody waiting on reply from {}", from);
            }
            return;
        }
    }

    listeners.send_event(packet);
}

/// Closes the listeners when the connection task ends, however it ends
struct CloseOnDrop(Arc<Mutex<Listeners>>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let mut listeners = match self.0.lock() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.close();
    }
}

async fn run_connection(
    listeners: Arc<Mutex<Listeners>>,
    mut packets: PacketStream,
    mut sink: PacketSink,
    mut writer_rx: mpsc::UnboundedReceiver<Value>,
) {
    let _close = CloseOnDrop(listeners.clone());

    loop {
        tokio::select! {
            packet = packets.next() => match packet {
                Some(Ok(packet)) => {
                    trace!("Received packet {}", packet);
                    route_packet(&listeners, packet);
                }
                Some(Err(e)) => {
                    warn!("Can't read from debugger server: {}", e);
                    break;
                }
                None => {
                    info!("Debugger server closed the connection");
                    break;
                }
            },
            packet = writer_rx.recv() => match packet {
                Some(packet) => {
                    trace!("Sending packet {}", packet);
                    if let Err(e) = sink.send(packet).await {
                        warn!("Can't write to debugger server: {}", e);
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

/// Handle on a connection to a debugger server, cheap to clone
#[derive(Clone, Debug)]
pub struct RdpClient {
    listeners: Arc<Mutex<Listeners>>,
    writer_tx: mpsc::UnboundedSender<Value>,
}

impl RdpClient {
    /// Connect to the server
    ///
    /// Returns the client along with a receiver for the servers greeting, the handshake is
    /// complete once that resolves.
    pub async fn open(endpoint: &Endpoint) -> Result<(Self, oneshot::Receiver<Result<Value>>)> {
        let (packets, sink) = match endpoint {
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                let (sink, packets) = Framed::new(stream, RdpCodec::new()).split::<Value>();
                let packets: PacketStream = Box::pin(packets);
                let sink: PacketSink = Box::pin(sink);
                (packets, sink)
            }
            Endpoint::WebSocket(url) => {
                let (ws_stream, _) = connect_async(url.as_str()).await?;
                let (ws_write, ws_read) = ws_stream.split::<Message>();
                let packets = ws_read.filter_map(|message| {
                    future::ready(match message {
                        Ok(Message::Text(s)) => {
                            Some(serde_json::from_str::<Value>(&s).map_err(PadreError::from))
                        }
                        Ok(_) => None,
                        Err(e) => Some(Err(PadreError::from(e))),
                    })
                });
                let sink = ws_write.with(|packet: Value| {
                    future::ready(Ok::<_, PadreError>(Message::Text(packet.to_string())))
                });
                let packets: PacketStream = Box::pin(packets);
                let sink: PacketSink = Box::pin(sink);
                (packets, sink)
            }
        };

        info!("Connected to debugger server at {:?}", endpoint);

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (greeting_tx, greeting_rx) = oneshot::channel();

        let listeners = Arc::new(Mutex::new(Listeners {
            greeting: Some(greeting_tx),
            ..Default::default()
        }));

        tokio::spawn(run_connection(listeners.clone(), packets, sink, writer_rx));

        Ok((
            RdpClient {
                listeners,
                writer_tx,
            },
            greeting_rx,
        ))
    }

    /// Send a request of type `kind` to the actor `to` and wait for its reply
    ///
    /// `params` should be a JSON object, its fields are added to the request.
    pub async fn request(&self, to: &str, kind: &str, params: Value) -> Result<Value> {
        let packet = build_packet(to, kind, params);
        let (tx, rx) = oneshot::channel();

        {
            let mut listeners = self.listeners.lock().unwrap();
            if listeners.closed {
                return Err(PadreError::ConnectionClosed);
            }

            let queue = listeners
                .responses
                .entry(to.to_string())
                .or_insert_with(VecDeque::new);
            queue.push_back(tx);

            if self.writer_tx.send(packet).is_err() {
                queue.pop_back();
                return Err(PadreError::ConnectionClosed);
            }
        }

        debug!("Sent {} request to {}", kind, to);

        rx.await.map_err(|_| PadreError::ConnectionClosed)?
    }

    /// Send a packet without waiting for any reply, the reply arrives as an event
    pub fn send_packet(&self, packet: Value) -> Result<()> {
        self.writer_tx
            .send(packet)
            .map_err(|_| PadreError::ConnectionClosed)
    }

    /// Start receiving everything the server sends that isn't a reply
    ///
    /// Replaces any previous subscriber, whose receiver then ends.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut listeners = self.listeners.lock().unwrap();
        if !listeners.closed {
            listeners.events = Some(tx);
        }

        rx
    }
}
