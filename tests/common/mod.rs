//! A stand in for a Firefox debugger server
//!
//! Answers requests the way Firefox does from a fixed script and lets tests push packets at
//! the client whenever they like.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use padre_firefox::codec::RdpCodec;
use padre_firefox::notifier::Action;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

pub fn greeting() -> Value {
    json!({
        "from": "root",
        "applicationType": "browser",
        "traits": {"sources": true}
    })
}

pub struct FakeServer {
    pub addr: String,
    requests: Arc<Mutex<Vec<Value>>>,
    push: mpsc::UnboundedSender<Value>,
}

impl FakeServer {
    /// Listen for one connection, greet it with `greeting` if given and answer every request
    /// with whatever `handler` returns
    pub async fn start<F>(greeting: Option<Value>, handler: F) -> FakeServer
    where
        F: Fn(&Value) -> Vec<Value> + Send + 'static,
    {
        FakeServer::start_closing_on(greeting, handler, None).await
    }

    /// As `start` but drop the connection instead of answering a request of type `close_on`
    pub async fn start_closing_on<F>(
        greeting: Option<Value>,
        handler: F,
        close_on: Option<&'static str>,
    ) -> FakeServer
    where
        F: Fn(&Value) -> Vec<Value> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let requests = Arc::new(Mutex::new(vec![]));
        let (push, mut push_rx) = mpsc::unbounded_channel::<Value>();

        let log = requests.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, RdpCodec::new());

            if let Some(greeting) = greeting {
                framed.send(greeting).await.unwrap();
            }

            // Pushed packets go out before replies to anything received after the push
            loop {
                tokio::select! {
                    biased;

                    packet = push_rx.recv() => match packet {
                        Some(packet) => {
                            if framed.send(packet).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    },
                    request = framed.next() => match request {
                        Some(Ok(request)) => {
                            log.lock().unwrap().push(request.clone());
                            if close_on.is_some() && request["type"].as_str() == close_on {
                                return;
                            }
                            for reply in handler(&request) {
                                if framed.send(reply).await.is_err() {
                                    return;
                                }
                            }
                        }
                        _ => return,
                    },
                }
            }
        });

        FakeServer {
            addr,
            requests,
            push,
        }
    }

    /// Address of a server that drops every connection as soon as it's made
    pub async fn hanging_up() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        addr
    }

    /// A server that greets and then answers like a browser with one tab
    pub async fn firefox() -> FakeServer {
        FakeServer::start(Some(greeting()), firefox_reply).await
    }

    /// Send a packet the client didn't ask for
    pub fn push(&self, packet: Value) {
        self.push.send(packet).unwrap();
    }

    /// Every request received so far as `(to, type)`
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| {
                (
                    r["to"].as_str().unwrap_or("").to_string(),
                    r["type"].as_str().unwrap_or("").to_string(),
                )
            })
            .collect()
    }

    /// Every request received so far of type `kind`
    pub fn requests_of(&self, kind: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r["type"] == kind)
            .cloned()
            .collect()
    }

    /// Wait up to a second for a request of type `kind` to arrive
    pub async fn wait_for_request(&self, kind: &str) -> bool {
        for _ in 0..100 {
            if !self.requests_of(kind).is_empty() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

pub fn frame(actor: &str, name: &str, line: u64) -> Value {
    json!({
        "actor": actor,
        "type": "call",
        "callee": {"type": "object", "class": "Function", "name": name},
        "where": {
            "source": {"actor": "s1", "url": "http://localhost:8000/app.js"},
            "line": line,
            "column": 4
        },
        "environment": {"actor": format!("{}-env", actor), "type": "function"}
    })
}

/// Replies of a browser with one tab, `tab1`, whose thread is `thread1`
pub fn firefox_reply(request: &Value) -> Vec<Value> {
    let to = request["to"].as_str().unwrap_or("");
    let kind = request["type"].as_str().unwrap_or("");

    let reply = match (to, kind) {
        ("root", "listTabs") => json!({
            "from": "root",
            "selected": 0,
            "tabs": [{
                "actor": "tab1",
                "title": "Todo App",
                "url": "http://localhost:8000/",
                "consoleActor": "console1"
            }, {
                "title": "No actor here"
            }]
        }),
        ("tab1", "attach") => json!({
            "from": "tab1",
            "type": "tabAttached",
            "threadActor": "thread1"
        }),
        ("tab1", "detach") => json!({"from": "tab1", "type": "detached"}),
        ("tab1", "navigateTo") => json!({"from": "tab1"}),
        ("thread1", "attach") => json!({
            "from": "thread1",
            "type": "paused",
            "actor": "pause1",
            "why": {"type": "attached"}
        }),
        ("thread1", "resume") => json!({"from": "thread1", "type": "resumed"}),
        ("thread1", "interrupt") if request["when"] == "onNext" => {
            json!({"from": "thread1", "type": "willInterrupt"})
        }
        ("thread1", "interrupt") => json!({
            "from": "thread1",
            "type": "paused",
            "actor": "pause2",
            "why": {"type": "interrupted"}
        }),
        ("thread1", "pauseOnExceptions") => json!({"from": "thread1"}),
        ("thread1", "sources") => json!({
            "from": "thread1",
            "sources": [
                {"actor": "s1", "url": "http://localhost:8000/app.js"},
                {"actor": "s2", "url": "debugger eval code"},
                {"actor": "s3", "url": "http://localhost:8000/vendor.js"}
            ]
        }),
        ("thread1", "frames") => json!({
            "from": "thread1",
            "frames": [frame("frame1", "render", 10), frame("frame2", "main", 42)]
        }),
        ("s1", "source") => json!({
            "from": "s1",
            "source": "let x = 1;\n",
            "contentType": "text/javascript"
        }),
        ("s3", "source") => json!({
            "from": "s3",
            "source": {
                "type": "longString",
                "actor": "longstr1",
                "length": 12,
                "initial": "var a"
            },
            "contentType": "text/javascript"
        }),
        ("longstr1", "substring") => json!({"from": "longstr1", "substring": "var a = 42;\n"}),
        ("s1", "setBreakpoint") => json!({"from": "s1", "actor": "bp-7", "isPending": false}),
        ("s3", "setBreakpoint") => json!({
            "from": "s3",
            "actor": "bp-8",
            "actualLocation": {"source": {"actor": "s3"}, "line": 12, "column": 0}
        }),
        ("missing", "setBreakpoint") => json!({
            "from": "missing",
            "error": "noSuchActor",
            "message": "No such actor for ID: missing"
        }),
        (bp, "delete") => json!({"from": bp}),
        ("console1", "evaluateJS") if request["text"] == "slow()" => return vec![],
        ("console1", "evaluateJS") => json!({
            "from": "console1",
            "input": request["text"],
            "result": 2
        }),
        ("obj1", "prototypeAndProperties") => json!({
            "from": "obj1",
            "prototype": {"type": "object", "class": "Object", "actor": "obj2"},
            "ownProperties": {"a": {"value": 1, "writable": true}},
            "safeGetterValues": {}
        }),
        _ => json!({
            "from": to,
            "error": "unrecognizedPacketType",
            "message": format!("Unrecognized {}", kind)
        }),
    };

    vec![reply]
}

/// Receive the next `count` actions, failing if they take more than a couple of seconds
pub async fn recv_actions(rx: &mut mpsc::Receiver<Action>, count: usize) -> Vec<Action> {
    let mut actions = vec![];
    for _ in 0..count {
        let action = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timed out waiting for action")
            .expect("Action channel closed");
        actions.push(action);
    }
    actions
}

/// Check nothing else arrives for a little while
pub async fn assert_no_action(rx: &mut mpsc::Receiver<Action>) {
    if let Ok(action) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        panic!("Unexpected action {:?}", action);
    }
}
