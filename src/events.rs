//! Event dispatcher
//!
//! Works out what the UI should be told about each packet the server sends of its own
//! accord, and runs the loop that does the telling.

use crate::client::RdpClient;
use crate::frames;
use crate::notifier::{Action, Notifier};
use crate::session::ThreadHandle;
use crate::thread::fetch_frames;
use crate::types::{Pause, PauseReason, Source, ThreadState};

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace, warn};

/// What dispatching a packet asks for
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Tell the UI
    Notify(Action),
    /// Fetch the first page of frames on this thread and tell the UI about them
    LoadFrames(String),
}

/// Whether a pause should be kept from the UI
///
/// Interrupts are raised by tooling (slow script warnings, setting breakpoints on a running
/// thread) and aren't pauses the user asked for, unless it was a break on next.
pub fn should_ignore_pause(why: &PauseReason) -> bool {
    why.kind == "interrupted" && !why.on_next
}

#[derive(Clone, Debug)]
pub struct EventDispatcher {
    thread_actor: String,
    tab_actor: String,
}

impl EventDispatcher {
    pub fn new(thread_actor: String, tab_actor: String) -> Self {
        EventDispatcher {
            thread_actor,
            tab_actor,
        }
    }

    /// Everything that needs doing for the packet, nothing at all for packets we don't handle
    pub fn dispatch(&self, packet: &Value) -> Vec<Effect> {
        let from = packet["from"].as_str().unwrap_or("");
        let kind = packet["type"].as_str().unwrap_or("");

        if from == self.thread_actor {
            match kind {
                "paused" => self.paused(packet),
                "resumed" => vec![Effect::Notify(Action::Resumed(packet.clone()))],
                "newSource" => self.new_source(packet),
                _ => vec![],
            }
        } else if from == self.tab_actor && kind == "tabNavigated" {
            self.tab_navigated(packet)
        } else {
            trace!("Not dispatching {} packet from {}", kind, from);
            vec![]
        }
    }

    /// The state the thread is now in if the packet changes it
    pub fn thread_state(&self, packet: &Value) -> Option<ThreadState> {
        if packet["from"].as_str() != Some(self.thread_actor.as_str()) {
            return None;
        }

        match packet["type"].as_str() {
            Some("paused") => Some(ThreadState::Paused),
            Some("resumed") => Some(ThreadState::Running),
            Some("detached") => Some(ThreadState::Detached),
            _ => None,
        }
    }

    fn paused(&self, packet: &Value) -> Vec<Effect> {
        let why: PauseReason = match serde_json::from_value(packet["why"].clone()) {
            Ok(why) => why,
            Err(e) => {
                warn!("Can't understand pause reason in {}: {}", packet, e);
                return vec![];
            }
        };

        if should_ignore_pause(&why) {
            debug!("Ignoring interrupt of thread {}", self.thread_actor);
            return vec![];
        }

        let mut rest = packet.clone();
        let frame = match rest.as_object_mut().and_then(|p| p.remove("frame")) {
            None | Some(Value::Null) => None,
            Some(raw) => match frames::synthesize_value(&raw) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    warn!("Can't understand paused frame {}: {}", raw, e);
                    None
                }
            },
        };

        vec![
            Effect::LoadFrames(self.thread_actor.clone()),
            Effect::Notify(Action::Paused(Pause {
                thread: self.thread_actor.clone(),
                why,
                frame,
                packet: rest,
            })),
        ]
    }

    fn new_source(&self, packet: &Value) -> Vec<Effect> {
        match Source::from_form(&packet["source"]) {
            Some(source) if source.is_ignored() => {
                trace!("Ignoring source {:?}", source.url);
                vec![]
            }
            Some(source) => vec![Effect::Notify(Action::NewSource(source))],
            None => {
                warn!("Can't understand new source: {}", packet);
                vec![]
            }
        }
    }

    fn tab_navigated(&self, packet: &Value) -> Vec<Effect> {
        match packet["state"].as_str() {
            Some("start") => vec![Effect::Notify(Action::WillNavigate(packet.clone()))],
            Some("stop") => vec![Effect::Notify(Action::Navigate(packet.clone()))],
            _ => vec![],
        }
    }
}

/// Dispatch every event until the subscription ends
///
/// Frames are loaded in their own task so the UI can see the frames and the pause in
/// either order.
pub async fn run(
    dispatcher: EventDispatcher,
    client: RdpClient,
    thread: ThreadHandle,
    mut events: UnboundedReceiver<Value>,
    notifier: Notifier,
    frames_page_size: u64,
) {
    while let Some(packet) = events.recv().await {
        if let Some(state) = dispatcher.thread_state(&packet) {
            thread.set_state(state);
        }

        for effect in dispatcher.dispatch(&packet) {
            match effect {
                Effect::Notify(action) => notifier.send_msg(action).await,
                Effect::LoadFrames(thread_actor) => {
                    let client = client.clone();
                    let notifier = notifier.clone();
                    tokio::spawn(async move {
                        match fetch_frames(&client, &thread_actor, 0, frames_page_size).await {
                            Ok(frames) => notifier.send_msg(Action::LoadedFrames(frames)).await,
                            Err(e) => warn!("Can't load frames for {}: {}", thread_actor, e),
                        }
                    });
                }
            }
        }
    }

    debug!("Event subscription ended");
}
