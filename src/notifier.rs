//! Notifier
//!
//! This module contains the actions the UI is told about and the means of telling it.

use crate::types::{Frame, Pause, Source};

use tokio::sync::mpsc::Sender;
use tracing::debug;

/// Something that happened on the thread or target that the UI should hear about
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Paused(Pause),
    Resumed(serde_json::Value),
    NewSource(Source),
    LoadedFrames(Vec<Frame>),
    WillNavigate(serde_json::Value),
    Navigate(serde_json::Value),
}

impl Action {
    /// The name the UI knows this action by
    pub fn name(&self) -> &'static str {
        match self {
            Action::Paused(_) => "paused",
            Action::Resumed(_) => "resumed",
            Action::NewSource(_) => "newSource",
            Action::LoadedFrames(_) => "loadedFrames",
            Action::WillNavigate(_) => "willNavigate",
            Action::Navigate(_) => "navigate",
        }
    }
}

/// The `Notifier` wraps the sender handed to us by the UI.
#[derive(Clone, Debug)]
pub struct Notifier {
    sender: Sender<Action>,
}

impl Notifier {
    pub fn new(sender: Sender<Action>) -> Self {
        Notifier { sender }
    }

    /// Send the action to the UI
    ///
    /// The UI going away isn't an error for us, the action is just dropped.
    pub async fn send_msg(&self, action: Action) {
        let name = action.name();
        if let Err(e) = self.sender.send(action).await {
            debug!("Notifier can't send {} action: {}", name, e);
        }
    }
}
