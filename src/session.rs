//! Session
//!
//! One connection to a debugger server along with the tab and thread we're attached to and
//! the breakpoints set on that thread. Everything a UI does goes through a `Session`.

use std::sync::{Arc, Mutex};

use crate::breakpoints::BreakpointRegistry;
use crate::client::{Endpoint, RdpClient};
use crate::config::Config;
use crate::error::PadreError;
use crate::events::{self, EventDispatcher};
use crate::notifier::{Action, Notifier};
use crate::types::{Target, ThreadState};
use crate::Result;

use serde_json::json;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// The tab we're attached to
#[derive(Clone, Debug)]
pub(crate) struct TabTarget {
    pub(crate) actor: String,
    pub(crate) console_actor: Option<String>,
}

/// The thread we're attached to along with its last known state
#[derive(Clone, Debug)]
pub struct ThreadHandle {
    actor: String,
    state: Arc<Mutex<ThreadState>>,
}

impl ThreadHandle {
    pub fn new(actor: String, state: ThreadState) -> Self {
        ThreadHandle {
            actor,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn state(&self) -> ThreadState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: ThreadState) {
        *self.state.lock().unwrap() = state;
    }
}

#[derive(Debug)]
pub(crate) struct Attached {
    pub(crate) target: TabTarget,
    pub(crate) thread: ThreadHandle,
}

#[derive(Debug)]
pub struct Session {
    config: Config,
    client: Option<RdpClient>,
    attached: Option<Attached>,
    pub(crate) breakpoints: Mutex<BreakpointRegistry>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Session {
            config,
            client: None,
            attached: None,
            breakpoints: Mutex::new(BreakpointRegistry::new()),
            dispatcher: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> Option<&RdpClient> {
        self.client.as_ref()
    }

    pub fn thread(&self) -> Option<&ThreadHandle> {
        self.attached.as_ref().map(|a| &a.thread)
    }

    /// Actor of the attached tab
    pub fn target_id(&self) -> Option<&str> {
        self.attached.as_ref().map(|a| a.target.actor.as_str())
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Number of breakpoints currently set
    pub fn breakpoint_count(&self) -> usize {
        self.breakpoints.lock().unwrap().len()
    }

    /// Connect to the debugger server and list the tabs it has
    ///
    /// A server that doesn't greet us within the handshake timeout has no tabs for us, that's
    /// not an error. Connecting again drops everything from the last connection.
    pub async fn connect(&mut self, endpoint: &str) -> Result<Vec<Target>> {
        let endpoint = Endpoint::parse(endpoint)?;
        let (client, greeting) = RdpClient::open(&endpoint).await?;

        self.stop_dispatcher();
        self.attached = None;
        self.breakpoints.lock().unwrap().clear();
        self.client = Some(client.clone());

        let handshake_timeout = self.config.handshake_timeout();
        let greeting = match timeout(handshake_timeout, greeting).await {
            Err(_) => {
                info!(
                    "No greeting from {:?} after {:?}, assuming there are no targets",
                    endpoint, handshake_timeout
                );
                return Ok(vec![]);
            }
            Ok(Err(_)) => {
                return Err(PadreError::Handshake(Box::new(
                    PadreError::ConnectionClosed,
                )))
            }
            Ok(Ok(Err(e))) => return Err(PadreError::Handshake(Box::new(e))),
            Ok(Ok(Ok(greeting))) => greeting,
        };

        debug!("Handshake complete: {}", greeting);

        list_tabs(&client).await
    }

    /// List the tabs on the server we're connected to
    pub async fn list_tabs(&self) -> Result<Vec<Target>> {
        let client = self.client.as_ref().ok_or(PadreError::NotConnected)?;
        list_tabs(client).await
    }

    /// Attach to a tab and its thread, leaving the thread running
    ///
    /// Whatever was attached before is left alone, call `destroy_target` first to detach it.
    /// Dropping the session detaches from the tab.
    pub async fn connect_tab(&mut self, target: &Target) -> Result<()> {
        let client = self.client.clone().ok_or(PadreError::NotConnected)?;

        let tab_actor = target.id().to_string();
        let console_actor = target.tab()["consoleActor"].as_str().map(String::from);

        let reply = client.request(&tab_actor, "attach", json!({})).await?;
        let thread_actor = match reply["threadActor"].as_str() {
            Some(actor) => actor.to_string(),
            None => {
                return Err(PadreError::Attach(format!(
                    "Tab {} didn't give us a thread actor",
                    tab_actor
                )))
            }
        };

        client
            .request(&thread_actor, "attach", json!({"options": {}}))
            .await?;
        let thread = ThreadHandle::new(thread_actor, ThreadState::Paused);

        client.request(thread.actor(), "resume", json!({})).await?;
        thread.set_state(ThreadState::Running);

        self.stop_dispatcher();
        self.breakpoints.lock().unwrap().clear();
        self.attached = Some(Attached {
            target: TabTarget {
                actor: tab_actor,
                console_actor,
            },
            thread,
        });

        info!("Attached to {} ({})", target.title(), target.url());

        Ok(())
    }

    /// Start telling the UI what happens on the attached thread and tab
    ///
    /// Asks the server for its sources once, they arrive as `NewSource` actions.
    pub async fn init_page(&mut self, actions: Sender<Action>) -> Result<()> {
        let (client, attached) = self.active()?;
        let client = client.clone();
        let thread = attached.thread.clone();
        let dispatcher =
            EventDispatcher::new(thread.actor().to_string(), attached.target.actor.clone());

        self.stop_dispatcher();
        let events = client.subscribe();
        self.dispatcher = Some(tokio::spawn(events::run(
            dispatcher,
            client.clone(),
            thread.clone(),
            events,
            Notifier::new(actions),
            self.config.frames_page_size(),
        )));

        client.request(thread.actor(), "sources", json!({})).await?;

        Ok(())
    }

    /// Detach from the tab, does nothing if nothing's attached
    pub async fn destroy_target(&mut self) -> Result<()> {
        let attached = match self.attached.take() {
            Some(attached) => attached,
            None => return Ok(()),
        };

        self.stop_dispatcher();
        self.breakpoints.lock().unwrap().clear();

        if let Some(client) = &self.client {
            client
                .request(&attached.target.actor, "detach", json!({}))
                .await?;
            info!("Detached from {}", attached.target.actor);
        }

        Ok(())
    }

    /// The client and attachment every thread command needs
    pub(crate) fn active(&self) -> Result<(&RdpClient, &Attached)> {
        let attached = self.attached.as_ref().ok_or(PadreError::NotAttached)?;
        let client = self.client.as_ref().ok_or(PadreError::NotConnected)?;
        Ok((client, attached))
    }

    fn stop_dispatcher(&mut self) {
        if let Some(handle) = self.dispatcher.take() {
            handle.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_dispatcher();

        if let (Some(client), Some(attached)) = (&self.client, &self.attached) {
            debug!("Detaching from {}", attached.target.actor);
            let packet = json!({"to": attached.target.actor, "type": "detach"});
            if let Err(e) = client.send_packet(packet) {
                debug!("Can't detach from {}: {}", attached.target.actor, e);
            }
        }
    }
}

async fn list_tabs(client: &RdpClient) -> Result<Vec<Target>> {
    let reply = client.request("root", "listTabs", json!({})).await?;

    let tabs = match reply["tabs"].as_array() {
        Some(tabs) => tabs,
        None => {
            return Err(PadreError::InvalidResponse(format!(
                "No tabs in listTabs reply {}",
                reply
            )))
        }
    };

    Ok(tabs
        .iter()
        .filter_map(|tab| {
            let target = Target::from_tab(tab.clone());
            if target.is_none() {
                warn!("Ignoring tab without an actor: {}", tab);
            }
            target
        })
        .collect())
}
