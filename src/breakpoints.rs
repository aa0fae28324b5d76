//! Breakpoint registry
//!
//! Keeps hold of every breakpoint the server has given us an actor for, keyed by that actor
//! which doubles as the id the UI knows the breakpoint by.

use std::collections::HashMap;

use crate::error::PadreError;
use crate::session::Session;
use crate::types::{BreakpointResult, Location, RawLocation, ThreadState};
use crate::Result;

use serde_json::json;
use tracing::{debug, info};

/// A live breakpoint on the server
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BreakpointHandle {
    actor: String,
    location: Location,
    condition: Option<String>,
}

impl BreakpointHandle {
    pub fn new(actor: String, location: Location, condition: Option<String>) -> Self {
        BreakpointHandle {
            actor,
            location,
            condition,
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Where the breakpoint actually ended up
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }
}

/// Reply to a `setBreakpoint` request
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointResponse {
    pub actor: String,
    #[serde(default)]
    pub actual_location: Option<RawLocation>,
    #[serde(default)]
    pub is_pending: bool,
}

/// Work out where a breakpoint really is
///
/// The server only reports a location when it moved the breakpoint, otherwise the breakpoint
/// is exactly where it was asked for.
pub fn merge_actual_location(requested: &Location, reported: Option<&RawLocation>) -> Location {
    match reported.and_then(|raw| raw.to_location()) {
        Some(location) => location,
        None => requested.clone(),
    }
}

#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    breakpoints: HashMap<String, BreakpointHandle>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        BreakpointRegistry {
            breakpoints: HashMap::new(),
        }
    }

    pub fn insert(&mut self, handle: BreakpointHandle) {
        self.breakpoints.insert(handle.actor.clone(), handle);
    }

    /// Remove the breakpoint, failing if there's nothing registered under `id`
    pub fn take(&mut self, id: &str) -> Result<BreakpointHandle> {
        self.breakpoints
            .remove(id)
            .ok_or_else(|| PadreError::BreakpointNotFound(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<&BreakpointHandle> {
        self.breakpoints.get(id)
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }
}

impl Session {
    /// Set a breakpoint, with a condition unless it's empty
    ///
    /// A running thread is interrupted while the breakpoint is set and resumed afterwards,
    /// whether or not setting it worked.
    pub async fn set_breakpoint(
        &self,
        location: &Location,
        condition: Option<&str>,
    ) -> Result<BreakpointResult> {
        let (client, attached) = self.active()?;
        let thread = &attached.thread;

        let interrupted = if thread.state() == ThreadState::Running {
            match client.request(thread.actor(), "interrupt", json!({})).await {
                Ok(_) => {
                    thread.set_state(ThreadState::Paused);
                    true
                }
                Err(PadreError::Protocol { ref error, .. }) if error == "wrongState" => {
                    debug!("Thread {} already paused", thread.actor());
                    thread.set_state(ThreadState::Paused);
                    false
                }
                Err(e) => return Err(e),
            }
        } else {
            false
        };

        let condition = condition.filter(|c| !c.is_empty());

        let mut params = json!({"location": {"line": location.line}});
        if let Some(column) = location.column {
            params["location"]["column"] = json!(column);
        }
        if let Some(condition) = condition {
            params["condition"] = json!(condition);
        }

        let reply = client
            .request(&location.source_id, "setBreakpoint", params)
            .await;

        let reply = if interrupted {
            let resumed = client.request(thread.actor(), "resume", json!({})).await;
            if resumed.is_ok() {
                thread.set_state(ThreadState::Running);
            }
            let reply = reply?;
            resumed?;
            reply
        } else {
            reply?
        };

        let response: SetBreakpointResponse = serde_json::from_value(reply)?;
        let actual_location = merge_actual_location(location, response.actual_location.as_ref());

        if response.is_pending {
            debug!("Breakpoint {} is pending", response.actor);
        }

        self.breakpoints.lock().unwrap().insert(BreakpointHandle::new(
            response.actor.clone(),
            actual_location.clone(),
            condition.map(String::from),
        ));

        info!(
            "Breakpoint {} set at {}:{}",
            response.actor, actual_location.source_id, actual_location.line
        );

        Ok(BreakpointResult {
            id: response.actor,
            actual_location,
        })
    }

    /// Remove a breakpoint
    ///
    /// It's gone from the registry before the server is asked to delete it, so removing the
    /// same breakpoint twice fails the second time even when the first is still in flight.
    pub async fn remove_breakpoint(&self, id: &str) -> Result<()> {
        let (client, _) = self.active()?;

        let handle = {
            let mut registry = self.breakpoints.lock().unwrap();
            registry.take(id)?
        };

        client.request(handle.actor(), "delete", json!({})).await?;

        info!("Breakpoint {} removed", id);

        Ok(())
    }

    /// The breakpoint registered under `id`
    pub fn breakpoint(&self, id: &str) -> Option<BreakpointHandle> {
        self.breakpoints.lock().unwrap().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        merge_actual_location, BreakpointHandle, BreakpointRegistry, SetBreakpointResponse,
    };
    use crate::error::PadreError;
    use crate::types::Location;

    fn requested() -> Location {
        Location::new("s1".to_string(), 10, Some(2))
    }

    #[test]
    fn check_location_kept_when_not_moved() {
        let response: SetBreakpointResponse =
            serde_json::from_value(serde_json::json!({"from": "s1", "actor": "bp-7"})).unwrap();

        let actual = merge_actual_location(&requested(), response.actual_location.as_ref());

        assert_eq!(actual, requested());
    }

    #[test]
    fn check_moved_location_used() {
        let response: SetBreakpointResponse = serde_json::from_value(serde_json::json!({
            "from": "s1",
            "actor": "bp-8",
            "actualLocation": {
                "source": {"actor": "s1-moved", "url": "http://a/x.js"},
                "line": 12,
                "column": 0
            }
        }))
        .unwrap();

        let actual = merge_actual_location(&requested(), response.actual_location.as_ref());

        assert_eq!(actual, Location::new("s1-moved".to_string(), 12, Some(0)));
    }

    #[test]
    fn check_take_clears_entry() {
        let mut registry = BreakpointRegistry::new();
        registry.insert(BreakpointHandle::new(
            "bp-7".to_string(),
            requested(),
            Some("x > 0".to_string()),
        ));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("bp-7").unwrap().condition(), Some("x > 0"));

        let handle = registry.take("bp-7").unwrap();
        assert_eq!(handle.actor(), "bp-7");
        assert!(registry.is_empty());

        match registry.take("bp-7") {
            Err(PadreError::BreakpointNotFound(id)) => assert_eq!(id, "bp-7"),
            _ => panic!("Expected BreakpointNotFound"),
        }
    }
}
