//! Domain model
//!
//! The UI facing types the adapter produces, along with the raw wire records they're built
//! from.

use serde_json::{Map, Value};

/// Source URLs that are never surfaced to the UI: evaluation scratch buffers and the
/// engine's internal string bundles.
pub const IGNORED_SOURCE_URLS: [&str; 2] = ["debugger eval code", "XStringBundle"];

/// A position in a source
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub source_id: String,
    pub line: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u64>,
}

impl Location {
    pub fn new(source_id: String, line: u64, column: Option<u64>) -> Self {
        Location {
            source_id,
            line,
            column,
        }
    }
}

/// Something we can attach to, normally a browser tab
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Target {
    title: String,
    url: String,
    id: String,
    tab: Value,
    browser: String,
}

impl Target {
    /// Create a target from a tab record as returned by `listTabs`
    ///
    /// Returns None when the record doesn't name the tab's actor.
    pub fn from_tab(tab: Value) -> Option<Self> {
        let id = tab["actor"].as_str()?.to_string();
        let title = tab["title"].as_str().unwrap_or("").to_string();
        let url = tab["url"].as_str().unwrap_or("").to_string();

        Some(Target {
            title,
            url,
            id,
            tab,
            browser: "firefox".to_string(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The raw tab record
    pub fn tab(&self) -> &Value {
        &self.tab
    }

    pub fn browser(&self) -> &str {
        &self.browser
    }
}

/// A script known to the thread
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub url: Option<String>,
}

impl Source {
    /// Create a source from a source form, None if it has no actor
    pub fn from_form(form: &Value) -> Option<Self> {
        Some(Source {
            id: form["actor"].as_str()?.to_string(),
            url: form["url"].as_str().map(|s| s.to_string()),
        })
    }

    /// Whether the UI should ever be told about this source
    pub fn is_ignored(&self) -> bool {
        match &self.url {
            Some(url) => IGNORED_SOURCE_URLS.contains(&url.as_str()),
            None => false,
        }
    }
}

/// The text of a source
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContents {
    pub text: String,
    pub content_type: Option<String>,
}

/// A stack frame as shown to the UI
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub id: String,
    pub display_name: String,
    pub location: Location,
    pub scope: Value,
}

/// Why the thread stopped
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseReason {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub on_next: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A pause of the thread as shown to the UI
///
/// `packet` is the pause packet as received except for its `frame`, which has been replaced
/// by the synthesized `frame` here.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Pause {
    pub thread: String,
    pub why: PauseReason,
    pub frame: Option<Frame>,
    pub packet: Value,
}

/// The result of setting a breakpoint
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointResult {
    pub id: String,
    pub actual_location: Location,
}

/// An objects prototype and own properties
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Properties {
    #[serde(default)]
    pub prototype: Value,
    #[serde(default)]
    pub own_properties: Map<String, Value>,
    #[serde(default)]
    pub safe_getter_values: Map<String, Value>,
}

/// Run state of an attached thread
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThreadState {
    Running,
    Paused,
    Detached,
}

/// Reference to a source actor inside a wire location
#[derive(Clone, Debug, Deserialize)]
pub struct SourceRef {
    pub actor: String,
}

/// A location as the server sends it, the source is either nested or flattened into the
/// location depending on the server version.
#[derive(Clone, Debug, Deserialize)]
pub struct RawLocation {
    #[serde(default)]
    pub source: Option<SourceRef>,
    #[serde(default)]
    pub actor: Option<String>,
    pub line: u64,
    #[serde(default)]
    pub column: Option<u64>,
}

impl RawLocation {
    /// Flatten into a `Location`, None when no source actor is given
    pub fn to_location(&self) -> Option<Location> {
        let source_id = match (&self.source, &self.actor) {
            (Some(source), _) => source.actor.clone(),
            (None, Some(actor)) => actor.clone(),
            (None, None) => return None,
        };

        Some(Location::new(source_id, self.line, self.column))
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Callee {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_display_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A frame as the server sends it
#[derive(Clone, Debug, Deserialize)]
pub struct RawFrame {
    pub actor: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub callee: Option<Callee>,
    #[serde(rename = "where")]
    pub location: RawLocation,
    #[serde(default)]
    pub environment: Value,
}

#[cfg(test)]
mod tests {
    use super::{Location, RawLocation, Source, Target};

    #[test]
    fn check_target_from_tab() {
        let tab = serde_json::json!({
            "actor": "server1.conn0.tab1",
            "title": "Todos",
            "url": "http://localhost:8000/todomvc",
            "consoleActor": "server1.conn0.console1"
        });

        let target = Target::from_tab(tab.clone()).unwrap();

        assert_eq!(target.id(), "server1.conn0.tab1");
        assert_eq!(target.title(), "Todos");
        assert_eq!(target.url(), "http://localhost:8000/todomvc");
        assert_eq!(target.browser(), "firefox");
        assert_eq!(target.tab(), &tab);
    }

    #[test]
    fn check_target_needs_actor() {
        let tab = serde_json::json!({"title": "Todos", "url": "about:blank"});
        assert_eq!(Target::from_tab(tab), None);
    }

    #[test]
    fn check_ignored_sources() {
        let ignored = ["debugger eval code", "XStringBundle"];
        for url in ignored.iter() {
            let source =
                Source::from_form(&serde_json::json!({"actor": "s1", "url": url})).unwrap();
            assert!(source.is_ignored());
        }

        let source =
            Source::from_form(&serde_json::json!({"actor": "s1", "url": "http://a/x.js"}))
                .unwrap();
        assert!(!source.is_ignored());

        let source = Source::from_form(&serde_json::json!({"actor": "s1", "url": null})).unwrap();
        assert!(!source.is_ignored());
    }

    #[test]
    fn check_raw_location_flattening() {
        let nested: RawLocation = serde_json::from_value(serde_json::json!({
            "source": {"actor": "s1", "url": "http://a/x.js"},
            "line": 4,
            "column": 2
        }))
        .unwrap();
        assert_eq!(
            nested.to_location(),
            Some(Location::new("s1".to_string(), 4, Some(2)))
        );

        let flat: RawLocation =
            serde_json::from_value(serde_json::json!({"actor": "s2", "line": 9})).unwrap();
        assert_eq!(
            flat.to_location(),
            Some(Location::new("s2".to_string(), 9, None))
        );

        let sourceless: RawLocation =
            serde_json::from_value(serde_json::json!({"line": 9})).unwrap();
        assert_eq!(sourceless.to_location(), None);
    }
}
