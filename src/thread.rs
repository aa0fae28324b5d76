//! Thread controller
//!
//! Commands run against the attached thread and tab. All of these fail with `NotAttached`
//! until `Session::connect_tab` has succeeded.

use crate::client::RdpClient;
use crate::error::PadreError;
use crate::frames;
use crate::session::Session;
use crate::types::{Frame, Properties, RawFrame, Source, SourceContents, ThreadState};
use crate::Result;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fetch `count` frames from the top of the stack of the paused thread
pub(crate) async fn fetch_frames(
    client: &RdpClient,
    thread_actor: &str,
    start: u64,
    count: u64,
) -> Result<Vec<Frame>> {
    let reply = client
        .request(thread_actor, "frames", json!({"start": start, "count": count}))
        .await?;

    let raw: Vec<RawFrame> = match reply.get("frames") {
        Some(frames) => serde_json::from_value(frames.clone())?,
        None => {
            return Err(PadreError::InvalidResponse(format!(
                "No frames in reply {}",
                reply
            )))
        }
    };

    Ok(raw
        .iter()
        .filter_map(|raw_frame| match frames::synthesize(raw_frame) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("Skipping frame: {}", e);
                None
            }
        })
        .collect())
}

impl Session {
    /// Let the thread run
    pub async fn resume(&self) -> Result<()> {
        self.resume_with_limit(None).await
    }

    pub async fn step_in(&self) -> Result<()> {
        self.resume_with_limit(Some("step")).await
    }

    pub async fn step_over(&self) -> Result<()> {
        self.resume_with_limit(Some("next")).await
    }

    pub async fn step_out(&self) -> Result<()> {
        self.resume_with_limit(Some("finish")).await
    }

    async fn resume_with_limit(&self, limit: Option<&str>) -> Result<()> {
        let (client, attached) = self.active()?;

        let params = match limit {
            Some(limit) => json!({"resumeLimit": {"type": limit}}),
            None => json!({}),
        };

        client
            .request(attached.thread.actor(), "resume", params)
            .await?;
        attached.thread.set_state(ThreadState::Running);

        Ok(())
    }

    /// Pause as soon as the next line of script runs
    pub async fn break_on_next(&self) -> Result<()> {
        let (client, attached) = self.active()?;

        client
            .request(attached.thread.actor(), "interrupt", json!({"when": "onNext"}))
            .await?;

        Ok(())
    }

    /// Pause whenever an exception is thrown, or only for uncaught ones
    pub async fn pause_on_exceptions(&self, pause: bool, ignore_caught: bool) -> Result<()> {
        let (client, attached) = self.active()?;

        client
            .request(
                attached.thread.actor(),
                "pauseOnExceptions",
                json!({
                    "pauseOnExceptions": pause,
                    "ignoreCaughtExceptions": ignore_caught,
                }),
            )
            .await?;

        Ok(())
    }

    /// Every source the thread knows about, besides the ones the UI never sees
    pub async fn get_sources(&self) -> Result<Vec<Source>> {
        let (client, attached) = self.active()?;

        let reply = client
            .request(attached.thread.actor(), "sources", json!({}))
            .await?;

        let sources = match reply["sources"].as_array() {
            Some(sources) => sources,
            None => {
                return Err(PadreError::InvalidResponse(format!(
                    "No sources in reply {}",
                    reply
                )))
            }
        };

        Ok(sources
            .iter()
            .filter_map(Source::from_form)
            .filter(|source| !source.is_ignored())
            .collect())
    }

    /// Frames `start` to `start + count` of the paused thread
    pub async fn frames(&self, start: u64, count: u64) -> Result<Vec<Frame>> {
        let (client, attached) = self.active()?;
        fetch_frames(client, attached.thread.actor(), start, count).await
    }

    /// Text of a source, fetching the whole of it when the server sends it as a long string
    pub async fn source_contents(&self, source_id: &str) -> Result<SourceContents> {
        let (client, _) = self.active()?;

        let reply = client.request(source_id, "source", json!({})).await?;
        let content_type = reply["contentType"].as_str().map(String::from);

        let text = match &reply["source"] {
            Value::String(text) => text.clone(),
            Value::Object(grip) if grip.get("type") == Some(&json!("longString")) => {
                let actor = grip.get("actor").and_then(Value::as_str);
                let length = grip.get("length").and_then(Value::as_u64);
                let (actor, length) = match (actor, length) {
                    (Some(actor), Some(length)) => (actor, length),
                    _ => {
                        return Err(PadreError::InvalidResponse(format!(
                            "Can't understand long string {}",
                            reply["source"]
                        )))
                    }
                };

                debug!("Fetching {} characters of source {}", length, source_id);

                let substring = client
                    .request(actor, "substring", json!({"start": 0, "end": length}))
                    .await?;
                match substring["substring"].as_str() {
                    Some(text) => text.to_string(),
                    None => {
                        return Err(PadreError::InvalidResponse(format!(
                            "No substring in reply {}",
                            substring
                        )))
                    }
                }
            }
            other => {
                return Err(PadreError::InvalidResponse(format!(
                    "Can't understand source text {}",
                    other
                )))
            }
        };

        Ok(SourceContents { text, content_type })
    }

    /// Evaluate a script in the tab, giving up with `Cancelled` if `cancel` fires first
    ///
    /// The server evaluates it regardless, only our wait for the result is cancelled.
    pub async fn evaluate(&self, script: &str, cancel: CancellationToken) -> Result<Value> {
        let (client, attached) = self.active()?;

        let console = match &attached.target.console_actor {
            Some(console) => console,
            None => {
                return Err(PadreError::Attach(format!(
                    "Tab {} has no console to evaluate in",
                    attached.target.actor
                )))
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Evaluation cancelled");
                Err(PadreError::Cancelled)
            }
            reply = client.request(console, "evaluateJS", json!({"text": script})) => reply,
        }
    }

    /// Send the tab to `url`
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let (client, attached) = self.active()?;

        client
            .request(&attached.target.actor, "navigateTo", json!({"url": url}))
            .await?;

        Ok(())
    }

    /// The prototype and own properties of an object grip
    pub async fn get_properties(&self, grip: &Value) -> Result<Properties> {
        let (client, _) = self.active()?;

        let actor = match grip["actor"].as_str() {
            Some(actor) => actor,
            None => {
                warn!("Asked for properties of {}", grip);
                return Err(PadreError::InvalidGrip(grip.to_string()));
            }
        };

        let reply = client
            .request(actor, "prototypeAndProperties", json!({}))
            .await?;

        Ok(serde_json::from_value(reply)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::PadreError;
    use crate::session::Session;

    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn check_thread_commands_need_attachment() {
        let session = Session::new(Config::new());

        assert!(matches!(session.step_in().await, Err(PadreError::NotAttached)));
        assert!(matches!(session.get_sources().await, Err(PadreError::NotAttached)));
        assert!(matches!(
            session.evaluate("1 + 1", CancellationToken::new()).await,
            Err(PadreError::NotAttached)
        ));
    }
}
