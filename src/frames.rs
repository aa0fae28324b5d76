//! Frame synthesis
//!
//! Turns the frames the server sends, either in a pause packet or in reply to a `frames`
//! request, into the `Frame`s the UI shows.

use crate::error::PadreError;
use crate::types::{Callee, Frame, RawFrame};
use crate::Result;

/// Display name for a frame
///
/// Call frames are named after their callee, anything else after the frame type, so an eval
/// frame becomes `(eval)`.
pub fn display_name(kind: &str, callee: Option<&Callee>) -> String {
    if kind != "call" {
        return format!("({})", kind);
    }

    let callee = match callee {
        Some(c) => c,
        None => return "(anonymous)".to_string(),
    };

    let names = [&callee.name, &callee.user_display_name, &callee.display_name];

    names
        .iter()
        .filter_map(|name| name.as_deref())
        .find(|name| !name.is_empty())
        .map(|name| name.to_string())
        .unwrap_or_else(|| "(anonymous)".to_string())
}

/// Synthesize a UI frame from a raw one
pub fn synthesize(raw: &RawFrame) -> Result<Frame> {
    let location = raw.location.to_location().ok_or_else(|| {
        PadreError::InvalidResponse(format!("Frame {} has no source location", raw.actor))
    })?;

    Ok(Frame {
        id: raw.actor.clone(),
        display_name: display_name(&raw.kind, raw.callee.as_ref()),
        location,
        scope: raw.environment.clone(),
    })
}

/// Synthesize a UI frame straight from the JSON the server sent
pub fn synthesize_value(value: &serde_json::Value) -> Result<Frame> {
    let raw: RawFrame = serde_json::from_value(value.clone())?;
    synthesize(&raw)
}
