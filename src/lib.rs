//! PADRE Firefox
//!
//! Adapts the Firefox remote debugging protocol for PADRE. A `Session` connects to a
//! debugger server, lists its tabs and attaches to one, after which the attached thread can
//! be stepped, breakpoints set and scripts evaluated. Anything the thread or tab does of its
//! own accord is reported as an `Action` on the channel handed to `Session::init_page`.

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate serde_derive;

pub mod breakpoints;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod frames;
pub mod notifier;
pub mod session;
pub mod thread;
pub mod types;

pub use crate::breakpoints::{merge_actual_location, BreakpointHandle, BreakpointRegistry};
pub use crate::config::Config;
pub use crate::error::PadreError;
pub use crate::notifier::Action;
pub use crate::session::Session;
pub use crate::types::{
    BreakpointResult, Frame, Location, Pause, PauseReason, Properties, Source, SourceContents,
    Target, ThreadState,
};
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, PadreError>;
