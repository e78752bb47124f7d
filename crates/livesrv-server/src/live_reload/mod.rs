//! Live reload system.
//!
//! Keeps a registry of open event streams and tells every connected browser
//! to reload when `/sse/reload` is hit or, optionally, when a watched file
//! changes.

mod broker;
mod debouncer;
mod sink;
mod subscriber;
mod trigger;
mod watcher;

pub use broker::{BroadcastReport, Broker, ClientKey, Connection, RELOAD_FRAME};
pub use sink::{
    ChannelSink, EventSink, EventStream, FRAME_BUFFER, Flush, ResponseChannel, StreamingSink,
    channel,
};
pub use subscriber::Subscription;
pub use watcher::WatchError;

pub(crate) use subscriber::sse_handler;
pub(crate) use trigger::reload_handler;
pub(crate) use watcher::FileWatcher;
