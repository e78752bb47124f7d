//! Output side of subscriber connections.
//!
//! A subscriber is only accepted on a response channel that can push bytes to
//! the client incrementally. That capability is the [`Flush`] trait: a
//! [`ResponseChannel`] hands out a [`StreamingSink`] only if it can stream.

use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Writable half of a subscriber connection.
pub trait EventSink: Send {
    /// Append `frame` to the outgoing stream.
    fn write(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// Capability to push written bytes to the peer immediately.
pub trait Flush {
    /// Deliver everything written so far.
    fn flush(&mut self) -> io::Result<()>;
}

/// A sink that can deliver frames incrementally.
pub trait StreamingSink: EventSink + Flush {}

impl<T: EventSink + Flush> StreamingSink for T {}

/// Response channel a subscriber is accepted on.
pub trait ResponseChannel {
    /// Convert into a streaming sink.
    ///
    /// Returns `None` when the channel can only deliver a complete response.
    fn into_streaming(self) -> Option<Box<dyn StreamingSink>>;
}

/// Flushed chunks a subscriber may have queued before it counts as stalled.
pub const FRAME_BUFFER: usize = 16;

/// Sink feeding an HTTP response body through a bounded channel.
///
/// Writes are buffered and handed to the body as one chunk per flush, so a
/// frame always reaches the client whole. Once the body is dropped every
/// write and flush fails with [`io::ErrorKind::BrokenPipe`]. A flush never
/// waits: if [`FRAME_BUFFER`] chunks are still unread it fails with
/// [`io::ErrorKind::WouldBlock`].
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
    buf: BytesMut,
}

/// Create a connected sink and response body stream.
#[must_use]
pub fn channel() -> (ChannelSink, EventStream) {
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    let sink = ChannelSink {
        tx,
        buf: BytesMut::new(),
    };
    let stream = EventStream {
        frames: rx,
        cancel_on_drop: None,
    };
    (sink, stream)
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "subscriber disconnected")
}

impl EventSink for ChannelSink {
    fn write(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.tx.is_closed() {
            return Err(disconnected());
        }
        self.buf.extend_from_slice(frame);
        Ok(())
    }
}

impl Flush for ChannelSink {
    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.tx.try_send(chunk).map_err(|e| match e {
            TrySendError::Full(_) => {
                io::Error::new(io::ErrorKind::WouldBlock, "subscriber not reading")
            }
            TrySendError::Closed(_) => disconnected(),
        })
    }
}

impl ResponseChannel for ChannelSink {
    fn into_streaming(self) -> Option<Box<dyn StreamingSink>> {
        Some(Box::new(self))
    }
}

/// Response body for an event stream.
///
/// Yields each flushed chunk and ends once the sink is gone. Dropping the
/// stream (client disconnect, server shutdown) cancels the attached token.
#[derive(Debug)]
pub struct EventStream {
    frames: mpsc::Receiver<Bytes>,
    cancel_on_drop: Option<DropGuard>,
}

impl EventStream {
    /// Cancel `token` when this stream is dropped.
    #[must_use]
    pub fn cancel_on_drop(mut self, token: CancellationToken) -> Self {
        self.cancel_on_drop = Some(token.drop_guard());
        self
    }
}

impl Stream for EventStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.frames.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}
