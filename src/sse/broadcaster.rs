//! Publish/subscribe fan-out for server-sent events.
//!
//! # Responsibilities
//! - Keep the live subscriber set
//! - Deliver each notification to a snapshot of that set
//! - Turn a subscription into a `text/event-stream` body with a heartbeat
//!
//! # Design Decisions
//! - Subscribers are plain callbacks; `Subscription` unsubscribes on drop
//! - Every SSE connection owns its subscription and heartbeat timer, so
//!   dropping the body stream tears both down
//! - `close` ends every open stream; the server calls it on shutdown because
//!   graceful shutdown waits for bodies that would otherwise never finish
//! - Each connection buffers a bounded number of frames. A peer that falls
//!   that far behind is disconnected
//! - Payloads are encoded once per connection as envelope JSON; binary
//!   values cannot travel over SSE and are skipped with a warning

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, Sleep};

use crate::codec::{self, Value};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Heartbeat frame, also sent as soon as a stream opens.
pub const PONG_FRAME: &[u8] = b"data:pong\n\n";

/// Frames queued per connection before the peer counts as stalled.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

struct Inner {
    subscribers: DashMap<u64, Callback>,
    next_id: AtomicU64,
    heartbeat: Duration,
    event_buffer: usize,
    closed: watch::Sender<bool>,
}

impl Inner {
    fn notify(&self, value: &Value) {
        let snapshot: Vec<Callback> = self
            .subscribers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for callback in snapshot {
            callback(value);
        }
        metrics::record_sse_event();
    }
}

/// Shared subscriber set. Cloning shares the set.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    pub fn new(heartbeat: Duration) -> Self {
        Self::with_event_buffer(heartbeat, DEFAULT_EVENT_BUFFER)
    }

    /// Like `new`, queueing at most `event_buffer` frames per connection.
    pub fn with_event_buffer(heartbeat: Duration, event_buffer: usize) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
                heartbeat,
                event_buffer: event_buffer.max(1),
                closed,
            }),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.inner.heartbeat
    }

    /// End every open event stream. Streams opened afterwards end at once.
    pub fn close(&self) {
        if !self.inner.closed.send_replace(true) {
            tracing::info!(
                subscribers = self.subscriber_count(),
                "Closing event streams"
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Call `close` once `shutdown` triggers.
    pub fn close_on(&self, shutdown: &Shutdown) -> JoinHandle<()> {
        let broadcaster = self.clone();
        let signal = shutdown.wait();
        tokio::spawn(async move {
            signal.await;
            broadcaster.close();
        })
    }

    /// Register `callback`; it stays subscribed until the handle is dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.insert(id, Arc::new(callback));
        metrics::record_sse_subscribers(self.inner.subscribers.len());
        tracing::debug!(subscription = id, "SSE subscriber added");

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Call every current subscriber with `value`.
    ///
    /// Subscribers added or removed while this runs are not affected by it.
    pub fn notify(&self, value: &Value) {
        self.inner.notify(value);
    }

    pub fn notifier(&self) -> Notifier {
        Notifier {
            inner: self.inner.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Body stream for one SSE connection.
    pub fn event_stream(&self) -> EventStream {
        let (tx, rx) = mpsc::channel::<Bytes>(self.inner.event_buffer);
        let stalled = Arc::new(AtomicBool::new(false));

        let flag = stalled.clone();
        let subscription = self.subscribe(move |value| match codec::encode_json(value) {
            Ok(json) => match tx.try_send(Bytes::from(format!("data:{}\n\n", json))) {
                Err(TrySendError::Full(_)) if !flag.swap(true, Ordering::Relaxed) => {
                    tracing::warn!("SSE peer is not reading; disconnecting it");
                }
                _ => {}
            },
            Err(err) => tracing::warn!(error = %err, "Dropping SSE event that cannot be encoded"),
        });

        let state = StreamState {
            rx,
            closed: self.inner.closed.subscribe(),
            stalled,
            heartbeat: Box::pin(sleep(self.inner.heartbeat)),
            interval: self.inner.heartbeat,
            opened: false,
            _subscription: subscription,
        };

        let frames = stream::unfold(state, |mut state| async move {
            if *state.closed.borrow() || state.stalled.load(Ordering::Relaxed) {
                return None;
            }

            let frame = if !state.opened {
                state.opened = true;
                Bytes::from_static(PONG_FRAME)
            } else {
                tokio::select! {
                    frame = state.rx.recv() => match frame {
                        Some(frame) => frame,
                        None => return None,
                    },
                    _ = state.heartbeat.as_mut() => Bytes::from_static(PONG_FRAME),
                    _ = wait_closed(&mut state.closed) => return None,
                }
            };

            let deadline = Instant::now() + state.interval;
            state.heartbeat.as_mut().reset(deadline);
            Some((Ok(frame), state))
        });

        EventStream {
            frames: frames.boxed(),
        }
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.subscriber_count())
            .field("heartbeat", &self.inner.heartbeat)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Cloneable handle for pushing events from anywhere.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<Inner>,
}

impl Notifier {
    pub fn notify(&self, value: &Value) {
        self.inner.notify(value);
    }
}

/// Membership in the subscriber set. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.remove(&self.id);
            metrics::record_sse_subscribers(inner.subscribers.len());
            tracing::debug!(subscription = self.id, "SSE subscriber removed");
        }
    }
}

/// Resolves once the broadcaster is closed or gone.
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

struct StreamState {
    rx: mpsc::Receiver<Bytes>,
    closed: watch::Receiver<bool>,
    stalled: Arc<AtomicBool>,
    heartbeat: Pin<Box<Sleep>>,
    interval: Duration,
    opened: bool,
    _subscription: Subscription,
}

/// `text/event-stream` frames for one connection.
pub struct EventStream {
    frames: BoxStream<'static, Result<Bytes, Infallible>>,
}

impl Stream for EventStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.frames.poll_next_unpin(cx)
    }
}
