//! Message dispatcher.
//!
//! All channels push into one queue. The dispatcher routes each message to a
//! lane task keyed by session, so one session's messages are handled strictly
//! in arrival order while different sessions proceed in parallel.
//!
//! A lane whose session has been quiet for the idle timeout, with nothing
//! queued or in progress, is closed; the session's next message opens a new
//! one. Only the dispatcher enqueues, so closing never races a send.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sheetcol_common::logging::generate_request_id;
use sheetcol_common::util::mask_bot_tokens;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use crate::message::ChannelMessage;
use crate::traits::{Channel, MessageHandler};

/// How long a session lane may sit unused before it is closed.
pub const LANE_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Handle to a running dispatcher.
pub struct Dispatcher {
    task: JoinHandle<()>,
    open_lanes: Arc<AtomicUsize>,
}

impl Dispatcher {
    /// Sessions that currently have a lane.
    pub fn open_lanes(&self) -> usize {
        self.open_lanes.load(Ordering::SeqCst)
    }

    /// Wait until the queue is closed and every lane has drained.
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

struct Lane {
    tx: mpsc::UnboundedSender<ChannelMessage>,
    /// Messages queued on the lane or being handled.
    in_flight: Arc<AtomicUsize>,
    last_used: Instant,
}

impl Lane {
    fn is_idle(&self, idle_timeout: Duration) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0 && self.last_used.elapsed() >= idle_timeout
    }
}

/// Spawn the dispatcher for `channel` with the default lane idle timeout.
///
/// The dispatcher ends once every sender of `rx` is dropped and all lanes
/// have drained their queued messages.
pub fn spawn_dispatcher<C, H>(
    channel: Arc<C>,
    handler: Arc<H>,
    rx: mpsc::UnboundedReceiver<ChannelMessage>,
) -> Dispatcher
where
    C: Channel + 'static,
    H: MessageHandler + 'static,
{
    spawn_dispatcher_with_idle_timeout(channel, handler, rx, LANE_IDLE_TIMEOUT)
}

pub fn spawn_dispatcher_with_idle_timeout<C, H>(
    channel: Arc<C>,
    handler: Arc<H>,
    rx: mpsc::UnboundedReceiver<ChannelMessage>,
    idle_timeout: Duration,
) -> Dispatcher
where
    C: Channel + 'static,
    H: MessageHandler + 'static,
{
    let open_lanes = Arc::new(AtomicUsize::new(0));
    let task = tokio::spawn(run(channel, handler, rx, idle_timeout, open_lanes.clone()));
    Dispatcher { task, open_lanes }
}

async fn run<C, H>(
    channel: Arc<C>,
    handler: Arc<H>,
    mut rx: mpsc::UnboundedReceiver<ChannelMessage>,
    idle_timeout: Duration,
    open_lanes: Arc<AtomicUsize>,
) where
    C: Channel + 'static,
    H: MessageHandler + 'static,
{
    tracing::info!(channel = channel.name(), "Dispatcher started");

    let mut lanes: HashMap<String, Lane> = HashMap::new();
    let mut tasks = JoinSet::new();
    let mut sweep = tokio::time::interval((idle_timeout / 2).max(Duration::from_millis(10)));
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(message) = received else { break };
                route(message, &mut lanes, &mut tasks, &channel, &handler);
            }
            _ = sweep.tick() => close_idle_lanes(&mut lanes, idle_timeout),
            Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = finished {
                    tracing::error!(error = %e, "Session lane panicked");
                }
            }
        }
        open_lanes.store(lanes.len(), Ordering::SeqCst);
    }

    drop(lanes);
    open_lanes.store(0, Ordering::SeqCst);
    while let Some(finished) = tasks.join_next().await {
        if let Err(e) = finished {
            tracing::error!(error = %e, "Session lane panicked");
        }
    }

    tracing::info!("Dispatcher stopped");
}

fn route<C, H>(
    mut message: ChannelMessage,
    lanes: &mut HashMap<String, Lane>,
    tasks: &mut JoinSet<()>,
    channel: &Arc<C>,
    handler: &Arc<H>,
) where
    C: Channel + 'static,
    H: MessageHandler + 'static,
{
    let key = message.session_key();

    // A lane only refuses a message if its task died; the retry gets a fresh lane.
    for _ in 0..2 {
        let lane = lanes.entry(key.clone()).or_insert_with(|| {
            let (tx, lane_rx) = mpsc::unbounded_channel();
            let in_flight = Arc::new(AtomicUsize::new(0));
            tasks.spawn(run_lane(
                key.clone(),
                channel.clone(),
                handler.clone(),
                lane_rx,
                in_flight.clone(),
            ));
            Lane {
                tx,
                in_flight,
                last_used: Instant::now(),
            }
        });

        lane.in_flight.fetch_add(1, Ordering::SeqCst);
        lane.last_used = Instant::now();
        match lane.tx.send(message) {
            Ok(()) => return,
            Err(mpsc::error::SendError(returned)) => {
                tracing::error!(session = %key, "Session lane closed unexpectedly");
                lanes.remove(&key);
                message = returned;
            }
        }
    }

    tracing::error!(session = %key, "No session lane available, dropping message");
}

fn close_idle_lanes(lanes: &mut HashMap<String, Lane>, idle_timeout: Duration) {
    let before = lanes.len();
    lanes.retain(|_, lane| !lane.is_idle(idle_timeout));

    let closed = before - lanes.len();
    if closed > 0 {
        tracing::debug!(closed, open = lanes.len(), "Closed idle session lanes");
    }
}

async fn run_lane<C, H>(
    session: String,
    channel: Arc<C>,
    handler: Arc<H>,
    mut rx: mpsc::UnboundedReceiver<ChannelMessage>,
    in_flight: Arc<AtomicUsize>,
) where
    C: Channel,
    H: MessageHandler,
{
    tracing::debug!(session = %session, "Session lane opened");

    while let Some(message) = rx.recv().await {
        let span = tracing::info_span!(
            "message",
            request_id = %generate_request_id(),
            session = %session,
            message_id = %message.id
        );
        deliver(channel.as_ref(), handler.as_ref(), message)
            .instrument(span)
            .await;
        in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    tracing::debug!(session = %session, "Session lane closed");
}

async fn deliver<C, H>(channel: &C, handler: &H, message: ChannelMessage)
where
    C: Channel,
    H: MessageHandler,
{
    let replies = match handler.handle(message).await {
        Ok(replies) => replies,
        Err(e) => {
            tracing::error!(error = %mask_bot_tokens(&e.to_string()), "Failed to handle message");
            return;
        }
    };

    for reply in replies {
        if let Err(e) = channel.send(reply).await {
            tracing::error!(error = %mask_bot_tokens(&e.to_string()), "Failed to send reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lane(in_flight: usize, idle_for: Duration) -> Lane {
        let (tx, _rx) = mpsc::unbounded_channel();
        Lane {
            tx,
            in_flight: Arc::new(AtomicUsize::new(in_flight)),
            last_used: Instant::now() - idle_for,
        }
    }

    #[test]
    fn idle_sweep_spares_busy_and_recent_lanes() {
        let timeout = Duration::from_secs(1);
        let mut lanes = HashMap::from([
            ("telegram:quiet".to_string(), lane(0, timeout * 2)),
            ("telegram:busy".to_string(), lane(1, timeout * 2)),
            ("telegram:recent".to_string(), lane(0, Duration::ZERO)),
        ]);

        close_idle_lanes(&mut lanes, timeout);

        let mut open: Vec<&str> = lanes.keys().map(String::as_str).collect();
        open.sort_unstable();
        assert_eq!(open, ["telegram:busy", "telegram:recent"]);
    }
}
