//! Lossy control-event queue between the signaling side and the render tick
//!
//! Any number of producers push [`ControlEvent`]s; the render tick drains
//! everything queued once per tick and folds it into a [`PointerState`].
//! A push against a full queue is dropped: pointer samples are advisory and
//! losing one is imperceptible, so producers never wait on the render thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// Fixed queue capacity
pub const INPUT_QUEUE_CAPACITY: usize = 128;

/// One discrete control delta
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlEvent {
    pub dx: i32,
    pub dy: i32,
    pub dz: i32,
}

impl ControlEvent {
    /// Pointer move
    pub fn movement(dx: i32, dy: i32) -> Self {
        Self { dx, dy, dz: 0 }
    }

    /// Wheel / zoom
    pub fn wheel(dz: i32) -> Self {
        Self { dx: 0, dy: 0, dz }
    }
}

/// Receiver of pointer and wheel deltas
pub trait InputSink {
    fn input_xy(&self, dx: i32, dy: i32);
    fn input_z(&self, dz: i32);
}

/// Accumulated pointer/zoom state owned by the render side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerState {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl PointerState {
    pub fn apply(&mut self, event: ControlEvent) {
        self.x = self.x.saturating_add(event.dx as i64);
        self.y = self.y.saturating_add(event.dy as i64);
        self.z = self.z.saturating_add(event.dz as i64);
    }
}

/// Create a connected sender/receiver pair
pub fn input_bridge() -> (InputSender, InputReceiver) {
    let (tx, rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        InputSender {
            tx,
            dropped: dropped.clone(),
        },
        InputReceiver { rx, dropped },
    )
}

/// Producer end, cloneable across threads
#[derive(Clone)]
pub struct InputSender {
    tx: mpsc::Sender<ControlEvent>,
    dropped: Arc<AtomicU64>,
}

impl InputSender {
    /// Queue an event; returns false if it was dropped
    pub fn push(&self, event: ControlEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!("Input queue full, dropped {:?} ({} total)", event, total);
                false
            }
            Err(TrySendError::Closed(_)) => {
                trace!("Input receiver gone, dropped {:?}", event);
                false
            }
        }
    }

    /// Events dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl InputSink for InputSender {
    fn input_xy(&self, dx: i32, dy: i32) {
        self.push(ControlEvent::movement(dx, dy));
    }

    fn input_z(&self, dz: i32) {
        self.push(ControlEvent::wheel(dz));
    }
}

/// Consumer end, owned by the render tick
pub struct InputReceiver {
    rx: mpsc::Receiver<ControlEvent>,
    dropped: Arc<AtomicU64>,
}

impl InputReceiver {
    /// Fold every queued event into `state`, returning how many were applied
    pub fn drain_into(&mut self, state: &mut PointerState) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.rx.try_recv() {
            state.apply(event);
            applied += 1;
        }
        applied
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
