//! Per-room signaling workers
//!
//! The hub loop must never await the media relay. Each room gets a FIFO
//! worker that runs `SignalingHandler` calls one at a time, so a slow
//! round-trip stalls only that room. A room's backlog is bounded: when it is
//! full the call is dropped rather than queued. An idle worker exits; the next
//! call for its room starts a successor that first waits for the predecessor
//! to finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use webmeet_core::metrics::hub as metrics;
use webmeet_core::{IceCandidate, RoomId, SignalingHandler, UserId};

/// A call to the signaling handler, scoped to one room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingCall {
    Join {
        user_id: UserId,
        display_name: String,
    },
    Leave {
        user_id: UserId,
    },
    Offer {
        from: UserId,
        sdp: String,
    },
    Answer {
        from: UserId,
        to: UserId,
        sdp: String,
    },
    IceCandidate {
        from: UserId,
        to: UserId,
        candidate: IceCandidate,
    },
}

impl SignalingCall {
    const fn operation(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice_candidate",
        }
    }

    /// User on whose behalf the call runs
    const fn user_id(&self) -> &UserId {
        match self {
            Self::Join { user_id, .. } | Self::Leave { user_id } => user_id,
            Self::Offer { from, .. }
            | Self::Answer { from, .. }
            | Self::IceCandidate { from, .. } => from,
        }
    }
}

struct Worker {
    tx: mpsc::Sender<SignalingCall>,
    task: JoinHandle<()>,
}

pub struct Dispatcher {
    handler: Arc<dyn SignalingHandler>,
    idle: Duration,
    capacity: usize,
    workers: HashMap<RoomId, Worker>,
}

impl Dispatcher {
    /// `capacity` bounds the calls queued for a single room
    #[must_use]
    pub fn new(handler: Arc<dyn SignalingHandler>, idle: Duration, capacity: usize) -> Self {
        Self {
            handler,
            idle,
            capacity: capacity.max(1),
            workers: HashMap::new(),
        }
    }

    /// Queue `call` behind every earlier call for `room_id` without waiting
    ///
    /// Returns `false` when the room's backlog is full and the call was dropped.
    pub fn dispatch(&mut self, room_id: RoomId, mut call: SignalingCall) -> bool {
        let mut predecessor = None;

        if let Some(worker) = self.workers.get(&room_id) {
            match worker.tx.try_send(call) {
                Ok(()) => return true,
                Err(TrySendError::Full(dropped)) => {
                    warn!(
                        room_id = %room_id,
                        user_id = %dropped.user_id(),
                        operation = dropped.operation(),
                        "Signaling backlog full, dropping call"
                    );
                    metrics::DROPPED_MESSAGES
                        .with_label_values(&["signaling_backlog"])
                        .inc();
                    return false;
                }
                Err(TrySendError::Closed(returned)) => {
                    // Worker went idle and closed its queue
                    call = returned;
                    predecessor = self.workers.remove(&room_id).map(|w| w.task);
                }
            }
        }

        self.start_worker(room_id, call, predecessor);
        true
    }

    /// Queue `call`, waiting for room in the backlog if needed
    ///
    /// Only for use once the hub has stopped serving peers.
    pub async fn dispatch_wait(&mut self, room_id: RoomId, call: SignalingCall) {
        let (call, predecessor) = match self.workers.get(&room_id) {
            Some(worker) => {
                let sent = worker.tx.send(call).await;
                match sent {
                    Ok(()) => return,
                    Err(mpsc::error::SendError(returned)) => {
                        (returned, self.workers.remove(&room_id).map(|w| w.task))
                    }
                }
            }
            None => (call, None),
        };

        self.start_worker(room_id, call, predecessor);
    }

    fn start_worker(
        &mut self,
        room_id: RoomId,
        call: SignalingCall,
        predecessor: Option<JoinHandle<()>>,
    ) {
        self.workers.retain(|_, worker| !worker.task.is_finished());

        let (tx, rx) = mpsc::channel(self.capacity);
        // A fresh queue has room for at least one call
        let _ = tx.try_send(call);

        debug!(room_id = %room_id, "Starting signaling worker");
        let task = tokio::spawn(run_worker(
            room_id.clone(),
            Arc::clone(&self.handler),
            self.idle,
            rx,
            predecessor,
        ));
        self.workers.insert(room_id, Worker { tx, task });
    }

    /// Number of workers that have not exited yet
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.workers
            .values()
            .filter(|worker| !worker.task.is_finished())
            .count()
    }

    /// Stop accepting calls and wait for every queued call to run
    pub async fn shutdown(self) {
        let tasks: Vec<JoinHandle<()>> = self
            .workers
            .into_values()
            .map(|worker| worker.task)
            .collect();
        for task in tasks {
            let _ = task.await;
        }
    }
}

async fn run_worker(
    room_id: RoomId,
    handler: Arc<dyn SignalingHandler>,
    idle: Duration,
    mut rx: mpsc::Receiver<SignalingCall>,
    predecessor: Option<JoinHandle<()>>,
) {
    if let Some(previous) = predecessor {
        let _ = previous.await;
    }

    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(call)) => execute(handler.as_ref(), &room_id, call).await,
            Ok(None) => break,
            Err(_) => {
                rx.close();
                while let Ok(call) = rx.try_recv() {
                    execute(handler.as_ref(), &room_id, call).await;
                }
                debug!(room_id = %room_id, "Signaling worker idle, exiting");
                break;
            }
        }
    }
}

async fn execute(handler: &dyn SignalingHandler, room_id: &RoomId, call: SignalingCall) {
    let operation = call.operation();
    let result = match &call {
        SignalingCall::Join {
            user_id,
            display_name,
        } => handler.join_room(room_id, user_id, display_name).await,
        SignalingCall::Leave { user_id } => handler.leave_room(room_id, user_id).await,
        SignalingCall::Offer { from, sdp } => handler.handle_offer(room_id, from, sdp).await,
        SignalingCall::Answer { from, to, sdp } => {
            handler.handle_answer(room_id, from, to, sdp).await
        }
        SignalingCall::IceCandidate {
            from,
            to,
            candidate,
        } => handler.handle_ice_candidate(room_id, from, to, candidate).await,
    };

    if let Err(e) = result {
        warn!(
            room_id = %room_id,
            operation,
            error_kind = e.kind(),
            error = %e,
            "Signaling handler call failed"
        );
    }
}
