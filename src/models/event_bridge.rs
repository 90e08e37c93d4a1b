use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{
    async_requests::ViewId,
    descriptor::TimelineDescriptor,
    row::MessageRow,
    window::{WhichPage, WindowState},
};

/// Outcomes of timeline requests, forwarded to the adapter.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum TimelineUpdate {
    ViewOpened {
        view_id: ViewId,
        descriptor: TimelineDescriptor,
    },
    /// The view's timeline could not be resolved; the adapter should ask for another one.
    ViewEmpty { view_id: ViewId },
    PageLoading {
        view_id: ViewId,
        page: WhichPage,
        generation: u64,
    },
    PageLoaded {
        view_id: ViewId,
        window: WindowState,
        rows: Vec<MessageRow>,
    },
    PageError {
        view_id: ViewId,
        page: WhichPage,
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventBridge {
    sender: broadcast::Sender<TimelineUpdate>,
}

impl EventBridge {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<TimelineUpdate>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, update: TimelineUpdate) {
        let _ = self.sender.send(update);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimelineUpdate> {
        self.sender.subscribe()
    }
}
