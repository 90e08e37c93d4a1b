use std::sync::Arc;

use serde::{Serialize, ser::Serializer};
use tokio::{
    runtime::Handle,
    sync::{broadcast, mpsc::unbounded_channel},
};
use tracing::{error, info};

use crate::{
    init::workers::async_worker,
    models::{
        async_requests::{TimelineRequest, ViewId},
        event_bridge::{EventBridge, TimelineUpdate},
    },
    stores::{position::PositionMemory, storage::TimelineStorage},
};

pub mod codec;
pub(crate) mod init;
pub mod models;
pub mod page;
pub mod query;
pub mod stores;

pub use models::{
    async_requests::TimelineHandle,
    descriptor::{AccountRef, TimelineDescriptor},
    kind::TimelineKind,
    window::{PAGE_SIZE, WhichPage, WindowState},
};
pub use page::{request::PageRequest, view::TimelineView};

pub type Result<T> = std::result::Result<T, Error>;

/// timeline-pager Error enum
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid timeline descriptor: {0}")]
    InvalidDescriptor(String),
    #[error(transparent)]
    Parse(#[from] codec::ParseError),
    /// A storage query failed. Carried unchanged from the [`TimelineStorage`] implementation.
    #[error(transparent)]
    Storage(anyhow::Error),
    #[error("stale page: window generation {actual} was superseded by {expected}")]
    StaleWindow { expected: u64, actual: u64 },
    #[error("no open view with id {0}")]
    UnknownView(ViewId),
    #[error("the timeline worker has stopped")]
    WorkerStopped,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

/// Default capacity of the outgoing [`TimelineUpdate`] channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// The required configuration for this lib. Adapters provide the message storage
/// and where reading positions are kept.
pub struct LibConfig {
    storage: Arc<dyn TimelineStorage>,
    positions: Arc<dyn PositionMemory>,
    /// How many updates a slow receiver may lag behind before missing some.
    event_capacity: usize,
}

impl LibConfig {
    pub fn new(storage: Arc<dyn TimelineStorage>, positions: Arc<dyn PositionMemory>) -> Self {
        Self {
            storage,
            positions,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity.max(1);
        self
    }
}

/// Starts the timeline worker on the current tokio runtime.
/// Returns the handle to submit requests with, and a `Receiver` to forward outgoing updates.
///
/// Panics if called outside of a tokio runtime.
pub fn init(config: LibConfig) -> (TimelineHandle, broadcast::Receiver<TimelineUpdate>) {
    // Lib -> adapter updates
    let (event_bridge, broadcast_receiver) = EventBridge::new(config.event_capacity);

    // Adapter -> lib requests
    let (sender, receiver) = unbounded_channel::<TimelineRequest>();

    let _monitor = Handle::current().spawn(async move {
        match async_worker(receiver, config.storage, config.positions, event_bridge).await {
            Ok(()) => info!("Timeline worker task ended."),
            Err(e) => error!("Timeline worker task ended with an error: {e:?}"),
        }
    });

    (TimelineHandle::new(sender), broadcast_receiver)
}
