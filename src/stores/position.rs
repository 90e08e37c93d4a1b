use std::{collections::HashMap, sync::Mutex};

use crate::{
    codec,
    models::{descriptor::TimelineDescriptor, window::Timestamp},
};

/// Remembers how far each timeline has been retrieved, so a new page
/// can start where the user left off.
pub trait PositionMemory: std::fmt::Debug + Send + Sync {
    /// `0` if nothing is remembered for this timeline.
    fn last_retrieved_sent_date(&self, descriptor: &TimelineDescriptor) -> Timestamp;
    fn remember_retrieved_sent_date(&self, descriptor: &TimelineDescriptor, sent_date: Timestamp);
}

/// Keeps positions for the lifetime of the process, keyed by the encoded descriptor.
#[derive(Debug, Default)]
pub struct MemoryPositions {
    positions: Mutex<HashMap<String, Timestamp>>,
}

impl PositionMemory for MemoryPositions {
    fn last_retrieved_sent_date(&self, descriptor: &TimelineDescriptor) -> Timestamp {
        self.positions
            .lock()
            .map(|positions| {
                positions
                    .get(&codec::encode(descriptor))
                    .copied()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    fn remember_retrieved_sent_date(&self, descriptor: &TimelineDescriptor, sent_date: Timestamp) {
        if let Ok(mut positions) = self.positions.lock() {
            positions.insert(codec::encode(descriptor), sent_date);
        }
    }
}
