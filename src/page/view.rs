use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::{
    Error, codec,
    models::{
        descriptor::TimelineDescriptor,
        window::{Timestamp, WhichPage, WindowState},
    },
    page::request::{PageRequest, commit},
    stores::position::PositionMemory,
};

/// The timeline shown by one screen: its descriptor and the last committed window.
///
/// Only one page load is accepted at a time. Starting a new page supersedes any
/// request still in flight, and results for a superseded request are rejected.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineView {
    descriptor: Arc<TimelineDescriptor>,
    /// `None` until the first page is committed.
    window: Option<WindowState>,
    /// Generation of the most recently started request.
    latest_generation: u64,
}

impl TimelineView {
    pub fn new(descriptor: TimelineDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            window: None,
            latest_generation: 0,
        }
    }

    /// Opens the timeline a link points to. `search_extra` is a search term that
    /// came with the link; it only applies if the link carries no query itself.
    pub fn from_uri_with_search(uri: &str, search_extra: Option<&str>) -> Self {
        let descriptor = codec::decode_or_empty(uri);
        if descriptor.is_empty() {
            return Self::new(descriptor);
        }
        Self::new(descriptor.with_fallback_search_query(search_extra))
    }

    pub fn descriptor(&self) -> &Arc<TimelineDescriptor> {
        &self.descriptor
    }

    pub fn window(&self) -> Option<&WindowState> {
        self.window.as_ref()
    }

    pub fn latest_generation(&self) -> u64 {
        self.latest_generation
    }

    pub fn is_empty(&self) -> bool {
        self.descriptor.is_empty()
    }

    /// Starts loading `page`. The returned request supersedes any earlier one.
    pub fn begin_page(
        &mut self,
        page: WhichPage,
        positions: &dyn PositionMemory,
    ) -> crate::Result<PageRequest> {
        let generation = self.latest_generation + 1;
        let request = PageRequest::prepare(
            self.descriptor.clone(),
            self.window.as_ref(),
            page,
            positions,
            generation,
        )?;
        self.latest_generation = generation;
        Ok(request)
    }

    /// Whether `request` is the latest one started for this timeline.
    pub fn is_current(&self, request: &PageRequest) -> bool {
        request.generation() == self.latest_generation
            && Arc::ptr_eq(request.descriptor(), &self.descriptor)
    }

    /// Accepts the sent dates loaded for `request`, if it is still the latest one.
    pub fn commit_page(
        &mut self,
        request: &PageRequest,
        sent_dates: impl IntoIterator<Item = Timestamp>,
    ) -> crate::Result<&WindowState> {
        if !self.is_current(request) {
            warn!(
                "Ignoring results of superseded request {} for {}, latest is {}",
                request.generation(),
                self.descriptor,
                self.latest_generation
            );
            return Err(Error::StaleWindow {
                expected: self.latest_generation,
                actual: request.generation(),
            });
        }
        Ok(&*self.window.insert(commit(request.window(), sent_dates)))
    }

    pub fn save_state(&self) -> String {
        codec::encode(&self.descriptor)
    }

    /// Replaces the timeline with the persisted one. State that decodes to a timeline
    /// which cannot be loaded is rejected. On failure the view is left as is.
    pub fn restore_state(&mut self, state: &str) -> bool {
        let decoded = codec::decode(state).map_err(Error::from).and_then(|descriptor| {
            descriptor.validate()?;
            Ok(descriptor)
        });
        match decoded {
            Ok(descriptor) => {
                self.descriptor = Arc::new(descriptor);
                self.window = None;
                // Requests issued for the previous timeline can no longer commit.
                self.latest_generation += 1;
                true
            }
            Err(e) => {
                warn!("Couldn't restore timeline state '{state}': {e}");
                false
            }
        }
    }
}
