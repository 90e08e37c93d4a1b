use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::{
    models::{
        descriptor::TimelineDescriptor,
        window::{Timestamp, WhichPage, WindowState},
    },
    query::builder::{QuerySpec, bounds_for},
    stores::position::PositionMemory,
};

/// Derives the unexecuted window of the `page` following `prior`.
///
/// Observed bounds and the row count start at zero; they are only set by [`commit`].
pub fn derive(
    descriptor: &TimelineDescriptor,
    prior: Option<&WindowState>,
    page: WhichPage,
    last_retrieved: Timestamp,
    generation: u64,
) -> crate::Result<WindowState> {
    descriptor.validate()?;
    let (requested_min, requested_max) = bounds_for(prior, page, last_retrieved);
    debug!("Loading {page} page of {descriptor}: min={requested_min}, max={requested_max}");
    Ok(WindowState {
        generation,
        page,
        requested_min,
        requested_max,
        observed_min: 0,
        observed_max: 0,
        rows_loaded: 0,
    })
}

/// Folds the sent dates of the loaded rows into a finalized copy of `window`.
pub fn commit(
    window: &WindowState,
    sent_dates: impl IntoIterator<Item = Timestamp>,
) -> WindowState {
    let mut rows_loaded = 0;
    let mut observed_min = 0;
    let mut observed_max = 0;
    for sent_date in sent_dates {
        if rows_loaded == 0 {
            observed_min = sent_date;
            observed_max = sent_date;
        } else {
            observed_min = observed_min.min(sent_date);
            observed_max = observed_max.max(sent_date);
        }
        rows_loaded += 1;
    }
    WindowState {
        observed_min,
        observed_max,
        rows_loaded,
        ..*window
    }
}

/// One page load in flight: the derived window and the query that fills it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    descriptor: Arc<TimelineDescriptor>,
    window: WindowState,
    query: QuerySpec,
}

impl PageRequest {
    /// Consults `positions` for the start of a [`WhichPage::New`] page.
    pub fn prepare(
        descriptor: Arc<TimelineDescriptor>,
        prior: Option<&WindowState>,
        page: WhichPage,
        positions: &dyn PositionMemory,
        generation: u64,
    ) -> crate::Result<Self> {
        let last_retrieved = match (page, prior) {
            (WhichPage::New, _) | (_, None) => positions.last_retrieved_sent_date(&descriptor),
            _ => 0,
        };
        let window = derive(&descriptor, prior, page, last_retrieved, generation)?;
        let query = QuerySpec::for_window(&descriptor, &window);
        Ok(Self {
            descriptor,
            window,
            query,
        })
    }

    pub fn descriptor(&self) -> &Arc<TimelineDescriptor> {
        &self.descriptor
    }

    pub fn window(&self) -> &WindowState {
        &self.window
    }

    pub fn query(&self) -> &QuerySpec {
        &self.query
    }

    pub fn generation(&self) -> u64 {
        self.window.generation
    }
}
