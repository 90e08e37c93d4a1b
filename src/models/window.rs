use std::fmt;

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch. `0` stands for "unbounded" or "none yet".
pub type Timestamp = i64;

/// Messages are loaded one page at a time. More pages are loaded
/// when the user scrolls to either end of the list.
pub const PAGE_SIZE: usize = 100;

/// The page requested relative to the previously loaded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WhichPage {
    /// Start over from the last retrieved position.
    New,
    Older,
    Younger,
    /// Reload the current window in place.
    #[default]
    Same,
}

impl WhichPage {
    pub fn save(&self) -> &'static str {
        match self {
            WhichPage::New => "new",
            WhichPage::Older => "older",
            WhichPage::Younger => "younger",
            WhichPage::Same => "same",
        }
    }

    /// A missing or unrecognized code means "reload the same page".
    pub fn load(code: Option<&str>) -> Self {
        match code {
            Some("new") => WhichPage::New,
            Some("older") => WhichPage::Older,
            Some("younger") => WhichPage::Younger,
            _ => WhichPage::Same,
        }
    }
}

impl fmt::Display for WhichPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.save())
    }
}

/// Bounds of one loaded page of a timeline.
///
/// A window is created unexecuted by [`crate::page::request::derive`] and
/// finalized once by [`crate::page::request::commit`]. It is never edited afterwards:
/// the next page gets a new window derived from this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowState {
    pub(crate) generation: u64,
    pub(crate) page: WhichPage,
    pub(crate) requested_min: Timestamp,
    pub(crate) requested_max: Timestamp,
    pub(crate) observed_min: Timestamp,
    pub(crate) observed_max: Timestamp,
    pub(crate) rows_loaded: usize,
}

impl WindowState {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn page(&self) -> WhichPage {
        self.page
    }

    /// Lower bound sent to storage, inclusive.
    pub fn requested_min(&self) -> Timestamp {
        self.requested_min
    }

    /// Upper bound sent to storage, inclusive.
    pub fn requested_max(&self) -> Timestamp {
        self.requested_max
    }

    pub fn observed_min(&self) -> Timestamp {
        self.observed_min
    }

    pub fn observed_max(&self) -> Timestamp {
        self.observed_max
    }

    pub fn rows_loaded(&self) -> usize {
        self.rows_loaded
    }

    /// A full page or a bounded lower edge suggests there is more data below.
    /// Can be a false positive; the next (empty or partial) page corrects it.
    pub fn may_have_older_page(&self) -> bool {
        self.requested_min > 0 || self.rows_loaded == PAGE_SIZE
    }

    pub fn may_have_younger_page(&self) -> bool {
        self.requested_max > 0 || self.rows_loaded == PAGE_SIZE
    }

    /// Only a window open toward the future is read oldest-first.
    pub fn is_sort_order_ascending(&self) -> bool {
        self.requested_max == 0 && self.requested_min > 0
    }

    pub fn is_fully_bounded(&self) -> bool {
        self.requested_min > 0 && self.requested_max > 0
    }
}
