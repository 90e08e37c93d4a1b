use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// The kind of a timeline. Determines which base filter is applied to the message store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimelineKind {
    Home,
    Mentions,
    Favorites,
    Direct,
    /// Messages authored, sent or reblogged by one selected subject.
    User,
    /// Every loaded message, regardless of how it was retrieved.
    Everything,
    #[default]
    Unknown,
}

impl TimelineKind {
    pub const ALL: [TimelineKind; 7] = [
        TimelineKind::Home,
        TimelineKind::Mentions,
        TimelineKind::Favorites,
        TimelineKind::Direct,
        TimelineKind::User,
        TimelineKind::Everything,
        TimelineKind::Unknown,
    ];

    /// Stable code used in persisted state.
    pub fn save(&self) -> &'static str {
        match self {
            TimelineKind::Home => "home",
            TimelineKind::Mentions => "mentions",
            TimelineKind::Favorites => "favorites",
            TimelineKind::Direct => "direct",
            TimelineKind::User => "user",
            TimelineKind::Everything => "everything",
            TimelineKind::Unknown => "unknown",
        }
    }

    /// Never fails: unrecognized codes resolve to [`TimelineKind::Unknown`].
    pub fn load(code: &str) -> Self {
        let kind = Self::ALL
            .into_iter()
            .find(|kind| kind.save() == code)
            .unwrap_or_default();
        if kind == TimelineKind::Unknown && code != TimelineKind::Unknown.save() {
            trace!("Error converting '{code}' to a timeline kind");
        }
        kind
    }

    pub fn is_unknown(&self) -> bool {
        *self == TimelineKind::Unknown
    }
}

impl fmt::Display for TimelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.save())
    }
}
