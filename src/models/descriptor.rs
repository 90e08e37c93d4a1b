use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, models::kind::TimelineKind};

/// Local id of a configured account.
pub type AccountId = u64;

/// Local id of a user whose messages can be shown in a [`TimelineKind::User`] timeline.
pub type SubjectId = u64;

/// Which accounts a timeline spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountRef {
    Account(AccountId),
    /// Messages of all configured accounts.
    Combined,
}

impl AccountRef {
    pub fn is_combined(&self) -> bool {
        matches!(self, AccountRef::Combined)
    }

    /// The account id, `0` for the combined scope.
    pub fn account_id(&self) -> AccountId {
        match self {
            AccountRef::Account(id) => *id,
            AccountRef::Combined => 0,
        }
    }
}

/// Immutable identity of a timeline.
///
/// A new descriptor is built for every navigation action (new screen, new search,
/// state restored after a restart). Page loads never modify it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDescriptor {
    kind: TimelineKind,
    account_scope: AccountRef,
    /// `0` when no subject is selected. Never `0` for a valid [`TimelineKind::User`] timeline.
    selected_subject_id: SubjectId,
    /// Empty when the timeline is not filtered by a search query.
    search_query: String,
}

impl Default for TimelineDescriptor {
    fn default() -> Self {
        Self::empty()
    }
}

impl TimelineDescriptor {
    pub fn new(kind: TimelineKind, account_scope: AccountRef) -> Self {
        Self {
            kind,
            account_scope,
            selected_subject_id: 0,
            search_query: String::new(),
        }
    }

    /// The descriptor of "no timeline to load".
    pub fn empty() -> Self {
        Self::new(TimelineKind::Unknown, AccountRef::Combined)
    }

    pub fn with_selected_subject(mut self, subject_id: SubjectId) -> Self {
        self.selected_subject_id = subject_id;
        self
    }

    pub fn with_search_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = query.into();
        self
    }

    /// Uses `query` only if this descriptor has no search query of its own,
    /// e.g. when a search term arrives alongside a timeline link.
    pub fn with_fallback_search_query(self, query: Option<&str>) -> Self {
        match query {
            Some(query) if self.search_query.is_empty() => self.with_search_query(query),
            _ => self,
        }
    }

    /// The same timeline widened to every loaded message, used for global searches.
    pub fn global_search(&self) -> Self {
        Self {
            kind: TimelineKind::Everything,
            ..self.clone()
        }
    }

    pub fn kind(&self) -> TimelineKind {
        self.kind
    }

    pub fn account_scope(&self) -> AccountRef {
        self.account_scope
    }

    pub fn is_combined(&self) -> bool {
        self.account_scope.is_combined()
    }

    pub fn selected_subject_id(&self) -> SubjectId {
        self.selected_subject_id
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_unknown()
    }

    pub fn validate(&self) -> crate::Result<()> {
        match self.kind {
            TimelineKind::Unknown => Err(Error::InvalidDescriptor(
                "timeline kind is unknown".to_owned(),
            )),
            TimelineKind::User if self.selected_subject_id == 0 => Err(Error::InvalidDescriptor(
                "user timeline without a selected subject".to_owned(),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for TimelineDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timeline={}", self.kind)?;
        match self.account_scope {
            AccountRef::Combined => f.write_str(", combined")?,
            AccountRef::Account(id) => write!(f, ", account={id}")?,
        }
        if self.selected_subject_id != 0 {
            write!(f, ", selectedSubject={}", self.selected_subject_id)?;
        }
        if !self.search_query.is_empty() {
            write!(f, ", searchQuery={}", self.search_query)?;
        }
        Ok(())
    }
}
