use serde::Serialize;

use crate::{
    models::{
        descriptor::{AccountRef, TimelineDescriptor},
        kind::TimelineKind,
        window::{PAGE_SIZE, Timestamp, WhichPage, WindowState},
    },
    query::predicate::{Column, Predicate, id_value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    /// Oldest first.
    Ascending,
    /// Newest first.
    Descending,
}

impl SortOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "msg_sent_date ASC",
            SortOrder::Descending => "msg_sent_date DESC",
        }
    }
}

/// A concrete query for the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    pub predicate: Predicate,
    pub sort_order: SortOrder,
    /// `None` for a fully bounded window: every matching row is returned.
    pub limit: Option<usize>,
}

impl QuerySpec {
    /// The query that loads `window` of the timeline `descriptor`.
    pub fn for_window(descriptor: &TimelineDescriptor, window: &WindowState) -> Self {
        let mut predicate = base_predicate(descriptor);
        if window.requested_min > 0 {
            predicate = predicate.and(Predicate::Ge(Column::SentDate, window.requested_min));
        }
        if window.requested_max > 0 {
            predicate = predicate.and(Predicate::Le(Column::SentDate, window.requested_max));
        }
        let sort_order = if window.is_sort_order_ascending() {
            SortOrder::Ascending
        } else {
            SortOrder::Descending
        };
        let limit = (!window.is_fully_bounded()).then_some(PAGE_SIZE);
        Self {
            predicate,
            sort_order,
            limit,
        }
    }

    /// `ORDER BY` body, with the limit appended when the window is open-ended.
    pub fn order_by_sql(&self) -> String {
        match self.limit {
            Some(limit) => format!("{} LIMIT {limit}", self.sort_order.sql()),
            None => self.sort_order.sql().to_owned(),
        }
    }
}

/// Builds the query for the `page` following `prior`.
///
/// `last_retrieved` is the remembered position of the timeline, only used for [`WhichPage::New`].
pub fn build(
    descriptor: &TimelineDescriptor,
    prior: Option<&WindowState>,
    page: WhichPage,
    last_retrieved: Timestamp,
) -> QuerySpec {
    let (requested_min, requested_max) = bounds_for(prior, page, last_retrieved);
    let window = WindowState {
        page,
        requested_min,
        requested_max,
        ..Default::default()
    };
    QuerySpec::for_window(descriptor, &window)
}

/// Requested `(min, max)` sent-date bounds of the next page.
pub fn bounds_for(
    prior: Option<&WindowState>,
    page: WhichPage,
    last_retrieved: Timestamp,
) -> (Timestamp, Timestamp) {
    let Some(prior) = prior else {
        return (last_retrieved, 0);
    };
    match page {
        WhichPage::New => (last_retrieved, 0),
        WhichPage::Older => {
            if prior.may_have_older_page() {
                (0, prior.observed_min)
            } else {
                (0, prior.requested_max)
            }
        }
        WhichPage::Younger => {
            if prior.may_have_younger_page() {
                (prior.observed_max, 0)
            } else {
                (prior.requested_min, 0)
            }
        }
        WhichPage::Same => (prior.requested_min, prior.requested_max),
    }
}

/// Filter selecting the messages that belong to the timeline, regardless of time.
pub fn base_predicate(descriptor: &TimelineDescriptor) -> Predicate {
    let predicate = timeline_predicate(descriptor);
    if descriptor.search_query().is_empty() {
        predicate
    } else {
        predicate.and(Predicate::BodyContains(descriptor.search_query().to_owned()))
    }
}

/// Restricts `flag` to the rows retrieved for the descriptor's account, if any.
fn account_flag(descriptor: &TimelineDescriptor, flag: Column) -> Predicate {
    let flag = Predicate::is_flag_set(flag);
    match descriptor.account_scope() {
        AccountRef::Account(account) => {
            flag.and(Predicate::Eq(Column::LinkedUserId, id_value(account)))
        }
        AccountRef::Combined => flag,
    }
}

fn timeline_predicate(descriptor: &TimelineDescriptor) -> Predicate {
    match descriptor.kind() {
        // The combined Home timeline shows every loaded message, including those
        // that were not retrieved as any account's home timeline.
        TimelineKind::Home if descriptor.is_combined() => Predicate::always(),
        TimelineKind::Home => account_flag(descriptor, Column::Subscribed),
        TimelineKind::Mentions => account_flag(descriptor, Column::Mentioned),
        TimelineKind::Favorites => account_flag(descriptor, Column::Favorited),
        TimelineKind::Direct => account_flag(descriptor, Column::Directed),
        TimelineKind::User => {
            let subject = id_value(descriptor.selected_subject_id());
            // Reblogs by the subject are included
            Predicate::Or(vec![
                Predicate::Eq(Column::AuthorId, subject),
                Predicate::Eq(Column::SenderId, subject),
                Predicate::And(vec![
                    Predicate::Eq(Column::LinkedUserId, subject),
                    Predicate::is_flag_set(Column::Reblogged),
                ]),
            ])
        }
        TimelineKind::Everything | TimelineKind::Unknown => Predicate::always(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::row::{MessageFlags, MessageRow};

    fn home(account: u64) -> TimelineDescriptor {
        TimelineDescriptor::new(TimelineKind::Home, AccountRef::Account(account))
    }

    fn loaded(requested_min: Timestamp, requested_max: Timestamp, rows: &[Timestamp]) -> WindowState {
        WindowState {
            requested_min,
            requested_max,
            observed_min: rows.iter().copied().min().unwrap_or(0),
            observed_max: rows.iter().copied().max().unwrap_or(0),
            rows_loaded: rows.len(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_page_starts_at_last_retrieved() {
        let query = build(&home(1), None, WhichPage::New, 5_000);
        assert_eq!(
            query.predicate,
            Predicate::And(vec![
                Predicate::Eq(Column::Subscribed, 1),
                Predicate::Eq(Column::LinkedUserId, 1),
                Predicate::Ge(Column::SentDate, 5_000),
            ])
        );
        assert_eq!(query.sort_order, SortOrder::Ascending);
        assert_eq!(query.limit, Some(PAGE_SIZE));
    }

    #[test]
    fn test_new_page_without_position_is_newest_first() {
        let query = build(&home(1), None, WhichPage::New, 0);
        assert_eq!(
            query.predicate.to_selection().sql,
            "msgofuser.subscribed = ? AND user.linked_user_id = ?"
        );
        assert_eq!(query.sort_order, SortOrder::Descending);
        assert_eq!(query.limit, Some(PAGE_SIZE));
    }

    #[test]
    fn test_older_after_full_page() {
        let rows: Vec<Timestamp> = (1000..1100).collect();
        let prior = loaded(0, 0, &rows);
        assert_eq!(bounds_for(Some(&prior), WhichPage::Older, 0), (0, 1000));

        let query = build(&home(1), Some(&prior), WhichPage::Older, 0);
        assert_eq!(query.sort_order, SortOrder::Descending);
        assert_eq!(query.limit, Some(PAGE_SIZE));
        assert_eq!(query.order_by_sql(), "msg_sent_date DESC LIMIT 100");
    }

    #[test]
    fn test_older_after_partial_page_reissues_same_bound() {
        let rows: Vec<Timestamp> = (0..40).map(|i| 850 + i * 3).collect();
        let prior = loaded(0, 1000, &rows);
        assert_eq!(bounds_for(Some(&prior), WhichPage::Older, 0), (0, 1000));
    }

    #[test]
    fn test_younger_after_partial_open_page_does_not_advance() {
        let prior = loaded(700, 0, &[700, 750, 800]);
        assert_eq!(bounds_for(Some(&prior), WhichPage::Younger, 0), (700, 0));
    }

    #[test]
    fn test_younger_after_full_page_advances_to_observed_max() {
        let rows: Vec<Timestamp> = (1000..1100).collect();
        let prior = loaded(0, 0, &rows);
        assert_eq!(bounds_for(Some(&prior), WhichPage::Younger, 0), (1099, 0));
    }

    #[test]
    fn test_same_page_keeps_bounds_and_drops_limit() {
        let prior = loaded(100, 200, &[150]);
        let query = build(&home(1), Some(&prior), WhichPage::Same, 0);
        assert_eq!(query.limit, None);
        assert_eq!(query.sort_order, SortOrder::Descending);
        assert_eq!(query.order_by_sql(), "msg_sent_date DESC");
    }

    #[test]
    fn test_base_predicates() {
        let combined = TimelineDescriptor::new(TimelineKind::Home, AccountRef::Combined);
        assert!(base_predicate(&combined).is_always());
        let everything = TimelineDescriptor::new(TimelineKind::Everything, AccountRef::Account(1));
        assert!(base_predicate(&everything).is_always());
        let direct = TimelineDescriptor::new(TimelineKind::Direct, AccountRef::Account(1));
        assert_eq!(
            base_predicate(&direct),
            Predicate::And(vec![
                Predicate::Eq(Column::Directed, 1),
                Predicate::Eq(Column::LinkedUserId, 1),
            ])
        );
        let combined_direct = TimelineDescriptor::new(TimelineKind::Direct, AccountRef::Combined);
        assert_eq!(
            base_predicate(&combined_direct),
            Predicate::Eq(Column::Directed, 1)
        );
    }

    #[test]
    fn test_account_scope_restricts_rows() {
        let first = MessageRow::new(1, 10, 7).linked_to(1, MessageFlags::SUBSCRIBED);
        let second = MessageRow::new(2, 10, 7).linked_to(2, MessageFlags::SUBSCRIBED);

        let home_one = build(&home(1), None, WhichPage::New, 0);
        let home_two = build(&home(2), None, WhichPage::New, 0);
        assert_ne!(home_one, home_two);
        assert!(home_one.predicate.matches(&first));
        assert!(!home_one.predicate.matches(&second));
        assert!(home_two.predicate.matches(&second));
        assert!(!home_two.predicate.matches(&first));

        let mentions = TimelineDescriptor::new(TimelineKind::Mentions, AccountRef::Combined);
        let mentioned = |id, account| {
            MessageRow::new(id, 10, 7).linked_to(account, MessageFlags::MENTIONED)
        };
        let predicate = base_predicate(&mentions);
        assert!(predicate.matches(&mentioned(3, 1)));
        assert!(predicate.matches(&mentioned(4, 2)));
    }

    #[test]
    fn test_search_query_filters_body() {
        let searched = home(1).with_search_query("rust");
        let query = build(&searched, None, WhichPage::New, 0);
        assert_ne!(query, build(&home(1), None, WhichPage::New, 0));

        let row = |body: &str| {
            MessageRow::new(1, 10, 7)
                .linked_to(1, MessageFlags::SUBSCRIBED)
                .with_body(body)
        };
        assert!(query.predicate.matches(&row("about Rust")));
        assert!(!query.predicate.matches(&row("about go")));

        let selection = query.predicate.to_selection();
        assert!(selection.sql.ends_with("AND msg.body LIKE ? ESCAPE '\\'"));
        assert_eq!(selection.args.last().map(String::as_str), Some("%rust%"));
    }

    #[test]
    fn test_user_timeline_includes_reblogs() {
        let descriptor = TimelineDescriptor::new(TimelineKind::User, AccountRef::Account(1))
            .with_selected_subject(42);
        let predicate = base_predicate(&descriptor);

        let authored = MessageRow::new(1, 10, 42);
        let sent = MessageRow::new(2, 10, 7).with_sender(42);
        let reblogged = MessageRow::new(3, 10, 7).linked_to(42, MessageFlags::REBLOGGED);
        let only_linked = MessageRow::new(4, 10, 7).linked_to(42, MessageFlags::FAVORITED);
        let unrelated = MessageRow::new(5, 10, 7);

        assert!(predicate.matches(&authored));
        assert!(predicate.matches(&sent));
        assert!(predicate.matches(&reblogged));
        assert!(!predicate.matches(&only_linked));
        assert!(!predicate.matches(&unrelated));
    }
}
