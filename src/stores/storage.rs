use std::cmp::Reverse;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    models::row::MessageRow,
    query::builder::{QuerySpec, SortOrder},
};

/// The time-ordered message store timelines are loaded from.
#[async_trait]
pub trait TimelineStorage: std::fmt::Debug + Send + Sync {
    async fn query(&self, query: &QuerySpec) -> anyhow::Result<Vec<MessageRow>>;
}

/// Evaluates queries against rows held in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    rows: RwLock<Vec<MessageRow>>,
}

impl MemoryStorage {
    pub fn new(rows: Vec<MessageRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    pub async fn insert(&self, row: MessageRow) {
        self.rows.write().await.push(row);
    }
}

#[async_trait]
impl TimelineStorage for MemoryStorage {
    async fn query(&self, query: &QuerySpec) -> anyhow::Result<Vec<MessageRow>> {
        let rows = self.rows.read().await;
        let mut matching: Vec<MessageRow> = rows
            .iter()
            .filter(|row| query.predicate.matches(row))
            .cloned()
            .collect();
        match query.sort_order {
            SortOrder::Ascending => matching.sort_by_key(|row| (row.sent_date, row.msg_id)),
            SortOrder::Descending => {
                matching.sort_by_key(|row| Reverse((row.sent_date, row.msg_id)))
            }
        }
        if let Some(limit) = query.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }
}
