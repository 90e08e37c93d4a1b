use std::{collections::BTreeMap, sync::Arc};

use tokio::{
    runtime::Handle,
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    Error,
    models::{
        async_requests::{TimelineRequest, ViewId},
        descriptor::TimelineDescriptor,
        event_bridge::{EventBridge, TimelineUpdate},
        row::MessageRow,
    },
    page::{request::PageRequest, view::TimelineView},
    stores::{position::PositionMemory, storage::TimelineStorage},
};

/// A finished storage query, fed back into the worker loop.
struct QueryOutcome {
    view_id: ViewId,
    request: PageRequest,
    result: anyhow::Result<Vec<MessageRow>>,
}

/// Owns every open [`TimelineView`] and runs their page loads.
struct TimelineWorker {
    storage: Arc<dyn TimelineStorage>,
    positions: Arc<dyn PositionMemory>,
    event_bridge: EventBridge,
    views: BTreeMap<ViewId, TimelineView>,
    /// The running query of each view, with the generation it loads.
    tasks_list: BTreeMap<ViewId, (u64, JoinHandle<()>)>,
    outcome_sender: UnboundedSender<QueryOutcome>,
}

impl TimelineWorker {
    fn new(
        storage: Arc<dyn TimelineStorage>,
        positions: Arc<dyn PositionMemory>,
        event_bridge: EventBridge,
        outcome_sender: UnboundedSender<QueryOutcome>,
    ) -> Self {
        Self {
            storage,
            positions,
            event_bridge,
            views: BTreeMap::new(),
            tasks_list: BTreeMap::new(),
            outcome_sender,
        }
    }

    fn handle_request(&mut self, request: TimelineRequest) {
        match request {
            TimelineRequest::OpenView {
                view_id,
                descriptor,
            } => self.open_view(view_id, TimelineView::new(descriptor)),
            TimelineRequest::OpenViewFromUri {
                view_id,
                uri,
                search_query,
            } => self.open_view(
                view_id,
                TimelineView::from_uri_with_search(&uri, search_query.as_deref()),
            ),
            TimelineRequest::LoadPage { view_id, page } => {
                let Some(view) = self.views.get_mut(&view_id) else {
                    warn!("Skipping {page} page request for unknown view {view_id}");
                    self.event_bridge.emit(TimelineUpdate::PageError {
                        view_id,
                        page,
                        error: Error::UnknownView(view_id).to_string(),
                    });
                    return;
                };
                let request = match view.begin_page(page, self.positions.as_ref()) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("Cannot load {page} page for view {view_id}: {e}");
                        self.event_bridge.emit(TimelineUpdate::PageError {
                            view_id,
                            page,
                            error: e.to_string(),
                        });
                        return;
                    }
                };
                if let Some((generation, previous)) = self.tasks_list.remove(&view_id) {
                    debug!("Request {generation} for view {view_id} superseded, aborting it");
                    previous.abort();
                }
                self.event_bridge.emit(TimelineUpdate::PageLoading {
                    view_id,
                    page,
                    generation: request.generation(),
                });

                let generation = request.generation();
                let storage = self.storage.clone();
                let outcome_sender = self.outcome_sender.clone();
                let query_task = Handle::current().spawn(async move {
                    debug!(
                        "Querying {} page {generation} for view {view_id}: {}",
                        request.window().page(),
                        request.query().predicate.to_selection()
                    );
                    let result = storage.query(request.query()).await;
                    let _ = outcome_sender.send(QueryOutcome {
                        view_id,
                        request,
                        result,
                    });
                });
                self.tasks_list.insert(view_id, (generation, query_task));
            }
            TimelineRequest::RememberPosition { view_id, sent_date } => {
                match self.views.get(&view_id) {
                    Some(view) if !view.is_empty() => self
                        .positions
                        .remember_retrieved_sent_date(view.descriptor(), sent_date),
                    _ => warn!("Not remembering position of empty or unknown view {view_id}"),
                }
            }
            TimelineRequest::CloseView { view_id } => {
                self.abort_task(view_id);
                if self.views.remove(&view_id).is_some() {
                    debug!("Closed view {view_id}");
                }
            }
            TimelineRequest::SaveState { view_id, reply } => {
                let state = self
                    .views
                    .get(&view_id)
                    .map(TimelineView::save_state)
                    .ok_or(Error::UnknownView(view_id));
                let _ = reply.send(state);
            }
            TimelineRequest::RestoreState {
                view_id,
                state,
                reply,
            } => {
                let restored = match self.views.get_mut(&view_id) {
                    Some(view) => view.restore_state(&state),
                    None => {
                        let mut view = TimelineView::new(TimelineDescriptor::empty());
                        let restored = view.restore_state(&state);
                        if restored {
                            self.views.insert(view_id, view);
                        }
                        restored
                    }
                };
                if restored {
                    self.abort_task(view_id);
                    if let Some(view) = self.views.get(&view_id) {
                        info!("Restored view {view_id}: {}", view.descriptor());
                        self.event_bridge.emit(TimelineUpdate::ViewOpened {
                            view_id,
                            descriptor: view.descriptor().as_ref().clone(),
                        });
                    }
                }
                let _ = reply.send(restored);
            }
        }
    }

    fn open_view(&mut self, view_id: ViewId, view: TimelineView) {
        self.abort_task(view_id);
        if view.is_empty() {
            debug!("View {view_id} has no timeline to load");
            self.event_bridge
                .emit(TimelineUpdate::ViewEmpty { view_id });
        } else {
            info!("Opened view {view_id}: {}", view.descriptor());
            self.event_bridge.emit(TimelineUpdate::ViewOpened {
                view_id,
                descriptor: view.descriptor().as_ref().clone(),
            });
        }
        self.views.insert(view_id, view);
    }

    fn abort_task(&mut self, view_id: ViewId) {
        if let Some((_, task)) = self.tasks_list.remove(&view_id) {
            task.abort();
        }
    }

    fn handle_outcome(&mut self, outcome: QueryOutcome) {
        let QueryOutcome {
            view_id,
            request,
            result,
        } = outcome;
        let Some(view) = self.views.get_mut(&view_id) else {
            debug!("Dropping results for closed view {view_id}");
            return;
        };
        // The view may have been replaced by one whose generations restarted.
        let is_current = view.is_current(&request);
        if is_current {
            self.tasks_list.remove(&view_id);
        }
        let page = request.window().page();
        match result {
            Ok(rows) => {
                // A superseded request is rejected here, the latest one reports.
                if let Ok(window) = view.commit_page(&request, rows.iter().map(|row| row.sent_date))
                {
                    debug!(
                        "Loaded {} rows of {page} page for view {view_id}",
                        window.rows_loaded()
                    );
                    self.event_bridge.emit(TimelineUpdate::PageLoaded {
                        view_id,
                        window: *window,
                        rows,
                    });
                }
            }
            Err(e) => {
                if !is_current {
                    debug!("Ignoring failure of superseded request for view {view_id}: {e:?}");
                    return;
                }
                error!("Error loading {page} page for view {view_id}: {e:?}");
                self.event_bridge.emit(TimelineUpdate::PageError {
                    view_id,
                    page,
                    error: Error::Storage(e).to_string(),
                });
            }
        }
    }

    fn shutdown(&mut self) {
        for (_, (_, task)) in std::mem::take(&mut self.tasks_list) {
            task.abort();
        }
    }
}

/// The entry point of the timeline worker task.
///
/// Waits for [`TimelineRequest`]s from the adapter and completed queries, until every
/// [`crate::TimelineHandle`] has been dropped.
pub async fn async_worker(
    mut request_receiver: UnboundedReceiver<TimelineRequest>,
    storage: Arc<dyn TimelineStorage>,
    positions: Arc<dyn PositionMemory>,
    event_bridge: EventBridge,
) -> anyhow::Result<()> {
    debug!("Started timeline worker task.");
    let (outcome_sender, mut outcome_receiver) = unbounded_channel::<QueryOutcome>();
    let mut worker = TimelineWorker::new(storage, positions, event_bridge, outcome_sender);

    loop {
        tokio::select! {
            request = request_receiver.recv() => {
                let Some(request) = request else {
                    break;
                };
                worker.handle_request(request);
            }
            Some(outcome) = outcome_receiver.recv() => {
                worker.handle_outcome(outcome);
            }
        }
    }

    worker.shutdown();
    debug!("Timeline worker task stopped: all handles dropped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::{Notify, broadcast};

    use super::*;
    use crate::{
        LibConfig, TimelineHandle,
        models::{
            descriptor::AccountRef,
            kind::TimelineKind,
            row::MessageFlags,
            window::{PAGE_SIZE, WhichPage},
        },
        query::builder::QuerySpec,
        stores::{
            position::MemoryPositions,
            state_store::MemoryStateStore,
            storage::MemoryStorage,
        },
    };

    fn home_rows(count: u64) -> Vec<MessageRow> {
        (0..count)
            .map(|i| {
                MessageRow::new(i, 1000 + i as i64, 7).linked_to(1, MessageFlags::SUBSCRIBED)
            })
            .collect()
    }

    fn home() -> TimelineDescriptor {
        TimelineDescriptor::new(TimelineKind::Home, AccountRef::Account(1))
    }

    async fn next_update(receiver: &mut broadcast::Receiver<TimelineUpdate>) -> TimelineUpdate {
        tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .expect("timed out waiting for a timeline update")
            .expect("event bridge closed")
    }

    async fn next_loaded(
        receiver: &mut broadcast::Receiver<TimelineUpdate>,
    ) -> (WindowStateSnapshot, Vec<MessageRow>) {
        loop {
            match next_update(receiver).await {
                TimelineUpdate::PageLoaded { window, rows, .. } => {
                    return (
                        WindowStateSnapshot {
                            requested_max: window.requested_max(),
                            observed_min: window.observed_min(),
                            rows_loaded: window.rows_loaded(),
                            generation: window.generation(),
                        },
                        rows,
                    );
                }
                TimelineUpdate::PageError { error, .. } => panic!("page error: {error}"),
                _ => {}
            }
        }
    }

    struct WindowStateSnapshot {
        requested_max: i64,
        observed_min: i64,
        rows_loaded: usize,
        generation: u64,
    }

    #[tokio::test]
    async fn test_new_then_older_pages() {
        let storage = Arc::new(MemoryStorage::new(home_rows(150)));
        let (handle, mut updates) = crate::init(LibConfig::new(
            storage,
            Arc::new(MemoryPositions::default()),
        ));

        handle
            .submit(TimelineRequest::OpenView {
                view_id: 1,
                descriptor: home(),
            })
            .unwrap();
        handle
            .submit(TimelineRequest::LoadPage {
                view_id: 1,
                page: WhichPage::New,
            })
            .unwrap();
        let (window, rows) = next_loaded(&mut updates).await;
        assert_eq!(window.rows_loaded, PAGE_SIZE);
        assert_eq!(window.observed_min, 1050);
        assert_eq!(rows.first().map(|r| r.sent_date), Some(1149));

        handle
            .submit(TimelineRequest::LoadPage {
                view_id: 1,
                page: WhichPage::Older,
            })
            .unwrap();
        let (window, rows) = next_loaded(&mut updates).await;
        assert_eq!(window.requested_max, 1050);
        // the boundary row is loaded again, inclusive bounds
        assert_eq!(window.rows_loaded, 51);
        assert_eq!(rows.last().map(|r| r.sent_date), Some(1000));
    }

    #[tokio::test]
    async fn test_load_for_unknown_view_reports_error() {
        let (handle, mut updates) = crate::init(LibConfig::new(
            Arc::new(MemoryStorage::default()),
            Arc::new(MemoryPositions::default()),
        ));
        handle
            .submit(TimelineRequest::LoadPage {
                view_id: 42,
                page: WhichPage::New,
            })
            .unwrap();
        assert!(matches!(
            next_update(&mut updates).await,
            TimelineUpdate::PageError { view_id: 42, .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_uri_opens_empty_view() {
        let (handle, mut updates) = crate::init(LibConfig::new(
            Arc::new(MemoryStorage::default()),
            Arc::new(MemoryPositions::default()),
        ));
        handle
            .submit(TimelineRequest::OpenViewFromUri {
                view_id: 5,
                uri: String::new(),
                search_query: None,
            })
            .unwrap();
        assert!(matches!(
            next_update(&mut updates).await,
            TimelineUpdate::ViewEmpty { view_id: 5 }
        ));
        handle
            .submit(TimelineRequest::LoadPage {
                view_id: 5,
                page: WhichPage::New,
            })
            .unwrap();
        assert!(matches!(
            next_update(&mut updates).await,
            TimelineUpdate::PageError { view_id: 5, .. }
        ));
    }

    /// Storage whose first query blocks until released, the rest answer immediately.
    #[derive(Debug)]
    struct GatedStorage {
        inner: MemoryStorage,
        gate: Notify,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl TimelineStorage for GatedStorage {
        async fn query(&self, query: &QuerySpec) -> anyhow::Result<Vec<MessageRow>> {
            let call = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                self.gate.notified().await;
            }
            self.inner.query(query).await
        }
    }

    #[tokio::test]
    async fn test_last_request_wins() {
        let storage = Arc::new(GatedStorage {
            inner: MemoryStorage::new(home_rows(20)),
            gate: Notify::new(),
            calls: Default::default(),
        });
        let (handle, mut updates) = crate::init(LibConfig::new(
            storage.clone(),
            Arc::new(MemoryPositions::default()),
        ));
        handle
            .submit(TimelineRequest::OpenView {
                view_id: 1,
                descriptor: home(),
            })
            .unwrap();
        handle
            .submit(TimelineRequest::LoadPage {
                view_id: 1,
                page: WhichPage::New,
            })
            .unwrap();
        // Supersede the first load only once it is blocked in storage.
        while storage.calls.load(std::sync::atomic::Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle
            .submit(TimelineRequest::LoadPage {
                view_id: 1,
                page: WhichPage::New,
            })
            .unwrap();
        let (window, _) = next_loaded(&mut updates).await;
        assert_eq!(window.generation, 2);
        storage.gate.notify_one();

        handle
            .submit(TimelineRequest::CloseView { view_id: 1 })
            .unwrap();
        assert!(matches!(
            handle.save_state(1).await,
            Err(Error::UnknownView(1))
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        #[derive(Debug)]
        struct FailingStorage;

        #[async_trait]
        impl TimelineStorage for FailingStorage {
            async fn query(&self, _query: &QuerySpec) -> anyhow::Result<Vec<MessageRow>> {
                anyhow::bail!("disk on fire")
            }
        }

        let (handle, mut updates) = crate::init(LibConfig::new(
            Arc::new(FailingStorage),
            Arc::new(MemoryPositions::default()),
        ));
        handle
            .submit(TimelineRequest::OpenView {
                view_id: 1,
                descriptor: home(),
            })
            .unwrap();
        handle
            .submit(TimelineRequest::LoadPage {
                view_id: 1,
                page: WhichPage::New,
            })
            .unwrap();
        loop {
            match next_update(&mut updates).await {
                TimelineUpdate::PageError { error, .. } => {
                    assert_eq!(error, "disk on fire");
                    break;
                }
                TimelineUpdate::PageLoaded { .. } => panic!("failing storage loaded a page"),
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn test_remembered_position_starts_new_page() {
        let positions = Arc::new(MemoryPositions::default());
        let (handle, mut updates) = crate::init(LibConfig::new(
            Arc::new(MemoryStorage::new(home_rows(150))),
            positions.clone(),
        ));
        handle
            .submit(TimelineRequest::OpenView {
                view_id: 1,
                descriptor: home(),
            })
            .unwrap();
        handle
            .submit(TimelineRequest::RememberPosition {
                view_id: 1,
                sent_date: 1140,
            })
            .unwrap();
        handle
            .submit(TimelineRequest::LoadPage {
                view_id: 1,
                page: WhichPage::New,
            })
            .unwrap();
        let (window, rows) = next_loaded(&mut updates).await;
        assert_eq!(window.rows_loaded, 10);
        assert_eq!(rows.first().map(|r| r.sent_date), Some(1140));
        assert_eq!(positions.last_retrieved_sent_date(&home()), 1140);
    }

    #[tokio::test]
    async fn test_persist_and_restore_through_state_store() {
        let (handle, mut updates) = crate::init(LibConfig::new(
            Arc::new(MemoryStorage::default()),
            Arc::new(MemoryPositions::default()),
        ));
        let store = MemoryStateStore::default();
        let descriptor = TimelineDescriptor::new(TimelineKind::Favorites, AccountRef::Combined)
            .with_search_query("rust");
        handle
            .submit(TimelineRequest::OpenView {
                view_id: 1,
                descriptor: descriptor.clone(),
            })
            .unwrap();
        handle.persist(1, &store, "timeline").await.unwrap();

        assert!(handle.restore_from(2, &store, "timeline").await.unwrap());
        assert!(!handle.restore_from(3, &store, "missing").await.unwrap());
        loop {
            if let TimelineUpdate::ViewOpened {
                view_id: 2,
                descriptor: restored,
            } = next_update(&mut updates).await
            {
                assert_eq!(restored, descriptor);
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_outcome_of_replaced_view_is_ignored() {
        let (event_bridge, mut updates) = EventBridge::new(16);
        let (outcome_sender, _outcome_receiver) = unbounded_channel();
        let positions = Arc::new(MemoryPositions::default());
        let mut worker = TimelineWorker::new(
            Arc::new(MemoryStorage::default()),
            positions.clone(),
            event_bridge,
            outcome_sender,
        );

        let mut replaced = TimelineView::new(home());
        let old_request = replaced
            .begin_page(WhichPage::New, positions.as_ref())
            .unwrap();

        worker.handle_request(TimelineRequest::OpenView {
            view_id: 1,
            descriptor: home(),
        });
        worker.handle_request(TimelineRequest::LoadPage {
            view_id: 1,
            page: WhichPage::New,
        });
        assert_eq!(old_request.generation(), 1);
        assert!(matches!(
            updates.try_recv(),
            Ok(TimelineUpdate::ViewOpened { view_id: 1, .. })
        ));
        assert!(matches!(
            updates.try_recv(),
            Ok(TimelineUpdate::PageLoading { generation: 1, .. })
        ));

        worker.handle_outcome(QueryOutcome {
            view_id: 1,
            request: old_request,
            result: Err(anyhow::anyhow!("query of the replaced timeline failed")),
        });
        assert!(worker.tasks_list.contains_key(&1));
        assert!(matches!(
            updates.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        worker.shutdown();
    }

    #[test]
    fn test_handle_fails_once_worker_is_gone() {
        let (sender, receiver) = unbounded_channel();
        drop(receiver);
        let handle = TimelineHandle::new(sender);
        assert!(matches!(
            handle.submit(TimelineRequest::CloseView { view_id: 1 }),
            Err(Error::WorkerStopped)
        ));
    }
}
