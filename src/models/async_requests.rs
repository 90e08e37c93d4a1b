use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tokio::sync::{mpsc::UnboundedSender, oneshot};

use crate::{
    models::{descriptor::TimelineDescriptor, window::WhichPage},
    stores::state_store::StateStore,
};

/// Identifies one timeline screen owned by the worker.
pub type ViewId = u64;

/// Submits requests to the worker task.
#[derive(Debug, Clone)]
pub struct TimelineHandle {
    sender: UnboundedSender<TimelineRequest>,
}

impl TimelineHandle {
    pub(crate) fn new(sender: UnboundedSender<TimelineRequest>) -> Self {
        Self { sender }
    }

    /// Fails only if the worker task has stopped.
    pub fn submit(&self, request: TimelineRequest) -> crate::Result<()> {
        self.sender
            .send(request)
            .map_err(|_| crate::Error::WorkerStopped)
    }

    /// Encoded state of the timeline shown by `view_id`.
    pub async fn save_state(&self, view_id: ViewId) -> crate::Result<String> {
        let (reply, receiver) = oneshot::channel();
        self.submit(TimelineRequest::SaveState { view_id, reply })?;
        receiver.await.map_err(|_| crate::Error::WorkerStopped)?
    }

    /// Opens or replaces `view_id` with the persisted timeline. Returns whether it could be decoded.
    pub async fn restore_state(&self, view_id: ViewId, state: String) -> crate::Result<bool> {
        let (reply, receiver) = oneshot::channel();
        self.submit(TimelineRequest::RestoreState {
            view_id,
            state,
            reply,
        })?;
        receiver.await.map_err(|_| crate::Error::WorkerStopped)
    }

    /// Saves the state of `view_id` under `key`.
    pub async fn persist(
        &self,
        view_id: ViewId,
        store: &dyn StateStore,
        key: &str,
    ) -> crate::Result<()> {
        let state = self.save_state(view_id).await?;
        store.put(key, &state)?;
        Ok(())
    }

    /// Restores `view_id` from the state saved under `key`. Returns `false` if nothing
    /// usable was saved there.
    pub async fn restore_from(
        &self,
        view_id: ViewId,
        store: &dyn StateStore,
        key: &str,
    ) -> crate::Result<bool> {
        match store.get(key)? {
            Some(state) => self.restore_state(view_id, state).await,
            None => Ok(false),
        }
    }
}

/// The set of requests the worker task handles.
#[derive(Debug)]
pub enum TimelineRequest {
    /// Opens a view (or replaces the timeline of an existing one).
    OpenView {
        view_id: ViewId,
        descriptor: TimelineDescriptor,
    },
    /// Opens a view from a timeline link, with an optional search term that came along with it.
    OpenViewFromUri {
        view_id: ViewId,
        uri: String,
        search_query: Option<String>,
    },
    /// Loads a page of the view's timeline. Supersedes any load still running for that view.
    LoadPage { view_id: ViewId, page: WhichPage },
    /// Records how far the user has read, so that the next [`WhichPage::New`] page starts there.
    RememberPosition { view_id: ViewId, sent_date: i64 },
    CloseView { view_id: ViewId },
    SaveState {
        view_id: ViewId,
        reply: oneshot::Sender<crate::Result<String>>,
    },
    RestoreState {
        view_id: ViewId,
        state: String,
        reply: oneshot::Sender<bool>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenViewPayload {
    view_id: ViewId,
    descriptor: TimelineDescriptor,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenViewFromUriPayload {
    view_id: ViewId,
    uri: String,
    search_query: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadPagePayload {
    view_id: ViewId,
    page: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RememberPositionPayload {
    view_id: ViewId,
    sent_date: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseViewPayload {
    view_id: ViewId,
}

// Requests carrying a reply channel are only built in-process.
impl<'de> Deserialize<'de> for TimelineRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        let event = value
            .get("event")
            .and_then(|v| v.as_str())
            .ok_or_else(|| serde::de::Error::missing_field("event"))?;

        let payload = value
            .get("payload")
            .ok_or_else(|| serde::de::Error::missing_field("payload"))?;

        match event {
            "openView" => {
                let data: OpenViewPayload =
                    serde_json::from_value(payload.clone()).map_err(serde::de::Error::custom)?;
                Ok(TimelineRequest::OpenView {
                    view_id: data.view_id,
                    descriptor: data.descriptor,
                })
            }
            "openViewFromUri" => {
                let data: OpenViewFromUriPayload =
                    serde_json::from_value(payload.clone()).map_err(serde::de::Error::custom)?;
                Ok(TimelineRequest::OpenViewFromUri {
                    view_id: data.view_id,
                    uri: data.uri,
                    search_query: data.search_query,
                })
            }
            "loadPage" => {
                let data: LoadPagePayload =
                    serde_json::from_value(payload.clone()).map_err(serde::de::Error::custom)?;
                Ok(TimelineRequest::LoadPage {
                    view_id: data.view_id,
                    page: WhichPage::load(data.page.as_deref()),
                })
            }
            "rememberPosition" => {
                let data: RememberPositionPayload =
                    serde_json::from_value(payload.clone()).map_err(serde::de::Error::custom)?;
                Ok(TimelineRequest::RememberPosition {
                    view_id: data.view_id,
                    sent_date: data.sent_date,
                })
            }
            "closeView" => {
                let data: CloseViewPayload =
                    serde_json::from_value(payload.clone()).map_err(serde::de::Error::custom)?;
                Ok(TimelineRequest::CloseView {
                    view_id: data.view_id,
                })
            }
            other => Err(serde::de::Error::unknown_variant(
                other,
                &[
                    "openView",
                    "openViewFromUri",
                    "loadPage",
                    "rememberPosition",
                    "closeView",
                ],
            )),
        }
    }
}
