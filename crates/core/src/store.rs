//! Per-caller session ownership.
//!
//! Every caller identity gets its own [`StreamingClient`]; there is no shared
//! "current session" slot, so concurrent users never clobber each other.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    streaming::{StopOutcome, StreamingClient},
    transport::Transport,
};

pub type SharedClient = Arc<Mutex<StreamingClient>>;

pub struct SessionStore {
    transport: Arc<dyn Transport>,
    clients: Mutex<HashMap<String, SharedClient>>,
}

impl SessionStore {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The caller's client, created on first use.
    pub async fn client(&self, caller: &str) -> SharedClient {
        let mut clients = self.clients.lock().await;
        clients
            .entry(caller.to_string())
            .or_insert_with(|| {
                info!(caller, "Creating streaming client for new caller");
                Arc::new(Mutex::new(StreamingClient::new(self.transport.clone())))
            })
            .clone()
    }

    /// The caller's client, if one was ever created.
    pub async fn existing(&self, caller: &str) -> Option<SharedClient> {
        self.clients.lock().await.get(caller).cloned()
    }

    /// Forgets a caller, stopping its session first if it has one.
    pub async fn release(&self, caller: &str) -> Option<StopOutcome> {
        let client = self.clients.lock().await.remove(caller)?;
        let mut client = client.lock().await;
        let session_id = client.session().map(|s| s.session_id.clone())?;
        Some(client.stop_session(&session_id).await)
    }

    pub async fn callers(&self) -> Vec<String> {
        let mut callers: Vec<String> = self.clients.lock().await.keys().cloned().collect();
        callers.sort();
        callers
    }

    /// A client not registered to any caller, for one-off remote queries.
    pub fn detached_client(&self) -> StreamingClient {
        StreamingClient::new(self.transport.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        streaming::{LifecycleState, SessionOptions},
        testing::ScriptedTransport,
        transport::endpoints,
    };
    use serde_json::json;

    fn session_ok(id: &str) -> serde_json::Value {
        json!({"code": 100, "data": {"session_id": id}})
    }

    #[tokio::test]
    async fn test_callers_have_independent_sessions() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(200, session_ok("alice-1")).push(200, session_ok("bob-1"));
        let store = SessionStore::new(transport.clone());
        let options = SessionOptions::default();

        store
            .client("alice")
            .await
            .lock()
            .await
            .new_session("anna", "v1", &options)
            .await
            .unwrap();
        store
            .client("bob")
            .await
            .lock()
            .await
            .new_session("anna", "v1", &options)
            .await
            .unwrap();

        let alice = store.client("alice").await;
        let bob = store.client("bob").await;
        assert_eq!(alice.lock().await.session().unwrap().session_id, "alice-1");
        assert_eq!(bob.lock().await.session().unwrap().session_id, "bob-1");
        // Bob's session did not stop Alice's.
        assert!(!transport.paths().iter().any(|p| p == endpoints::STOP_SESSION));
        assert_eq!(store.callers().await, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_same_caller_gets_same_client() {
        let store = SessionStore::new(Arc::new(ScriptedTransport::new()));
        let first = store.client("carol").await;
        let second = store.client("carol").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert!(store.existing("dave").await.is_none());
    }

    #[tokio::test]
    async fn test_release_stops_session() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(200, session_ok("s1"));
        let store = SessionStore::new(transport.clone());
        let client = store.client("alice").await;
        client
            .lock()
            .await
            .new_session("anna", "v1", &SessionOptions::default())
            .await
            .unwrap();

        let outcome = store.release("alice").await;
        assert!(matches!(outcome, Some(StopOutcome::Released(_))));
        assert_eq!(client.lock().await.state(), LifecycleState::Idle);
        assert!(store.existing("alice").await.is_none());
        assert!(store.release("alice").await.is_none());
    }
}
