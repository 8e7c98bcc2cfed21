use std::sync::Arc;
use std::time::Duration;

use switchboard::providers::mock::{MockProvider, MockReply};
use switchboard::session::SqliteSessionStore;
use switchboard::{CapabilityDescriptor, CapabilityRegistry, Dispatcher};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::slack::{SlackClient, SlackVerifier};
use crate::state::{AppState, SlackState};

pub(crate) const TEST_SIGNING_SECRET: &str = "test-signing-secret";

/// An app state backed by a throwaway SQLite store, a scripted provider, and
/// a verifier-only Slack setup. The TempDir must be held for the test's life.
pub(crate) async fn scripted_state(
    script: Vec<MockReply>,
    capabilities: Vec<CapabilityDescriptor>,
) -> (Arc<AppState>, MockProvider, TempDir) {
    build_state(script, capabilities, None).await
}

/// Same, but replies get posted through the given Slack client.
pub(crate) async fn scripted_state_with_client(
    script: Vec<MockReply>,
    client: SlackClient,
) -> (Arc<AppState>, MockProvider, TempDir) {
    build_state(script, Vec::new(), Some(client)).await
}

async fn build_state(
    script: Vec<MockReply>,
    capabilities: Vec<CapabilityDescriptor>,
    client: Option<SlackClient>,
) -> (Arc<AppState>, MockProvider, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        SqliteSessionStore::new(&dir.path().join("turns.db"))
            .await
            .unwrap(),
    );
    let provider = MockProvider::with_script(script);
    let registry = Arc::new(CapabilityRegistry::new(
        capabilities,
        Arc::new(provider.clone()),
        Duration::from_secs(5),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(provider.clone()),
        Arc::clone(&registry),
        4,
    ));
    let slack = Some(Arc::new(SlackState {
        verifier: SlackVerifier::new(TEST_SIGNING_SECRET),
        client,
    }));
    let state = AppState::new(
        dispatcher,
        registry,
        store,
        slack,
        10,
        CancellationToken::new(),
    );
    (state, provider, dir)
}
