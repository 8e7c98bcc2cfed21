use std::sync::Arc;

use serde_json::json;
use switchboard::{
    CapabilityRegistry, DispatchOutcome, DispatchRequest, DispatchResult, Dispatcher,
    SessionStore, Turn,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::slack::{SlackClient, SlackVerifier};

/// Slack integration pieces, present only when a signing secret is
/// configured. The client is separately optional: without a bot token we can
/// still verify and dispatch, just not reply.
pub struct SlackState {
    pub verifier: SlackVerifier,
    pub client: Option<SlackClient>,
}

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<CapabilityRegistry>,
    pub store: Arc<dyn SessionStore>,
    pub slack: Option<Arc<SlackState>>,
    pub history_limit: usize,
    /// Root token for in-flight dispatches; cancelled at shutdown.
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        registry: Arc<CapabilityRegistry>,
        store: Arc<dyn SessionStore>,
        slack: Option<Arc<SlackState>>,
        history_limit: usize,
        cancel: CancellationToken,
    ) -> Arc<AppState> {
        Arc::new(AppState {
            dispatcher,
            registry,
            store,
            slack,
            history_limit,
            cancel,
        })
    }

    /// The full background flow for one inbound request: load context,
    /// record the human turn, dispatch, record the outcome. Store failures
    /// degrade the flow (less context, a gap in the record) but never stop
    /// the reply from being produced.
    pub async fn process_query(
        &self,
        session_id: &str,
        requester: &str,
        query: &str,
        request_id: &str,
    ) -> DispatchResult {
        let history = match self.store.fetch(session_id, self.history_limit).await {
            Ok(turns) => turns,
            Err(error) => {
                warn!(session_id, error = %error, "history fetch failed, continuing without it");
                Vec::new()
            }
        };

        if let Err(error) = self.store.append(session_id, &Turn::human(query)).await {
            warn!(session_id, error = %error, "failed to record the human turn");
        }

        let request = DispatchRequest::new(request_id, requester, query).with_history(history);
        let result = self
            .dispatcher
            .dispatch(request, self.cancel.child_token())
            .await;

        let mut reply = Turn::assistant(result.user_text())
            .with_metadata("request_id", json!(request_id));
        if result.quick {
            reply = reply.with_metadata("quick_response", json!(true));
        }
        if let DispatchOutcome::Failed { detail } = &result.outcome {
            reply = reply.with_metadata("error", json!(detail));
        }
        if let Err(error) = self.store.append(session_id, &reply).await {
            error!(session_id, error = %error, "failed to record the assistant turn");
        }

        info!(
            session_id,
            request_id,
            invoked = result.invoked.len(),
            failed = result.is_failure(),
            "request processed"
        );
        result
    }
}
