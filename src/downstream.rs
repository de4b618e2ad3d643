//! Downstream Client (spec §4 component table, §4.5, §4.6): binds one
//! `rmcp` [`RunningService`] to a transport and forwards the
//! notifications the transport's background loop receives into the
//! hub's Notification Relay.
//!
//! Grounded in the teacher's `McpConnection`, which drives
//! `RunningService<RoleClient, ()>` directly with the unit handler. We
//! need more than the unit handler gives us — progress and
//! `list_changed` notifications must be bridged out rather than
//! silently dropped — so `HubClientHandler` implements `ClientHandler`
//! instead of using `()`, following the "client → hub is a callback
//! captured at construction, not a back-pointer" rule (spec §9).

use rmcp::handler::client::ClientHandler;
use rmcp::model::{
    ProgressNotificationParam, PromptListChangedNotificationParam,
    ResourceListChangedNotificationParam, ToolListChangedNotificationParam,
};
use rmcp::service::{NotificationContext, RunningService};
use rmcp::RoleClient;
use std::sync::Arc;

/// What a downstream connection reports back to the hub, without the
/// hub handing the downstream client a pointer back to itself.
#[derive(Debug, Clone)]
pub enum DownstreamEvent {
    Progress(ProgressNotificationParam),
    ToolListChanged,
    ResourceListChanged,
    PromptListChanged,
}

pub type EventSink = Arc<dyn Fn(DownstreamEvent) + Send + Sync>;

/// `ClientHandler` impl that forwards every notification of interest to
/// a sink captured at construction (spec §9: avoid a Server → Hub
/// back-pointer).
#[derive(Clone)]
pub struct HubClientHandler {
    sink: EventSink,
}

impl HubClientHandler {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }
}

impl ClientHandler for HubClientHandler {
    async fn on_progress(
        &self,
        params: ProgressNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        (self.sink)(DownstreamEvent::Progress(params));
    }

    async fn on_tool_list_changed(
        &self,
        _params: ToolListChangedNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        (self.sink)(DownstreamEvent::ToolListChanged);
    }

    async fn on_resource_list_changed(
        &self,
        _params: ResourceListChangedNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        (self.sink)(DownstreamEvent::ResourceListChanged);
    }

    async fn on_prompt_list_changed(
        &self,
        _params: PromptListChangedNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        (self.sink)(DownstreamEvent::PromptListChanged);
    }
}

/// One connected downstream MCP client: the running `rmcp` service plus
/// the id of the server it is bound to.
pub struct DownstreamClient {
    pub server_id: String,
    pub service: RunningService<RoleClient, HubClientHandler>,
}

impl DownstreamClient {
    pub fn new(server_id: String, service: RunningService<RoleClient, HubClientHandler>) -> Self {
        Self { server_id, service }
    }

    pub async fn list_tools(&self) -> Result<rmcp::model::ListToolsResult, rmcp::ServiceError> {
        self.service.list_tools(Default::default()).await
    }

    pub async fn list_resources(&self) -> Result<rmcp::model::ListResourcesResult, rmcp::ServiceError> {
        self.service.list_resources(Default::default()).await
    }

    pub async fn list_prompts(&self) -> Result<rmcp::model::ListPromptsResult, rmcp::ServiceError> {
        self.service.list_prompts(Default::default()).await
    }

    pub async fn call_tool(
        &self,
        params: rmcp::model::CallToolRequestParams,
    ) -> Result<rmcp::model::CallToolResult, rmcp::ServiceError> {
        self.service.call_tool(params).await
    }

    pub async fn read_resource(
        &self,
        params: rmcp::model::ReadResourceRequestParams,
    ) -> Result<rmcp::model::ReadResourceResult, rmcp::ServiceError> {
        self.service.read_resource(params).await
    }

    pub async fn get_prompt(
        &self,
        params: rmcp::model::GetPromptRequestParams,
    ) -> Result<rmcp::model::GetPromptResult, rmcp::ServiceError> {
        self.service.get_prompt(params).await
    }

    pub async fn cancel(self) -> Result<(), anyhow::Error> {
        self.service.cancel().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Exercises the sink plumbing directly rather than through
    /// `ClientHandler::on_progress`, since constructing a real
    /// `NotificationContext` needs a live `rmcp` peer connection.
    #[test]
    fn sink_receives_every_event_variant_pushed_to_it() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let handler = HubClientHandler::new(Arc::new(move |event| {
            received_clone.lock().unwrap().push(event);
        }));

        let params = ProgressNotificationParam {
            progress_token: rmcp::model::ProgressToken(serde_json::Value::String("t1".into())),
            progress: 0.5,
            total: Some(1.0),
            message: Some("working".into()),
        };
        (handler.sink)(DownstreamEvent::Progress(params));
        (handler.sink)(DownstreamEvent::ToolListChanged);

        let events = received.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DownstreamEvent::Progress(_)));
        assert!(matches!(events[1], DownstreamEvent::ToolListChanged));
    }
}
