use std::sync::Arc;

use copilot_core::domain::asset::summarize_assets;
use copilot_core::domain::draft::DraftAction;
use copilot_core::domain::work_order::summarize_work_orders;
use copilot_core::identity::UserContext;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::{RunContext, ToolLogEntry};
use crate::memory::{ConversationStore, SessionOwner};
use crate::runtime::{
    AgentDefinition, AgentRuntime, ConversationItem, RunOptions, RunOutcome, RuntimeError,
};
use crate::tools::ToolRegistry;

pub const AGENT_NAME: &str = "Atlas Maintenance Copilot";

const SESSION_KEYS: [&str; 4] = ["sessionId", "conversationId", "correlationId", "threadId"];

/// One chat turn as handed over by the HTTP boundary, after identity
/// resolution and authorization have succeeded.
#[derive(Clone, Debug)]
pub struct ConversationRequest {
    pub prompt: String,
    pub agent_id: String,
    pub authorization_header: Option<String>,
    pub user_context: UserContext,
    pub metadata: Option<Value>,
    pub session_override: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ConversationResponse {
    pub session_id: String,
    pub agent_id: String,
    pub final_output: String,
    pub tool_calls: Vec<ToolLogEntry>,
    pub drafts: Vec<DraftAction>,
}

pub struct ConversationOrchestrator {
    runtime: Arc<dyn AgentRuntime>,
    store: Arc<dyn ConversationStore>,
    tools: Arc<ToolRegistry>,
    model: String,
}

impl ConversationOrchestrator {
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        store: Arc<dyn ConversationStore>,
        tools: Arc<ToolRegistry>,
        model: impl Into<String>,
    ) -> Self {
        Self { runtime, store, tools, model: model.into() }
    }

    pub async fn run(
        &self,
        request: ConversationRequest,
    ) -> Result<ConversationResponse, RuntimeError> {
        let ConversationRequest {
            prompt,
            agent_id,
            authorization_header,
            user_context,
            metadata,
            session_override,
        } = request;

        let session_id = session_override
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| session_id_from_metadata(metadata.as_ref()));
        let owner = SessionOwner::of(&user_context);

        let previous = match self.store.get(&session_id).await {
            Some(entry) if entry.owner != owner => {
                warn!(
                    event_name = "agent.memory.identity_mismatch",
                    session_id = %session_id,
                    agent_id = %agent_id,
                    "session belongs to a different user or tenant; starting fresh"
                );
                self.store.remove(&session_id).await;
                None
            }
            entry => entry,
        };

        let agent = AgentDefinition {
            name: AGENT_NAME.to_string(),
            model: self.model.clone(),
            instructions: agent_instructions(user_context.greeting_name()),
            tools: self.tools.clone(),
        };
        let mut context =
            RunContext::new(session_id.clone(), authorization_header, Some(user_context.clone()));

        // With a continuation token the runtime rebuilds context server-side,
        // so only the new prompt is sent.
        let (prior_history, input, previous_response_id) = match previous {
            Some(entry) if entry.continuation_token.is_some() => {
                (entry.history, vec![ConversationItem::user(&prompt)], entry.continuation_token)
            }
            Some(entry) => {
                let mut input = entry.history;
                input.push(ConversationItem::user(&prompt));
                (Vec::new(), input, None)
            }
            None => (Vec::new(), vec![ConversationItem::user(&prompt)], None),
        };
        info!(
            event_name = "agent.conversation.started",
            session_id = %session_id,
            agent_id = %agent_id,
            input_items = input.len(),
            continued = previous_response_id.is_some(),
            "running agent conversation"
        );

        let outcome = match self
            .runtime
            .run(&agent, input, RunOptions { context: &mut context, previous_response_id })
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                self.store.remove(&session_id).await;
                warn!(
                    event_name = "agent.conversation.failed",
                    session_id = %session_id,
                    agent_id = %agent_id,
                    tool_calls = context.tool_logs.len(),
                    error = %error,
                    "agent run failed; session memory discarded"
                );
                return Err(error);
            }
        };

        let RunOutcome { final_output, history, last_response_id } = outcome;
        let final_output = final_message(final_output.as_deref(), &history, &context, &user_context);
        let mut persisted = prior_history;
        persisted.extend(history);
        self.store.put(&session_id, persisted, last_response_id, owner).await;

        info!(
            event_name = "agent.conversation.completed",
            session_id = %session_id,
            agent_id = %agent_id,
            tool_calls = context.tool_logs.len(),
            drafts = context.drafts.len(),
            "agent conversation completed"
        );

        Ok(ConversationResponse {
            session_id,
            agent_id,
            final_output,
            tool_calls: context.tool_logs,
            drafts: context.drafts,
        })
    }
}

/// First non-blank string among the well-known metadata keys, else a fresh UUID.
pub fn session_id_from_metadata(metadata: Option<&Value>) -> String {
    metadata
        .and_then(|metadata| {
            SESSION_KEYS.iter().find_map(|key| {
                metadata
                    .get(*key)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
            })
        })
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn agent_instructions(display_name: &str) -> String {
    [
        "You are Atlas Assistant, a maintenance copilot for Atlas CMMS.".to_string(),
        format!("Always greet {display_name} by name in your first sentence."),
        "Use the available tools to fetch real data instead of guessing.".to_string(),
        "Summarise tool outputs clearly, reference work order or asset identifiers, and suggest \
         next steps when helpful."
            .to_string(),
        "If the user requests to close or complete a work order, call \
         prepare_work_order_completion_draft after identifying the correct record."
            .to_string(),
        "To propose a new work order, call prepare_work_order_creation_draft. Only call \
         create_work_order_immediately when the user explicitly asks for immediate creation."
            .to_string(),
        "If information is missing, explain what else you need and provide actionable guidance."
            .to_string(),
    ]
    .join(" ")
}

/// Final assistant text: runtime output, else the last assistant message, else
/// a summary of this turn's tool results, else a generic nudge.
pub fn final_message(
    final_output: Option<&str>,
    history: &[ConversationItem],
    context: &RunContext,
    user: &UserContext,
) -> String {
    if let Some(output) = final_output.map(str::trim).filter(|output| !output.is_empty()) {
        return output.to_string();
    }
    if let Some(text) = history.iter().rev().find_map(ConversationItem::assistant_text) {
        return text.to_string();
    }

    let name = user.greeting_name();
    let results = &context.tool_results;
    if let Some(work_orders) = results.work_orders.as_ref().filter(|orders| !orders.is_empty()) {
        return format!("Hi {name}, here's what I found:\n{}", summarize_work_orders(work_orders));
    }
    if let Some(assets) = results.assets.as_ref().filter(|assets| !assets.is_empty()) {
        return format!("Hi {name}, here are the latest asset details:\n{}", summarize_assets(assets));
    }
    if !context.insights.is_empty() {
        return format!("Hi {name}, here's what I found:\n{}", context.insights.join("\n"));
    }

    format!(
        "Hi {name}, I'm still processing your request. Try asking about open work orders or \
         assets to get started."
    )
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use copilot_core::domain::work_order::normalize_work_orders;
    use copilot_core::errors::{access_failure, AgentError};
    use serde_json::json;

    use super::{
        agent_instructions, final_message, session_id_from_metadata, ConversationOrchestrator,
        ConversationRequest,
    };
    use crate::memory::{ConversationStore, InMemoryConversationStore, SessionOwner};
    use crate::runtime::{
        AgentDefinition, AgentRuntime, ConversationItem, MessageContent, ContentPart,
        MessageRole, RunOptions, RunOutcome, RuntimeError,
    };
    use crate::test_support::{admin, run_context, user, StubBackend};
    use crate::tools::ToolRegistry;

    #[derive(Clone, Debug)]
    struct SeenRun {
        input: Vec<ConversationItem>,
        previous_response_id: Option<String>,
        instructions: String,
    }

    enum Step {
        Reply(&'static str),
        CallTool(&'static str, serde_json::Value),
        Silent,
    }

    /// Runs one scripted step per call and records what it was given.
    struct ScriptedRuntime {
        steps: Mutex<VecDeque<Step>>,
        seen: Mutex<Vec<SeenRun>>,
        counter: Mutex<u32>,
    }

    impl ScriptedRuntime {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                seen: Mutex::new(Vec::new()),
                counter: Mutex::new(0),
            })
        }

        fn seen(&self) -> Vec<SeenRun> {
            self.seen.lock().expect("seen lock").clone()
        }
    }

    #[async_trait]
    impl AgentRuntime for ScriptedRuntime {
        async fn run(
            &self,
            agent: &AgentDefinition,
            input: Vec<ConversationItem>,
            options: RunOptions<'_>,
        ) -> Result<RunOutcome, RuntimeError> {
            self.seen.lock().expect("seen lock").push(SeenRun {
                input: input.clone(),
                previous_response_id: options.previous_response_id.clone(),
                instructions: agent.instructions.clone(),
            });
            let response_id = {
                let mut counter = self.counter.lock().expect("counter lock");
                *counter += 1;
                format!("resp_{counter}")
            };
            let step = self.steps.lock().expect("steps lock").pop_front().unwrap_or(Step::Silent);

            let mut history = input;
            let final_output = match step {
                Step::Reply(text) => {
                    history.push(ConversationItem::assistant(text));
                    Some(text.to_string())
                }
                Step::CallTool(name, arguments) => {
                    agent
                        .tools
                        .invoke(name, arguments, options.context)
                        .await
                        .map_err(|source| RuntimeError::Tool { tool: name.to_string(), source })?;
                    None
                }
                Step::Silent => None,
            };
            Ok(RunOutcome { final_output, history, last_response_id: Some(response_id) })
        }
    }

    fn orchestrator(
        runtime: Arc<ScriptedRuntime>,
    ) -> (ConversationOrchestrator, Arc<InMemoryConversationStore>) {
        let store = Arc::new(InMemoryConversationStore::from_millis(60_000));
        let tools = Arc::new(ToolRegistry::maintenance(
            Arc::new(StubBackend::new().respond(
                "/api/agent/tools/work-orders/search",
                Ok(json!({"results": [{"id": 1, "code": "WO-1", "title": "Inspect HVAC filters"}]})),
            )),
            10,
        ));
        (ConversationOrchestrator::new(runtime, store.clone(), tools, "gpt-4o-mini"), store)
    }

    fn request(prompt: &str, session: &str) -> ConversationRequest {
        ConversationRequest {
            prompt: prompt.to_string(),
            agent_id: "default-agent".to_string(),
            authorization_header: Some("Bearer t".to_string()),
            user_context: admin(),
            metadata: Some(json!({"sessionId": session})),
            session_override: None,
        }
    }

    #[test]
    fn session_id_prefers_known_metadata_keys_in_order() {
        assert_eq!(
            session_id_from_metadata(Some(&json!({"threadId": "t-1", "conversationId": " c-1 "}))),
            "c-1"
        );
        assert_eq!(
            session_id_from_metadata(Some(&json!({"sessionId": "  ", "correlationId": "r-1"}))),
            "r-1"
        );

        let generated = session_id_from_metadata(Some(&json!({"sessionId": 12})));
        assert_eq!(generated.len(), 36);
        assert_ne!(generated, session_id_from_metadata(None));
    }

    #[test]
    fn instructions_greet_the_user_by_name() {
        let instructions = agent_instructions("Ava Agent");
        assert!(instructions.starts_with("You are Atlas Assistant"));
        assert!(instructions.contains("Always greet Ava Agent by name"));
    }

    #[test]
    fn final_message_fallback_order() {
        let mut context = run_context(admin());
        let user = admin();

        assert_eq!(final_message(Some("  Done. "), &[], &context, &user), "Done.");

        let history = vec![
            ConversationItem::assistant("older"),
            ConversationItem::Message {
                role: MessageRole::Assistant,
                content: MessageContent::Parts(vec![ContentPart {
                    kind: "output_text".to_string(),
                    text: Some("newest".to_string()),
                }]),
            },
            ConversationItem::user("thanks"),
        ];
        assert_eq!(final_message(Some("   "), &history, &context, &user), "newest");

        context.tool_results.work_orders = Some(normalize_work_orders(
            &json!([{"id": 1, "code": "WO-1", "title": "Inspect HVAC filters"}]),
            5,
        ));
        let summary = final_message(None, &[], &context, &user);
        assert!(summary.starts_with("Hi Ava Agent, here's what I found:\nFound 1 work order."));

        let empty = run_context(admin());
        assert_eq!(
            final_message(None, &[], &empty, &user),
            "Hi Ava Agent, I'm still processing your request. Try asking about open work orders \
             or assets to get started."
        );
    }

    #[tokio::test]
    async fn first_turn_sends_prompt_and_persists_history() {
        let runtime = ScriptedRuntime::new(vec![Step::Reply("Hello Ava Agent")]);
        let (orchestrator, store) = orchestrator(runtime.clone());

        let response = orchestrator.run(request("hi", "s-1")).await.expect("run");

        assert_eq!(response.session_id, "s-1");
        assert_eq!(response.final_output, "Hello Ava Agent");
        let seen = runtime.seen();
        assert_eq!(seen[0].input, vec![ConversationItem::user("hi")]);
        assert!(seen[0].instructions.contains("Always greet Ava Agent"));

        let entry = store.get("s-1").await.expect("persisted");
        assert_eq!(entry.continuation_token.as_deref(), Some("resp_1"));
        assert_eq!(entry.history.len(), 2);
        assert_eq!(entry.owner, SessionOwner::of(&admin()));
    }

    #[tokio::test]
    async fn continuation_token_short_path_sends_only_the_new_prompt() {
        let runtime = ScriptedRuntime::new(vec![Step::Reply("first"), Step::Reply("second")]);
        let (orchestrator, store) = orchestrator(runtime.clone());

        orchestrator.run(request("one", "s-1")).await.expect("first");
        orchestrator.run(request("two", "s-1")).await.expect("second");

        let seen = runtime.seen();
        assert_eq!(seen[1].input, vec![ConversationItem::user("two")]);
        assert_eq!(seen[1].previous_response_id.as_deref(), Some("resp_1"));

        let entry = store.get("s-1").await.expect("persisted");
        assert_eq!(entry.history.len(), 4, "stored history keeps both turns");
        assert_eq!(entry.continuation_token.as_deref(), Some("resp_2"));
    }

    #[tokio::test]
    async fn history_is_replayed_when_no_token_is_stored() {
        let runtime = ScriptedRuntime::new(vec![Step::Reply("again")]);
        let (orchestrator, store) = orchestrator(runtime.clone());
        store
            .put(
                "s-1",
                vec![ConversationItem::user("one"), ConversationItem::assistant("first")],
                None,
                SessionOwner::of(&admin()),
            )
            .await;

        orchestrator.run(request("two", "s-1")).await.expect("run");

        let seen = runtime.seen();
        assert_eq!(seen[0].input.len(), 3);
        assert_eq!(seen[0].input[2], ConversationItem::user("two"));
        assert!(seen[0].previous_response_id.is_none());
    }

    #[tokio::test]
    async fn different_identity_never_sees_previous_history() {
        let runtime = ScriptedRuntime::new(vec![Step::Reply("first"), Step::Reply("second")]);
        let (orchestrator, store) = orchestrator(runtime.clone());

        orchestrator.run(request("secret plans", "shared")).await.expect("first");

        let mut other = request("hello", "shared");
        other.user_context = user(Some("TECHNICIAN"), Some(99));
        other.user_context.id = Some("8".to_string());
        orchestrator.run(other).await.expect("second");

        let seen = runtime.seen();
        assert_eq!(seen[1].input, vec![ConversationItem::user("hello")]);
        assert!(seen[1].previous_response_id.is_none());

        let entry = store.get("shared").await.expect("rewritten");
        assert_eq!(entry.owner.tenant_id, Some(99));
        assert_eq!(entry.history.len(), 2);
    }

    #[tokio::test]
    async fn tool_results_feed_the_fallback_and_are_returned() {
        let runtime = ScriptedRuntime::new(vec![Step::CallTool("view_work_orders", json!({}))]);
        let (orchestrator, _) = orchestrator(runtime);

        let response = orchestrator.run(request("open work?", "s-1")).await.expect("run");

        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].tool_name, "view_work_orders");
        assert!(response.final_output.starts_with("Hi Ava Agent, here's what I found:"));
        assert!(response.final_output.contains("WO-1: Inspect HVAC filters"));
    }

    #[tokio::test]
    async fn failed_run_discards_the_session() {
        let runtime = ScriptedRuntime::new(vec![
            Step::Reply("first"),
            Step::CallTool("update_work_order", json!({"workOrderId": 1})),
        ]);
        let (orchestrator, store) = orchestrator(runtime);

        orchestrator.run(request("one", "s-1")).await.expect("first");
        let error = orchestrator.run(request("two", "s-1")).await.expect_err("tool error");

        assert!(matches!(error, RuntimeError::Tool { .. }));
        assert!(access_failure(&error).is_none());
        assert!(store.get("s-1").await.is_none());
    }

    #[tokio::test]
    async fn access_failures_inside_tools_remain_recognizable() {
        let runtime = ScriptedRuntime::new(vec![Step::CallTool("view_assets", json!({}))]);
        let (orchestrator, _) = orchestrator(runtime);
        let mut request = request("assets?", "s-1");
        request.user_context.tenant_id = None;

        let error = orchestrator.run(request).await.expect_err("tenant");

        assert!(matches!(access_failure(&error), Some(AgentError::TenantContext(_))));
    }
}
