//! ReAct agent implementation (Reasoning + Acting)
//!
//! Each round the model reasons over the formatted memory, then every tool
//! use it produced is executed. A plain-text answer is rewritten into a call
//! to the finish function, so "answer" and "tool call" share one path: the
//! loop ends on the first round whose acting step yields a reply message.

use async_trait::async_trait;
use futures::future::join_all;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::{hook_arg, run_hooked, Agent, AgentBase, AgentExt};
use crate::agents::config::{InterruptPolicy, ReActAgentConfig};
use crate::agents::domain::{
    generate_tool_call_id, BlockKind, ContentBlock, Message, Role, ToolChunk, ToolDefinition,
    ToolUse,
};
use crate::agents::error::{AgentError, AgentResult};
use crate::agents::hooks::{AgentClass, CallArgs, HookType, Operation, REACT_HOOK_TYPES};
use crate::agents::llm::{ChatModel, CompletionRequest, ResponseAccumulator, ToolChoice};
use crate::agents::memory::{apply_strategy, create_memory, long_term_memory_tools, LongTermMemory};
use crate::agents::schema;
use crate::agents::tools::Toolkit;

/// Name of the function that turns a response into the agent's reply
pub const FINISH_FUNCTION_NAME: &str = "generate_response";

const SUMMARIZE_HINT: &str = "You have failed to generate response within the maximum iterations. Now respond directly by summarizing the current situation.";

const INTERRUPTED_TOOL_RESULT: &str = "The tool call has been interrupted by the user.";

const LONG_TERM_MEMORY_NAME: &str = "long_term_memory";

/// ReAct agent: Reasoning + Action loop with tool calling
pub struct ReActAgent {
    base: AgentBase,
    config: ReActAgentConfig,
    model: Arc<dyn ChatModel>,
    toolkit: Toolkit,
    long_term_memory: Option<Arc<dyn LongTermMemory>>,
}

impl ReActAgent {
    /// Create a new ReAct agent
    pub fn new(config: ReActAgentConfig, model: Arc<dyn ChatModel>, toolkit: Toolkit) -> Self {
        let base = AgentBase::with_memory(config.name.clone(), create_memory(&config.memory));
        Self {
            base,
            config,
            model,
            toolkit,
            long_term_memory: None,
        }
    }

    /// Use a caller-chosen agent id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.base = self.base.with_id(id);
        self
    }

    /// Attach long-term memory, driven as the config's mode says
    pub fn with_long_term_memory(mut self, memory: Arc<dyn LongTermMemory>) -> Self {
        if self.config.long_term_memory_mode.agent_control() {
            for tool in long_term_memory_tools(memory.clone()) {
                self.toolkit.register(tool);
            }
        }
        self.long_term_memory = Some(memory);
        self
    }

    pub fn config(&self) -> &ReActAgentConfig {
        &self.config
    }

    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    fn finish_tool_definition(&self, structured_model: Option<&Value>) -> ToolDefinition {
        let base = json!({
            "type": "object",
            "properties": {
                "response": {
                    "type": "string",
                    "description": "Your response to the user."
                }
            },
            "required": ["response"]
        });
        let parameters = match structured_model {
            Some(extra) => schema::extend_object_schema(&base, extra),
            None => base,
        };
        ToolDefinition::new(
            FINISH_FUNCTION_NAME,
            "Generate a response. Note only the input argument `response` is visible to others.",
            parameters,
        )
    }

    fn tool_definitions(&self, structured_model: Option<&Value>) -> Vec<ToolDefinition> {
        let mut definitions = self.toolkit.definitions();
        definitions.push(self.finish_tool_definition(structured_model));
        definitions
    }

    /// System prompt followed by memory, trimmed by the memory strategy
    async fn format_prompt(&self) -> AgentResult<Vec<Message>> {
        let history = self.base.memory().get_memory().await?;
        let mut messages = vec![Message::system(&self.config.sys_prompt)];
        messages.extend(apply_strategy(&history, &self.config.memory.strategy));
        Ok(messages)
    }

    /// Call the model, filling `msg` with its output and printing as it grows
    async fn generate(&self, msg: &mut Message, request: CompletionRequest) -> AgentResult<()> {
        if !self.config.stream {
            let response = self
                .base
                .cancellable(async { Ok(self.model.complete(request).await?) })
                .await?;
            msg.content = response.content;
            return self.print(msg, true).await;
        }

        if let Err(e) = self.consume_stream(msg, request).await {
            self.base.forget_stream(msg.id());
            return Err(e);
        }
        self.print(msg, true).await
    }

    async fn consume_stream(&self, msg: &mut Message, request: CompletionRequest) -> AgentResult<()> {
        let mut stream = self.model.complete_stream(request);
        let mut accumulator = ResponseAccumulator::new();
        loop {
            let next = self
                .base
                .cancellable(async { Ok(stream.next().await) })
                .await?;
            match next {
                Some(Ok(chunk)) => {
                    accumulator.apply(&chunk);
                    msg.content = accumulator.blocks();
                    self.print(msg, false).await?;
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            }
        }
    }

    async fn reasoning(&self, structured_model: Option<&Value>) -> AgentResult<Message> {
        let output = run_hooked(self, Operation::Reasoning, CallArgs::new(), |args| async move {
            let tool_choice: Option<ToolChoice> = hook_arg(&args, "tool_choice")?;
            self.reasoning_impl(structured_model, tool_choice)
                .await
                .map(Some)
        })
        .await?;
        output.ok_or_else(|| AgentError::Internal("reasoning hooks produced no message".to_string()))
    }

    async fn reasoning_impl(
        &self,
        structured_model: Option<&Value>,
        tool_choice: Option<ToolChoice>,
    ) -> AgentResult<Message> {
        let request = CompletionRequest {
            messages: self.format_prompt().await?,
            tools: Some(self.tool_definitions(structured_model)),
            tool_choice,
            stream: self.config.stream,
            ..Default::default()
        };

        let mut msg = Message::new(self.base.name(), Role::Assistant, Vec::new());
        let outcome = self.generate(&mut msg, request).await;

        if outcome.is_ok() && !msg.has_content_blocks(BlockKind::ToolUse) {
            let response = msg.get_text_content().unwrap_or_default();
            msg.content.retain(|block| block.kind() == BlockKind::Thinking);
            msg.content.push(ContentBlock::tool_use(
                generate_tool_call_id(),
                FINISH_FUNCTION_NAME,
                json!({ "response": response }),
            ));
        }

        if !msg.content.is_empty() {
            self.base.memory().add(vec![msg.clone()]).await?;
        }

        if let Err(AgentError::Cancelled) = &outcome {
            for tool_use in msg.tool_uses() {
                let result = Message::new(
                    "system",
                    Role::System,
                    vec![ContentBlock::tool_result(
                        tool_use.id,
                        tool_use.name,
                        vec![ContentBlock::text(INTERRUPTED_TOOL_RESULT)],
                    )],
                );
                self.base.memory().add(vec![result.clone()]).await?;
                self.print(&result, true).await?;
            }
        }

        outcome.map(|_| msg)
    }

    async fn acting(
        &self,
        tool_use: ToolUse,
        structured_model: Option<&Value>,
    ) -> AgentResult<Option<Message>> {
        let block = ContentBlock::tool_use(tool_use.id, tool_use.name, tool_use.input);
        let call = CallArgs::new().arg(serde_json::to_value(&block)?);

        run_hooked(self, Operation::Acting, call, |args| async move {
            let block: ContentBlock = hook_arg(&args, "tool_call")?;
            let ContentBlock::ToolUse { id, name, input } = block else {
                return Err(AgentError::Validation(
                    "tool_call must be a tool_use block".to_string(),
                ));
            };
            self.acting_impl(ToolUse { id, name, input }, structured_model)
                .await
        })
        .await
    }

    async fn acting_impl(
        &self,
        tool_use: ToolUse,
        structured_model: Option<&Value>,
    ) -> AgentResult<Option<Message>> {
        let mut result = Message::new(
            "system",
            Role::System,
            vec![ContentBlock::tool_result(&tool_use.id, &tool_use.name, Vec::new())],
        );

        let outcome = self.execute_tool(&tool_use, structured_model, &mut result).await;
        // The tool result is kept whether or not the tool succeeded
        self.base.memory().add(vec![result]).await?;
        outcome
    }

    async fn execute_tool(
        &self,
        tool_use: &ToolUse,
        structured_model: Option<&Value>,
        result: &mut Message,
    ) -> AgentResult<Option<Message>> {
        let set_output = |result: &mut Message, output: Vec<ContentBlock>| {
            result.content = vec![ContentBlock::tool_result(&tool_use.id, &tool_use.name, output)];
        };

        if tool_use.name == FINISH_FUNCTION_NAME {
            let (chunk, reply) = self.finish(tool_use, structured_model);
            set_output(result, chunk.content);
            if reply.is_none() {
                self.print(result, true).await?;
            }
            return Ok(reply);
        }

        debug!(agent = %self.base.name(), tool = %tool_use.name, "Calling tool");
        let mut stream = self.toolkit.call_tool(tool_use).await;
        let mut finished = false;
        while let Some(item) = stream.next().await {
            let chunk = item.unwrap_or_else(|e| ToolChunk::text(format!("Error: {}", e)));
            finished = chunk.is_last;
            set_output(result, chunk.content);
            self.print(result, finished).await?;
        }
        if !finished {
            self.print(result, true).await?;
        }
        Ok(None)
    }

    /// Validate the finish call and build the reply it describes
    fn finish(&self, tool_use: &ToolUse, structured_model: Option<&Value>) -> (ToolChunk, Option<Message>) {
        let response = tool_use
            .input
            .get("response")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let mut reply = Message::assistant(self.base.name(), response);

        if let Some(schema) = structured_model {
            let mut fields = tool_use.input.as_object().cloned().unwrap_or_default();
            fields.remove("response");
            let fields = Value::Object(fields);
            if let Err(e) = schema::validate(&fields, schema) {
                let chunk = ToolChunk::text(format!("Arguments Validation Error: {}", e))
                    .with_metadata("success", Value::Bool(false));
                return (chunk, None);
            }
            if let Value::Object(fields) = fields {
                reply.metadata.extend(fields);
            }
        }

        let chunk = ToolChunk::text("Successfully generated response.")
            .with_metadata("success", Value::Bool(true));
        (chunk, Some(reply))
    }

    /// Run every tool use of one round; the first reply in block order wins
    async fn act_all(
        &self,
        tool_uses: Vec<ToolUse>,
        structured_model: Option<&Value>,
    ) -> AgentResult<Option<Message>> {
        let outcomes = if self.config.parallel_tool_calls {
            join_all(
                tool_uses
                    .into_iter()
                    .map(|tool_use| self.acting(tool_use, structured_model)),
            )
            .await
        } else {
            let mut outcomes = Vec::with_capacity(tool_uses.len());
            for tool_use in tool_uses {
                outcomes.push(self.acting(tool_use, structured_model).await);
            }
            outcomes
        };

        let mut reply = None;
        for outcome in outcomes {
            let produced = outcome?;
            if reply.is_none() {
                reply = produced;
            }
        }
        Ok(reply)
    }

    async fn summarizing(&self) -> AgentResult<Message> {
        let mut messages = self.format_prompt().await?;
        messages.push(Message::text("user", Role::User, SUMMARIZE_HINT));
        let request = CompletionRequest {
            messages,
            stream: self.config.stream,
            ..Default::default()
        };

        let mut msg = Message::new(self.base.name(), Role::Assistant, Vec::new());
        self.generate(&mut msg, request).await?;
        Ok(msg)
    }
}

impl AgentClass for ReActAgent {
    const TYPE_NAME: &'static str = "ReActAgent";
    const SUPPORTED_HOOK_TYPES: &'static [HookType] = REACT_HOOK_TYPES;
}

#[async_trait]
impl Agent for ReActAgent {
    fn base(&self) -> &AgentBase {
        &self.base
    }

    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn supported_hook_types(&self) -> &'static [HookType] {
        Self::SUPPORTED_HOOK_TYPES
    }

    async fn reply_impl(
        &self,
        msg: Option<Message>,
        structured_model: Option<Value>,
    ) -> AgentResult<Message> {
        let memory = self.base.memory();
        if let Some(msg) = &msg {
            memory.add(vec![msg.clone()]).await?;
        }

        let static_memory = self
            .long_term_memory
            .as_ref()
            .filter(|_| self.config.long_term_memory_mode.static_control());

        if let (Some(ltm), Some(input)) = (static_memory, &msg) {
            if let Some(hint) = ltm.retrieve(std::slice::from_ref(input)).await? {
                let hint = Message::text(
                    LONG_TERM_MEMORY_NAME,
                    Role::System,
                    format!("<long_term_memory>{}</long_term_memory>", hint),
                );
                self.print(&hint, true).await?;
                memory.add(vec![hint]).await?;
            }
        }

        let structured_model = structured_model.as_ref();
        let mut reply = None;
        for round in 1..=self.config.max_iters {
            debug!(agent = %self.base.name(), round, "Reasoning");
            let reasoning = self.reasoning(structured_model).await?;
            reply = self.act_all(reasoning.tool_uses(), structured_model).await?;
            if reply.is_some() {
                break;
            }
        }

        let reply = match reply {
            Some(reply) => reply,
            None => {
                info!(
                    agent = %self.base.name(),
                    max_iters = self.config.max_iters,
                    "No response within the iteration limit, summarizing"
                );
                self.summarizing().await?
            }
        };

        if let Some(ltm) = static_memory {
            let mut exchange = memory.get_memory().await?;
            exchange.push(reply.clone());
            ltm.record(&exchange).await?;
        }

        memory.add(vec![reply.clone()]).await?;
        Ok(reply)
    }

    async fn handle_interrupt(&self, _msg: Option<Message>) -> AgentResult<Message> {
        let reply = Message::assistant(self.base.name(), super::INTERRUPT_REPLY);
        self.print(&reply, true).await?;
        self.base.memory().add(vec![reply.clone()]).await?;
        if self.config.interrupt_policy == InterruptPolicy::ClearMemory {
            self.base.memory().clear().await?;
        }
        Ok(reply)
    }
}
