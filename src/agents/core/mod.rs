//! Agent execution core
//!
//! [`Agent`] is what concrete agents implement: their reply and observe
//! bodies plus identity. [`AgentExt`] is implemented for every agent and is
//! the public surface: each operation binds its arguments, runs the hook
//! chain around the body, and `call` adds cancellation, interrupt recovery
//! and subscriber broadcast on top of `reply`.
//!
//! Provided agents:
//! - EchoAgent: replies `echo: <text>`
//! - UserAgent: relays a line of human input
//! - ReActAgent: reasoning + acting loop with tool calling

mod console;
mod echo;
mod react;
mod user;

pub use console::{CaptureConsole, Console, PrintEvent, StdoutConsole};
pub use echo::EchoAgent;
pub use react::{ReActAgent, FINISH_FUNCTION_NAME};
pub use user::{InputSource, StdinInput, UserAgent};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use console::MessagePrinter;

use crate::agents::domain::{AgentInfo, Message};
use crate::agents::error::{AgentError, AgentResult, HookError};
use crate::agents::hooks::{
    check_instance_hook, hook_chain, run_post_hooks, run_pre_hooks, CallArgs, Hook, HookArgs,
    HookContext, HookRegistry, HookType, Operation, BASE_HOOK_TYPES,
};
use crate::agents::memory::{InMemoryMemory, MemoryBase};

/// Acknowledgment produced when a reply is interrupted
pub const INTERRUPT_REPLY: &str = "I noticed that you have interrupted me. What can I do for you?";

/// Subscriber group used by `reset_subscribers`
pub const DEFAULT_SUBSCRIBER_GROUP: &str = "default";

tokio::task_local! {
    static REPLY_TOKEN: CancellationToken;
}

struct ReplyTask {
    seq: u64,
    reply_id: String,
    token: CancellationToken,
}

/// State shared by every agent: identity, memory, hooks, subscribers,
/// the in-flight reply handle and the printer
pub struct AgentBase {
    id: String,
    name: String,
    memory: Arc<dyn MemoryBase>,
    hooks: RwLock<HookRegistry>,
    subscribers: Mutex<Vec<(String, Vec<Weak<dyn Agent>>)>>,
    reply_task: Mutex<Option<ReplyTask>>,
    reply_seq: AtomicU64,
    printer: MessagePrinter,
}

impl AgentBase {
    /// New base with a fresh id and unbounded in-memory memory
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_memory(name, Arc::new(InMemoryMemory::new()))
    }

    pub fn with_memory(name: impl Into<String>, memory: Arc<dyn MemoryBase>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: name.into(),
            memory,
            hooks: RwLock::new(HookRegistry::new()),
            subscribers: Mutex::new(Vec::new()),
            reply_task: Mutex::new(None),
            reply_seq: AtomicU64::new(0),
            printer: MessagePrinter::new(),
        }
    }

    /// Use a caller-chosen id, as remote agent creation does
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn memory(&self) -> &Arc<dyn MemoryBase> {
        &self.memory
    }

    /// Route rendered output somewhere other than stdout
    pub fn set_console(&self, console: Arc<dyn Console>) {
        self.printer.set_console(console);
    }

    /// Make `print` render nothing; hooks still run
    pub fn disable_console_output(&self) {
        self.printer.set_enabled(false);
    }

    pub fn enable_console_output(&self) {
        self.printer.set_enabled(true);
    }

    /// Receive every print event from now on
    pub fn enable_msg_queue(&self) -> mpsc::UnboundedReceiver<PrintEvent> {
        self.printer.enable_queue()
    }

    pub fn disable_msg_queue(&self) {
        self.printer.disable_queue();
    }

    /// Discard streaming print state for a message cut off before its last chunk
    pub fn forget_stream(&self, msg_id: &str) {
        self.printer.forget(msg_id);
    }

    /// Correlation id of the reply in flight, if any
    pub fn reply_id(&self) -> Option<String> {
        self.reply_task.lock().as_ref().map(|t| t.reply_id.clone())
    }

    /// Whether a reply started through `call` is still running
    pub fn is_replying(&self) -> bool {
        self.reply_task.lock().is_some()
    }

    /// Cancellation token of the current `call`
    ///
    /// Outside a `call` this is a fresh token nobody cancels.
    pub fn cancellation_token(&self) -> CancellationToken {
        REPLY_TOKEN
            .try_with(|token| token.clone())
            .unwrap_or_default()
    }

    /// Run `fut` until it finishes or the current `call` is interrupted
    pub async fn cancellable<T, F>(&self, fut: F) -> AgentResult<T>
    where
        F: Future<Output = AgentResult<T>>,
    {
        let token = self.cancellation_token();
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(AgentError::Cancelled),
            result = fut => result,
        }
    }

    /// Fail with `Cancelled` if the current `call` was interrupted
    pub fn check_cancelled(&self) -> AgentResult<()> {
        if self.cancellation_token().is_cancelled() {
            Err(AgentError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn begin_reply(&self) -> (u64, CancellationToken) {
        let seq = self.reply_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        *self.reply_task.lock() = Some(ReplyTask {
            seq,
            reply_id: uuid::Uuid::new_v4().simple().to_string(),
            token: token.clone(),
        });
        (seq, token)
    }

    fn finish_reply(&self, seq: u64) {
        let mut task = self.reply_task.lock();
        if task.as_ref().is_some_and(|t| t.seq == seq) {
            *task = None;
        }
    }

    /// Cancel the in-flight reply; returns false when idle
    pub fn interrupt(&self) -> bool {
        match self.reply_task.lock().as_ref() {
            Some(task) if !task.token.is_cancelled() => {
                task.token.cancel();
                true
            }
            _ => false,
        }
    }

    fn hook_context(&self, type_name: &str) -> HookContext {
        HookContext {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
            type_name: type_name.to_string(),
            reply_id: self.reply_id(),
        }
    }

    /// Replace the default subscriber group
    pub fn reset_subscribers(&self, subscribers: &[Arc<dyn Agent>]) {
        self.reset_hub_subscribers(DEFAULT_SUBSCRIBER_GROUP, subscribers);
    }

    /// Replace one named subscriber group, creating it if needed
    pub fn reset_hub_subscribers(&self, hub: &str, subscribers: &[Arc<dyn Agent>]) {
        let filtered: Vec<Weak<dyn Agent>> = subscribers
            .iter()
            .filter(|s| s.base().id() != self.id)
            .map(Arc::downgrade)
            .collect();

        let mut groups = self.subscribers.lock();
        match groups.iter_mut().find(|(name, _)| name == hub) {
            Some(group) => group.1 = filtered,
            None => groups.push((hub.to_string(), filtered)),
        }
    }

    /// Drop one named subscriber group
    pub fn remove_hub_subscribers(&self, hub: &str) {
        self.subscribers.lock().retain(|(name, _)| name != hub);
    }

    pub fn clear_subscribers(&self) {
        self.subscribers.lock().clear();
    }

    /// Live subscribers, group by group in insertion order
    pub fn subscribers(&self) -> Vec<Arc<dyn Agent>> {
        self.subscribers
            .lock()
            .iter()
            .flat_map(|(_, group)| group.iter().filter_map(Weak::upgrade))
            .collect()
    }
}

/// A stateful actor that turns input messages into replies
#[async_trait]
pub trait Agent: Send + Sync {
    fn base(&self) -> &AgentBase;

    /// Registered type name, also the class-scope hook key
    fn type_name(&self) -> &'static str;

    fn supported_hook_types(&self) -> &'static [HookType] {
        BASE_HOOK_TYPES
    }

    /// The reply body; hooks are applied around it by [`AgentExt::reply`]
    async fn reply_impl(
        &self,
        msg: Option<Message>,
        structured_model: Option<Value>,
    ) -> AgentResult<Message>;

    /// The observe body; defaults to storing the messages in memory
    async fn observe_impl(&self, msgs: Vec<Message>) -> AgentResult<()> {
        self.base().memory().add(msgs).await
    }

    /// Recovery after `call` saw the reply cancelled
    async fn handle_interrupt(&self, _msg: Option<Message>) -> AgentResult<Message> {
        let reply = Message::assistant(self.base().name(), INTERRUPT_REPLY);
        self.print(&reply, true).await?;
        Ok(reply)
    }
}

pub(crate) fn hook_arg<T: DeserializeOwned>(args: &HookArgs, name: &str) -> AgentResult<T> {
    let value = args.get(name).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
        AgentError::Validation(format!("hook argument '{}' has the wrong shape: {}", name, e))
    })
}

/// Run `body` wrapped in the pre/post hook chain of `op`
pub async fn run_hooked<A, F, Fut>(
    agent: &A,
    op: Operation,
    call: CallArgs,
    body: F,
) -> AgentResult<Option<Message>>
where
    A: Agent + ?Sized,
    F: FnOnce(HookArgs) -> Fut + Send,
    Fut: Future<Output = AgentResult<Option<Message>>> + Send,
{
    let base = agent.base();
    let type_name = agent.type_name();
    let ctx = base.hook_context(type_name);
    let args = op.bind(call)?;

    let (pre, post) = {
        let hooks = base.hooks.read();
        (
            hook_chain(&hooks, type_name, op.pre_hook()),
            hook_chain(&hooks, type_name, op.post_hook()),
        )
    };

    let args = run_pre_hooks(pre, &ctx, args).await?;
    let output = body(args.clone()).await?;
    Ok(run_post_hooks(post, &ctx, &args, output).await?)
}

/// Hook-wrapped operations available on every agent
#[async_trait]
pub trait AgentExt: Agent {
    /// Produce a reply without cancellation or broadcast
    async fn reply(&self, msg: Option<Message>) -> AgentResult<Message> {
        self.reply_structured(msg, None).await
    }

    /// Reply, asking for structured output matching a JSON schema
    async fn reply_structured(
        &self,
        msg: Option<Message>,
        structured_model: Option<Value>,
    ) -> AgentResult<Message> {
        let call = CallArgs::new()
            .arg(serde_json::to_value(&msg)?)
            .kwarg("structured_model", structured_model.unwrap_or(Value::Null));

        let output = run_hooked(self, Operation::Reply, call, |args| async move {
            let msg: Option<Message> = hook_arg(&args, "msg")?;
            let structured_model: Option<Value> = hook_arg(&args, "structured_model")?;
            self.reply_impl(msg, structured_model).await.map(Some)
        })
        .await?;

        output.ok_or_else(|| AgentError::Internal("reply hooks produced no message".to_string()))
    }

    /// Take messages into memory without replying
    async fn observe(&self, msgs: Vec<Message>) -> AgentResult<()> {
        let call = CallArgs::new().arg(serde_json::to_value(&msgs)?);
        run_hooked(self, Operation::Observe, call, |args| async move {
            let msgs: Vec<Message> = hook_arg(&args, "msg")?;
            self.observe_impl(msgs).await.map(|_| None)
        })
        .await?;
        Ok(())
    }

    /// Render a message; `last = false` marks a streaming chunk
    async fn print(&self, msg: &Message, last: bool) -> AgentResult<()> {
        let call = CallArgs::new()
            .arg(serde_json::to_value(msg)?)
            .kwarg("last", Value::Bool(last));
        run_hooked(self, Operation::Print, call, |args| async move {
            let msg: Message = hook_arg(&args, "msg")?;
            let last: bool = hook_arg(&args, "last")?;
            self.base().printer.print(&msg, last);
            Ok(None)
        })
        .await?;
        Ok(())
    }

    async fn speak(&self, msg: &Message) -> AgentResult<()> {
        self.print(msg, true).await
    }

    /// The entry point external callers use to get a reply
    async fn call(&self, msg: Option<Message>) -> AgentResult<Message> {
        self.call_structured(msg, None).await
    }

    async fn call_structured(
        &self,
        msg: Option<Message>,
        structured_model: Option<Value>,
    ) -> AgentResult<Message> {
        let base = self.base();
        let (seq, token) = base.begin_reply();

        let outcome = REPLY_TOKEN
            .scope(token, self.reply_structured(msg.clone(), structured_model))
            .await;

        let result = match outcome {
            Err(AgentError::Cancelled) => {
                info!(agent_id = %base.id(), agent = %base.name(), "Reply interrupted");
                self.handle_interrupt(msg).await
            }
            other => other,
        };
        base.finish_reply(seq);

        if let Ok(reply) = &result {
            self.broadcast(reply).await;
        }
        result
    }

    /// Cancel the in-flight reply; a no-op when idle
    fn interrupt(&self) -> bool {
        self.base().interrupt()
    }

    /// Deliver a message to every subscriber, in order
    ///
    /// A failing subscriber does not stop delivery to the rest; failures are
    /// logged and returned as (subscriber id, error) pairs.
    async fn broadcast(&self, msg: &Message) -> Vec<(String, AgentError)> {
        let mut failures = Vec::new();
        for subscriber in self.base().subscribers() {
            let subscriber_id = subscriber.base().id().to_string();
            debug!(from = %self.base().id(), to = %subscriber_id, "Broadcasting reply");
            if let Err(e) = subscriber.observe(vec![msg.clone()]).await {
                warn!(
                    from = %self.base().id(),
                    to = %subscriber_id,
                    error = %e,
                    "Subscriber failed to observe broadcast"
                );
                failures.push((subscriber_id, e));
            }
        }
        failures
    }

    fn register_instance_hook(
        &self,
        hook_type: HookType,
        name: &str,
        hook: Hook,
    ) -> Result<(), HookError> {
        check_instance_hook(self.supported_hook_types(), hook_type, self.type_name())?;
        self.base().hooks.write().register(hook_type, name, hook)
    }

    fn remove_instance_hook(&self, hook_type: HookType, name: &str) -> Result<(), HookError> {
        check_instance_hook(self.supported_hook_types(), hook_type, self.type_name())?;
        self.base().hooks.write().remove(hook_type, name)
    }

    fn clear_instance_hooks(&self, hook_type: Option<HookType>) {
        self.base().hooks.write().clear(hook_type);
    }

    fn info(&self) -> AgentInfo {
        AgentInfo {
            id: self.base().id().to_string(),
            name: self.base().name().to_string(),
            type_name: self.type_name().to_string(),
        }
    }
}

impl<T: Agent + ?Sized> AgentExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::hooks::AgentClass;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Replies with the text it received, optionally after a delay
    struct Parrot {
        base: AgentBase,
        delay: Option<Duration>,
        type_name: &'static str,
    }

    impl Parrot {
        fn new(name: &str) -> Self {
            let base = AgentBase::new(name);
            base.disable_console_output();
            Self {
                base,
                delay: None,
                type_name: "CoreTestParrot",
            }
        }
    }

    /// Class-hook key private to the hook ordering test
    struct HookedParrot;

    impl AgentClass for HookedParrot {
        const TYPE_NAME: &'static str = "CoreTestHookedParrot";
        const SUPPORTED_HOOK_TYPES: &'static [HookType] = BASE_HOOK_TYPES;
    }

    #[async_trait]
    impl Agent for Parrot {
        fn base(&self) -> &AgentBase {
            &self.base
        }

        fn type_name(&self) -> &'static str {
            self.type_name
        }

        async fn reply_impl(&self, msg: Option<Message>, _: Option<Value>) -> AgentResult<Message> {
            if let Some(delay) = self.delay {
                self.base.cancellable(async {
                    tokio::time::sleep(delay).await;
                    Ok(())
                })
                .await?;
            }
            let text = msg.and_then(|m| m.get_text_content()).unwrap_or_default();
            Ok(Message::assistant(self.base.name(), text))
        }
    }

    /// Counts observe calls and can be told to fail
    struct Listener {
        base: AgentBase,
        seen: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Agent for Listener {
        fn base(&self) -> &AgentBase {
            &self.base
        }

        fn type_name(&self) -> &'static str {
            "CoreTestListener"
        }

        async fn reply_impl(&self, _: Option<Message>, _: Option<Value>) -> AgentResult<Message> {
            Ok(Message::assistant(self.base.name(), ""))
        }

        async fn observe_impl(&self, _msgs: Vec<Message>) -> AgentResult<()> {
            self.seen.lock().push(self.base.name().to_string());
            if self.fail {
                return Err(AgentError::Execution("listener broke".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_instance_hooks_run_before_class_hooks() {
        let parrot = Parrot {
            type_name: HookedParrot::TYPE_NAME,
            ..Parrot::new("polly")
        };
        parrot
            .register_instance_hook(
                HookType::PreReply,
                "instance",
                Hook::pre(|_, mut args| {
                    args.insert("msg".into(), serde_json::to_value(Message::user("A"))?);
                    Ok(Some(args))
                }),
            )
            .unwrap();
        HookedParrot::register_class_hook(
            HookType::PreReply,
            "class",
            Hook::pre(|_, mut args| {
                let msg: Message = serde_json::from_value(args["msg"].clone())?;
                let text = format!("{}B", msg.get_text_content().unwrap_or_default());
                args.insert("msg".into(), serde_json::to_value(Message::user(text))?);
                Ok(Some(args))
            }),
        )
        .unwrap();

        let reply = parrot.reply(Some(Message::user("ignored"))).await.unwrap();
        HookedParrot::clear_class_hooks(None);
        assert_eq!(reply.get_text_content().as_deref(), Some("AB"));
    }

    #[tokio::test]
    async fn test_post_hook_replaces_output() {
        let parrot = Parrot::new("polly");
        parrot
            .register_instance_hook(
                HookType::PostReply,
                "shout",
                Hook::post(|ctx, _, output| {
                    let text = output.and_then(|m| m.get_text_content()).unwrap_or_default();
                    Ok(Some(Message::assistant(ctx.agent_name.clone(), text.to_uppercase())))
                }),
            )
            .unwrap();
        let reply = parrot.reply(Some(Message::user("hi"))).await.unwrap();
        assert_eq!(reply.get_text_content().as_deref(), Some("HI"));
    }

    #[tokio::test]
    async fn test_unsupported_hook_type_rejected() {
        let parrot = Parrot::new("polly");
        let err = parrot
            .register_instance_hook(HookType::PreReasoning, "x", Hook::pre(|_, _| Ok(None)))
            .unwrap_err();
        assert!(matches!(err, HookError::Unsupported { .. }));
        assert!(parrot.remove_instance_hook(HookType::PreReply, "missing").is_err());
    }

    #[tokio::test]
    async fn test_print_hooks_run_with_console_disabled() {
        let parrot = Parrot::new("polly");
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        parrot
            .register_instance_hook(
                HookType::PrePrint,
                "count",
                Hook::pre(move |_, args| {
                    assert_eq!(args["last"], json!(true));
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }),
            )
            .unwrap();
        parrot.speak(&Message::assistant("polly", "squawk")).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_order_and_no_self() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let speaker: Arc<dyn Agent> = Arc::new(Parrot::new("a"));
        let b: Arc<dyn Agent> = Arc::new(Listener {
            base: AgentBase::new("b"),
            seen: seen.clone(),
            fail: true,
        });
        let c: Arc<dyn Agent> = Arc::new(Listener {
            base: AgentBase::new("c"),
            seen: seen.clone(),
            fail: false,
        });

        speaker
            .base()
            .reset_subscribers(&[speaker.clone(), b.clone(), c.clone()]);
        assert_eq!(speaker.base().subscribers().len(), 2);

        let reply = speaker.call(Some(Message::user("hi"))).await.unwrap();
        assert_eq!(reply.get_text_content().as_deref(), Some("hi"));
        // b fails, c still hears the broadcast
        assert_eq!(*seen.lock(), vec!["b", "c"]);
        // the speaker never observes its own reply
        assert_eq!(speaker.base().memory().size().await, 0);
    }

    #[tokio::test]
    async fn test_interrupt_runs_handle_interrupt() {
        let parrot = Arc::new(Parrot {
            delay: Some(Duration::from_secs(30)),
            ..Parrot::new("polly")
        });
        let caller = parrot.clone();
        let handle = tokio::spawn(async move { caller.call(Some(Message::user("hi"))).await });

        while !parrot.base().is_replying() {
            tokio::task::yield_now().await;
        }
        assert!(parrot.interrupt());

        let reply = handle.await.unwrap().unwrap();
        assert_eq!(reply.get_text_content().as_deref(), Some(INTERRUPT_REPLY));
        assert!(!parrot.base().is_replying());
    }

    #[tokio::test]
    async fn test_interrupt_when_idle_is_noop() {
        let parrot = Parrot::new("polly");
        assert!(!parrot.interrupt());
        let reply = parrot.call(Some(Message::user("still fine"))).await.unwrap();
        assert_eq!(reply.get_text_content().as_deref(), Some("still fine"));
    }

    #[tokio::test]
    async fn test_hub_groups() {
        let speaker = Parrot::new("a");
        let b: Arc<dyn Agent> = Arc::new(Parrot::new("b"));
        let c: Arc<dyn Agent> = Arc::new(Parrot::new("c"));
        speaker.base().reset_hub_subscribers("hub1", &[b.clone()]);
        speaker.base().reset_hub_subscribers("hub2", &[c.clone()]);
        assert_eq!(speaker.base().subscribers().len(), 2);
        speaker.base().remove_hub_subscribers("hub1");
        let names: Vec<String> = speaker
            .base()
            .subscribers()
            .iter()
            .map(|s| s.base().name().to_string())
            .collect();
        assert_eq!(names, vec!["c"]);
        speaker.base().clear_subscribers();
        assert!(speaker.base().subscribers().is_empty());
    }
}
