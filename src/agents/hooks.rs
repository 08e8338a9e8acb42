//! Hook registry and hook-chain execution
//!
//! Every hookable agent operation (`reply`, `observe`, `print`, and for ReAct
//! agents `reasoning` / `acting`) runs through the same chain:
//!
//! 1. call arguments are bound against the operation's parameter descriptor,
//!    producing one canonical keyword map with defaults filled in;
//! 2. pre hooks run, instance scope first, then class scope; each receives a
//!    copy of the current map and may return a replacement;
//! 3. the operation runs with the final map;
//! 4. post hooks run in the same scope order and may replace the output.
//!
//! Class-scope hooks are shared by every instance of one agent type and live
//! in a process-wide table keyed by the type name. Instance-scope hooks live
//! in the agent's own [`HookRegistry`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agents::domain::Message;
use crate::agents::error::HookError;

/// Canonical keyword arguments seen by hooks
pub type HookArgs = Map<String, Value>;

/// The fixed set of interception points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookType {
    PreReply,
    PostReply,
    PrePrint,
    PostPrint,
    PreObserve,
    PostObserve,
    PreReasoning,
    PostReasoning,
    PreActing,
    PostActing,
}

/// Hook types every agent supports
pub const BASE_HOOK_TYPES: &[HookType] = &[
    HookType::PreReply,
    HookType::PostReply,
    HookType::PrePrint,
    HookType::PostPrint,
    HookType::PreObserve,
    HookType::PostObserve,
];

/// Hook types supported by ReAct agents
pub const REACT_HOOK_TYPES: &[HookType] = &[
    HookType::PreReply,
    HookType::PostReply,
    HookType::PrePrint,
    HookType::PostPrint,
    HookType::PreObserve,
    HookType::PostObserve,
    HookType::PreReasoning,
    HookType::PostReasoning,
    HookType::PreActing,
    HookType::PostActing,
];

impl HookType {
    /// Whether hooks of this type run before the operation
    pub fn is_pre(&self) -> bool {
        matches!(
            self,
            HookType::PreReply
                | HookType::PrePrint
                | HookType::PreObserve
                | HookType::PreReasoning
                | HookType::PreActing
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::PreReply => "pre_reply",
            HookType::PostReply => "post_reply",
            HookType::PrePrint => "pre_print",
            HookType::PostPrint => "post_print",
            HookType::PreObserve => "pre_observe",
            HookType::PostObserve => "post_observe",
            HookType::PreReasoning => "pre_reasoning",
            HookType::PostReasoning => "post_reasoning",
            HookType::PreActing => "pre_acting",
            HookType::PostActing => "post_acting",
        }
    }

    /// Parse from the snake_case name
    pub fn parse(s: &str) -> Option<Self> {
        REACT_HOOK_TYPES.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for HookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default value of an operation parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    /// The caller must supply the argument
    Required,
    /// Defaults to null
    Null,
    /// Defaults to a boolean
    Bool(bool),
}

impl ParamDefault {
    fn value(&self) -> Option<Value> {
        match self {
            ParamDefault::Required => None,
            ParamDefault::Null => Some(Value::Null),
            ParamDefault::Bool(b) => Some(Value::Bool(*b)),
        }
    }
}

/// One entry of an operation's parameter descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Param {
    pub name: &'static str,
    pub default: ParamDefault,
}

const fn param(name: &'static str, default: ParamDefault) -> Param {
    Param { name, default }
}

const REPLY_PARAMS: &[Param] = &[
    param("msg", ParamDefault::Null),
    param("structured_model", ParamDefault::Null),
];
const OBSERVE_PARAMS: &[Param] = &[param("msg", ParamDefault::Required)];
const PRINT_PARAMS: &[Param] = &[
    param("msg", ParamDefault::Required),
    param("last", ParamDefault::Bool(true)),
];
const REASONING_PARAMS: &[Param] = &[param("tool_choice", ParamDefault::Null)];
const ACTING_PARAMS: &[Param] = &[param("tool_call", ParamDefault::Required)];

/// A hookable agent operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Reply,
    Observe,
    Print,
    Reasoning,
    Acting,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Reply => "reply",
            Operation::Observe => "observe",
            Operation::Print => "print",
            Operation::Reasoning => "reasoning",
            Operation::Acting => "acting",
        }
    }

    pub fn pre_hook(&self) -> HookType {
        match self {
            Operation::Reply => HookType::PreReply,
            Operation::Observe => HookType::PreObserve,
            Operation::Print => HookType::PrePrint,
            Operation::Reasoning => HookType::PreReasoning,
            Operation::Acting => HookType::PreActing,
        }
    }

    pub fn post_hook(&self) -> HookType {
        match self {
            Operation::Reply => HookType::PostReply,
            Operation::Observe => HookType::PostObserve,
            Operation::Print => HookType::PostPrint,
            Operation::Reasoning => HookType::PostReasoning,
            Operation::Acting => HookType::PostActing,
        }
    }

    /// Ordered parameter descriptor
    pub fn params(&self) -> &'static [Param] {
        match self {
            Operation::Reply => REPLY_PARAMS,
            Operation::Observe => OBSERVE_PARAMS,
            Operation::Print => PRINT_PARAMS,
            Operation::Reasoning => REASONING_PARAMS,
            Operation::Acting => ACTING_PARAMS,
        }
    }

    /// Bind positional and named call arguments into one keyword map
    pub fn bind(&self, call: CallArgs) -> Result<HookArgs, HookError> {
        let params = self.params();
        let binding_error = |reason: String| HookError::Binding {
            operation: self.name().to_string(),
            reason,
        };

        if call.positional.len() > params.len() {
            return Err(binding_error(format!(
                "takes {} positional arguments but {} were given",
                params.len(),
                call.positional.len()
            )));
        }

        let mut bound = HookArgs::new();
        for (param, value) in params.iter().zip(call.positional) {
            bound.insert(param.name.to_string(), value);
        }

        for (key, value) in call.named {
            if !params.iter().any(|p| p.name == key) {
                return Err(binding_error(format!("unexpected keyword argument '{}'", key)));
            }
            if bound.contains_key(&key) {
                return Err(binding_error(format!("multiple values for argument '{}'", key)));
            }
            bound.insert(key, value);
        }

        for param in params {
            if bound.contains_key(param.name) {
                continue;
            }
            match param.default.value() {
                Some(default) => {
                    bound.insert(param.name.to_string(), default);
                }
                None => {
                    return Err(binding_error(format!(
                        "missing required argument '{}'",
                        param.name
                    )))
                }
            }
        }

        Ok(bound)
    }
}

/// Raw call arguments before binding
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg(mut self, value: Value) -> Self {
        self.positional.push(value);
        self
    }

    /// Add a named argument
    pub fn kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.named.push((name.into(), value));
        self
    }
}

/// Identity of the agent a hook is running for
#[derive(Debug, Clone, PartialEq)]
pub struct HookContext {
    pub agent_id: String,
    pub agent_name: String,
    pub type_name: String,
    /// Correlation id of the reply currently being served, if any
    pub reply_id: Option<String>,
}

pub type PreHookFn = Arc<
    dyn Fn(HookContext, HookArgs) -> BoxFuture<'static, anyhow::Result<Option<HookArgs>>>
        + Send
        + Sync,
>;

pub type PostHookFn = Arc<
    dyn Fn(HookContext, HookArgs, Option<Message>) -> BoxFuture<'static, anyhow::Result<Option<Message>>>
        + Send
        + Sync,
>;

/// A registered interceptor
#[derive(Clone)]
pub enum Hook {
    /// Runs before the operation; may replace the arguments
    Pre(PreHookFn),
    /// Runs after the operation; may replace the output
    Post(PostHookFn),
}

impl Hook {
    /// Synchronous pre hook
    pub fn pre<F>(f: F) -> Self
    where
        F: Fn(&HookContext, HookArgs) -> anyhow::Result<Option<HookArgs>> + Send + Sync + 'static,
    {
        Hook::Pre(Arc::new(move |ctx, args| futures::future::ready(f(&ctx, args)).boxed()))
    }

    /// Asynchronous pre hook
    pub fn pre_async<F, Fut>(f: F) -> Self
    where
        F: Fn(HookContext, HookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<HookArgs>>> + Send + 'static,
    {
        Hook::Pre(Arc::new(move |ctx, args| f(ctx, args).boxed()))
    }

    /// Synchronous post hook
    pub fn post<F>(f: F) -> Self
    where
        F: Fn(&HookContext, &HookArgs, Option<Message>) -> anyhow::Result<Option<Message>>
            + Send
            + Sync
            + 'static,
    {
        Hook::Post(Arc::new(move |ctx, args, output| {
            futures::future::ready(f(&ctx, &args, output)).boxed()
        }))
    }

    /// Asynchronous post hook
    pub fn post_async<F, Fut>(f: F) -> Self
    where
        F: Fn(HookContext, HookArgs, Option<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Message>>> + Send + 'static,
    {
        Hook::Post(Arc::new(move |ctx, args, output| f(ctx, args, output).boxed()))
    }

    pub fn is_pre(&self) -> bool {
        matches!(self, Hook::Pre(_))
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hook::Pre(_) => f.write_str("Hook::Pre(..)"),
            Hook::Post(_) => f.write_str("Hook::Post(..)"),
        }
    }
}

/// Named hooks per hook type, in registration order
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    buckets: HashMap<HookType, Vec<(String, Hook)>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook; an existing hook with the same name is replaced in place
    pub fn register(
        &mut self,
        hook_type: HookType,
        name: impl Into<String>,
        hook: Hook,
    ) -> Result<(), HookError> {
        let name = name.into();
        if hook.is_pre() != hook_type.is_pre() {
            return Err(HookError::KindMismatch { hook_type, name });
        }

        let bucket = self.buckets.entry(hook_type).or_default();
        match bucket.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = hook,
            None => bucket.push((name, hook)),
        }
        Ok(())
    }

    /// Remove a hook by name
    pub fn remove(&mut self, hook_type: HookType, name: &str) -> Result<(), HookError> {
        let bucket = self.buckets.entry(hook_type).or_default();
        match bucket.iter().position(|(existing, _)| existing == name) {
            Some(idx) => {
                bucket.remove(idx);
                Ok(())
            }
            None => Err(HookError::NotFound {
                hook_type,
                name: name.to_string(),
            }),
        }
    }

    /// Clear one hook type, or everything when `None`
    pub fn clear(&mut self, hook_type: Option<HookType>) {
        match hook_type {
            Some(t) => {
                self.buckets.remove(&t);
            }
            None => self.buckets.clear(),
        }
    }

    /// Snapshot of the hooks registered for a type
    pub fn hooks(&self, hook_type: HookType) -> Vec<(String, Hook)> {
        self.buckets.get(&hook_type).cloned().unwrap_or_default()
    }

    /// Registered hook names for a type
    pub fn names(&self, hook_type: HookType) -> Vec<String> {
        self.buckets
            .get(&hook_type)
            .map(|bucket| bucket.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default()
    }
}

static CLASS_HOOKS: LazyLock<RwLock<HashMap<&'static str, HookRegistry>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn check_supported(
    supported: &[HookType],
    hook_type: HookType,
    type_name: &str,
) -> Result<(), HookError> {
    if supported.contains(&hook_type) {
        Ok(())
    } else {
        Err(HookError::Unsupported {
            hook_type,
            type_name: type_name.to_string(),
        })
    }
}

/// Static description of an agent type, and its class-scope hooks
pub trait AgentClass {
    /// Key of the class-scope registry
    const TYPE_NAME: &'static str;
    /// Hook types instances of this type accept
    const SUPPORTED_HOOK_TYPES: &'static [HookType];

    /// Register a hook shared by every instance of this type
    fn register_class_hook(
        hook_type: HookType,
        name: impl Into<String>,
        hook: Hook,
    ) -> Result<(), HookError> {
        check_supported(Self::SUPPORTED_HOOK_TYPES, hook_type, Self::TYPE_NAME)?;
        CLASS_HOOKS
            .write()
            .entry(Self::TYPE_NAME)
            .or_default()
            .register(hook_type, name, hook)
    }

    /// Remove a class-scope hook
    fn remove_class_hook(hook_type: HookType, name: &str) -> Result<(), HookError> {
        check_supported(Self::SUPPORTED_HOOK_TYPES, hook_type, Self::TYPE_NAME)?;
        CLASS_HOOKS
            .write()
            .entry(Self::TYPE_NAME)
            .or_default()
            .remove(hook_type, name)
    }

    /// Clear class-scope hooks of one type, or all of them
    fn clear_class_hooks(hook_type: Option<HookType>) {
        if let Some(registry) = CLASS_HOOKS.write().get_mut(Self::TYPE_NAME) {
            registry.clear(hook_type);
        }
    }
}

/// Validate an instance-scope registration against the supported set
pub(crate) fn check_instance_hook(
    supported: &[HookType],
    hook_type: HookType,
    type_name: &str,
) -> Result<(), HookError> {
    check_supported(supported, hook_type, type_name)
}

/// Instance hooks followed by class hooks for one hook type
pub(crate) fn hook_chain(
    instance: &HookRegistry,
    type_name: &str,
    hook_type: HookType,
) -> Vec<(String, Hook)> {
    let mut chain = instance.hooks(hook_type);
    if let Some(class) = CLASS_HOOKS.read().get(type_name) {
        chain.extend(class.hooks(hook_type));
    }
    chain
}

/// Run a pre-hook chain, threading the argument map through it
pub(crate) async fn run_pre_hooks(
    chain: Vec<(String, Hook)>,
    ctx: &HookContext,
    mut args: HookArgs,
) -> Result<HookArgs, HookError> {
    for (name, hook) in chain {
        let Hook::Pre(f) = hook else { continue };
        match f(ctx.clone(), args.clone()).await {
            Ok(Some(replacement)) => args = replacement,
            Ok(None) => {}
            Err(source) => return Err(HookError::Failed { name, source }),
        }
    }
    Ok(args)
}

/// Run a post-hook chain, threading the output through it
pub(crate) async fn run_post_hooks(
    chain: Vec<(String, Hook)>,
    ctx: &HookContext,
    args: &HookArgs,
    mut output: Option<Message>,
) -> Result<Option<Message>, HookError> {
    for (name, hook) in chain {
        let Hook::Post(f) = hook else { continue };
        match f(ctx.clone(), args.clone(), output.clone()).await {
            Ok(Some(replacement)) => output = Some(replacement),
            Ok(None) => {}
            Err(source) => return Err(HookError::Failed { name, source }),
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bind_fills_defaults() {
        let args = Operation::Print
            .bind(CallArgs::new().arg(json!({"x": 1})))
            .unwrap();
        assert_eq!(args["msg"], json!({"x": 1}));
        assert_eq!(args["last"], json!(true));
    }

    #[test]
    fn test_bind_mixes_positional_and_named() {
        let args = Operation::Reply
            .bind(CallArgs::new().arg(json!("m")).kwarg("structured_model", json!({"type": "object"})))
            .unwrap();
        assert_eq!(args["msg"], json!("m"));
        assert_eq!(args["structured_model"]["type"], "object");

        let args = Operation::Reply.bind(CallArgs::new()).unwrap();
        assert_eq!(args["msg"], Value::Null);
    }

    #[test]
    fn test_bind_rejects_bad_calls() {
        assert!(Operation::Observe.bind(CallArgs::new()).is_err());
        assert!(Operation::Observe
            .bind(CallArgs::new().arg(json!(1)).arg(json!(2)))
            .is_err());
        assert!(Operation::Print
            .bind(CallArgs::new().arg(json!(1)).kwarg("msg", json!(2)))
            .is_err());
        assert!(Operation::Print
            .bind(CallArgs::new().arg(json!(1)).kwarg("colour", json!("red")))
            .is_err());
    }

    #[test]
    fn test_duplicate_name_overwrites_in_place() {
        let mut registry = HookRegistry::new();
        registry
            .register(HookType::PreReply, "a", Hook::pre(|_, _| Ok(None)))
            .unwrap();
        registry
            .register(HookType::PreReply, "b", Hook::pre(|_, _| Ok(None)))
            .unwrap();
        registry
            .register(HookType::PreReply, "a", Hook::pre(|_, _| Ok(None)))
            .unwrap();
        assert_eq!(registry.names(HookType::PreReply), vec!["a", "b"]);
    }

    #[test]
    fn test_remove_missing_fails() {
        let mut registry = HookRegistry::new();
        let err = registry.remove(HookType::PostReply, "ghost").unwrap_err();
        assert!(matches!(err, HookError::NotFound { .. }));
    }

    #[test]
    fn test_kind_must_match_type() {
        let mut registry = HookRegistry::new();
        let err = registry
            .register(HookType::PostReply, "a", Hook::pre(|_, _| Ok(None)))
            .unwrap_err();
        assert!(matches!(err, HookError::KindMismatch { .. }));
    }

    #[test]
    fn test_clear() {
        let mut registry = HookRegistry::new();
        registry
            .register(HookType::PreReply, "a", Hook::pre(|_, _| Ok(None)))
            .unwrap();
        registry
            .register(HookType::PrePrint, "b", Hook::pre(|_, _| Ok(None)))
            .unwrap();
        registry.clear(Some(HookType::PreReply));
        assert!(registry.names(HookType::PreReply).is_empty());
        assert_eq!(registry.names(HookType::PrePrint), vec!["b"]);
        registry.clear(None);
        assert!(registry.names(HookType::PrePrint).is_empty());
    }

    #[test]
    fn test_hook_type_parse_round_trip() {
        for t in REACT_HOOK_TYPES {
            assert_eq!(HookType::parse(t.as_str()), Some(*t));
        }
        assert!(HookType::parse("pre_sleep").is_none());
    }

    #[tokio::test]
    async fn test_pre_chain_threads_arguments() {
        let mut registry = HookRegistry::new();
        registry
            .register(
                HookType::PreReply,
                "append_a",
                Hook::pre(|_, mut args| {
                    let s = args["msg"].as_str().unwrap_or_default().to_string();
                    args.insert("msg".into(), json!(format!("{}a", s)));
                    Ok(Some(args))
                }),
            )
            .unwrap();
        registry
            .register(HookType::PreReply, "noop", Hook::pre(|_, _| Ok(None)))
            .unwrap();
        registry
            .register(
                HookType::PreReply,
                "append_b",
                Hook::pre_async(|_, mut args| async move {
                    let s = args["msg"].as_str().unwrap_or_default().to_string();
                    args.insert("msg".into(), json!(format!("{}b", s)));
                    Ok(Some(args))
                }),
            )
            .unwrap();

        let ctx = HookContext {
            agent_id: "id".into(),
            agent_name: "name".into(),
            type_name: "HookChainTest".into(),
            reply_id: None,
        };
        let args = Operation::Reply
            .bind(CallArgs::new().arg(json!("")))
            .unwrap();
        let chain = hook_chain(&registry, "HookChainTest", HookType::PreReply);
        let out = run_pre_hooks(chain, &ctx, args).await.unwrap();
        assert_eq!(out["msg"], json!("ab"));
    }

    #[tokio::test]
    async fn test_failing_hook_propagates() {
        let mut registry = HookRegistry::new();
        registry
            .register(
                HookType::PostReply,
                "explode",
                Hook::post(|_, _, _| Err(anyhow::anyhow!("boom"))),
            )
            .unwrap();
        let ctx = HookContext {
            agent_id: "id".into(),
            agent_name: "name".into(),
            type_name: "HookFailTest".into(),
            reply_id: None,
        };
        let chain = hook_chain(&registry, "HookFailTest", HookType::PostReply);
        let err = run_post_hooks(chain, &ctx, &HookArgs::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Failed { ref name, .. } if name == "explode"));
    }
}
