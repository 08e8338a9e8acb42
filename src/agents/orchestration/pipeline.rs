//! Pipelines over agent calls

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::debug;

use crate::agents::core::{Agent, AgentExt};
use crate::agents::domain::Message;
use crate::agents::error::AgentResult;

/// Call agents in order, feeding each reply to the next agent
///
/// With no agents the input is returned unchanged.
pub async fn sequential_pipeline(
    agents: &[Arc<dyn Agent>],
    msg: Option<Message>,
) -> AgentResult<Option<Message>> {
    let mut current = msg;
    for agent in agents {
        debug!(agent = %agent.base().name(), "Sequential pipeline step");
        current = Some(agent.call(current).await?);
    }
    Ok(current)
}

/// Give the same input to every agent and collect the replies in agent order
pub async fn fanout_pipeline(
    agents: &[Arc<dyn Agent>],
    msg: Option<Message>,
    concurrent: bool,
) -> AgentResult<Vec<Message>> {
    if concurrent {
        return try_join_all(agents.iter().map(|agent| agent.call(msg.clone()))).await;
    }

    let mut replies = Vec::with_capacity(agents.len());
    for agent in agents {
        replies.push(agent.call(msg.clone()).await?);
    }
    Ok(replies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::core::EchoAgent;

    fn echo(name: &str) -> Arc<dyn Agent> {
        let agent = EchoAgent::new(name);
        agent.base().disable_console_output();
        Arc::new(agent)
    }

    #[tokio::test]
    async fn test_sequential_chains_replies() {
        let agents = vec![echo("a"), echo("b")];
        let reply = sequential_pipeline(&agents, Some(Message::user("hi")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.get_text_content().as_deref(), Some("echo: echo: hi"));
        assert_eq!(reply.name, "b");
    }

    #[tokio::test]
    async fn test_sequential_without_agents_returns_input() {
        let reply = sequential_pipeline(&[], Some(Message::user("hi"))).await.unwrap();
        assert_eq!(reply.unwrap().get_text_content().as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_fanout_keeps_agent_order() {
        let agents = vec![echo("a"), echo("b"), echo("c")];
        for concurrent in [true, false] {
            let replies = fanout_pipeline(&agents, Some(Message::user("x")), concurrent)
                .await
                .unwrap();
            let names: Vec<&str> = replies.iter().map(|m| m.name.as_str()).collect();
            assert_eq!(names, vec!["a", "b", "c"]);
            assert!(replies
                .iter()
                .all(|m| m.get_text_content().as_deref() == Some("echo: x")));
        }
    }
}
