//! Memory management strategies for prompt formatting

use crate::agents::config::MemoryStrategy;
use crate::agents::domain::{Message, Role};

/// Apply a memory strategy to a list of messages
pub fn apply_strategy(messages: &[Message], strategy: &MemoryStrategy) -> Vec<Message> {
    match strategy {
        MemoryStrategy::Full => messages.to_vec(),
        MemoryStrategy::SlidingWindow { size } => apply_sliding_window(messages, *size),
        MemoryStrategy::FirstLast { first, last } => apply_first_last(messages, *first, *last),
    }
}

/// Keep only the last N messages (plus a leading system message if present)
fn apply_sliding_window(messages: &[Message], window_size: usize) -> Vec<Message> {
    let Some(first) = messages.first() else {
        return Vec::new();
    };

    let mut result = Vec::new();

    let start_idx = if first.role == Role::System {
        result.push(first.clone());
        1
    } else {
        0
    };

    let remaining = &messages[start_idx..];
    let take_from = remaining.len().saturating_sub(window_size);
    result.extend(remaining[take_from..].iter().cloned());

    result
}

/// Keep first N messages and last M messages
fn apply_first_last(messages: &[Message], first_count: usize, last_count: usize) -> Vec<Message> {
    if messages.len() <= first_count + last_count {
        return messages.to_vec();
    }

    let mut result: Vec<Message> = messages[..first_count].to_vec();
    let last_start = messages.len().saturating_sub(last_count);
    result.extend(messages[last_start..].iter().cloned());
    result
}
