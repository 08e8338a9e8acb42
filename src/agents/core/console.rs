//! Message rendering for humans
//!
//! Streaming prints arrive as repeated `print(msg, false)` calls for the same
//! message id, each carrying the full content so far. Only the suffix that
//! was not yet emitted is written; the final `print(msg, true)` flushes
//! structured blocks and forgets the message.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::agents::domain::{ContentBlock, Message};

/// Output sink for rendered messages
pub trait Console: Send + Sync {
    fn write(&self, text: &str);
}

/// Writes to the process stdout
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn write(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

/// Buffers everything written, for inspection
#[derive(Default)]
pub struct CaptureConsole {
    buffer: Mutex<String>,
}

impl CaptureConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().clone()
    }
}

impl Console for CaptureConsole {
    fn write(&self, text: &str) {
        self.buffer.lock().push_str(text);
    }
}

/// A print event: the message and whether it was the last chunk
pub type PrintEvent = (Message, bool);

pub(crate) struct MessagePrinter {
    console: RwLock<Arc<dyn Console>>,
    prefixes: Mutex<HashMap<String, String>>,
    enabled: AtomicBool,
    queue: Mutex<Option<mpsc::UnboundedSender<PrintEvent>>>,
}

impl MessagePrinter {
    pub(crate) fn new() -> Self {
        Self {
            console: RwLock::new(Arc::new(StdoutConsole)),
            prefixes: Mutex::new(HashMap::new()),
            enabled: AtomicBool::new(true),
            queue: Mutex::new(None),
        }
    }

    pub(crate) fn set_console(&self, console: Arc<dyn Console>) {
        *self.console.write() = console;
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn enable_queue(&self) -> mpsc::UnboundedReceiver<PrintEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.queue.lock() = Some(tx);
        rx
    }

    pub(crate) fn disable_queue(&self) {
        *self.queue.lock() = None;
    }

    /// Drop the streaming state of a message that will never get its last print
    pub(crate) fn forget(&self, msg_id: &str) {
        self.prefixes.lock().remove(msg_id);
    }

    #[cfg(test)]
    pub(crate) fn open_streams(&self) -> usize {
        self.prefixes.lock().len()
    }

    pub(crate) fn print(&self, msg: &Message, last: bool) {
        {
            let mut queue = self.queue.lock();
            if let Some(tx) = queue.as_ref() {
                if tx.send((msg.clone(), last)).is_err() {
                    *queue = None;
                }
            }
        }

        if !self.enabled.load(Ordering::SeqCst) {
            if last {
                self.prefixes.lock().remove(msg.id());
            }
            return;
        }

        let mut lines = Vec::new();
        let mut structured = Vec::new();
        for block in &msg.content {
            match block {
                ContentBlock::Text { text } => lines.push(format!("{}: {}", msg.name, text)),
                ContentBlock::Thinking { thinking } => {
                    lines.push(format!("{}(thinking): {}", msg.name, thinking))
                }
                other => structured.push(other),
            }
        }
        let rendered = lines.join("\n");

        let console = self.console.read().clone();
        let mut prefixes = self.prefixes.lock();
        let previous = prefixes.entry(msg.id().to_string()).or_default();

        match rendered.strip_prefix(previous.as_str()) {
            Some(suffix) => {
                if !suffix.is_empty() {
                    console.write(suffix);
                }
            }
            None => {
                // Content was rewritten rather than appended
                console.write("\n");
                console.write(&rendered);
            }
        }
        *previous = rendered;

        if last {
            let printed = prefixes.remove(msg.id()).unwrap_or_default();
            if !printed.is_empty() && !printed.ends_with('\n') {
                console.write("\n");
            }
            if !structured.is_empty() {
                let dump = serde_json::to_string_pretty(&structured)
                    .unwrap_or_else(|e| format!("<unprintable content: {}>", e));
                console.write(&format!("{}: {}\n", msg.name, dump));
            }
        }
    }
}
