//! Tagged error-output stream shared by all stages of a run.
//!
//! Like a shell, diagnostics from ALL pipeline stages stream out while the
//! pipeline is running, never merged into the primary output. Each stage
//! holds a handle tagged with its own name; the runner drains the receiver
//! to the caller's error output.
//!
//! ```text
//!   grep ──┐ tagged("grep")
//!   sort ──┼──▶ StderrStream (mpsc) ──▶ drain task ──▶ "grep: bad input\n"
//!   head ──┘ tagged("head")
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

/// One diagnostic message and the stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StderrMessage {
    /// Producing stage, if the handle was tagged.
    pub stage: Option<Arc<str>>,
    /// Message text as written.
    pub text: String,
}

impl StderrMessage {
    /// Render as `stage: text`, newline terminated.
    pub fn render(&self) -> String {
        let mut out = match &self.stage {
            Some(stage) => format!("{}: {}", stage, self.text),
            None => self.text.clone(),
        };
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

/// Cloneable handle to a run's error output.
///
/// Uses `UnboundedSender` which is `Clone + Send + Sync`, safe across
/// `tokio::spawn` boundaries without `Arc<Mutex<..>>`.
#[derive(Clone, Debug)]
pub struct StderrStream {
    sender: mpsc::UnboundedSender<StderrMessage>,
    tag: Option<Arc<str>>,
}

/// Receiving end of the stderr stream, owned by the runner.
#[derive(Debug)]
pub struct StderrReceiver {
    receiver: mpsc::UnboundedReceiver<StderrMessage>,
}

/// Create a new stderr stream pair.
pub fn stderr_stream() -> (StderrStream, StderrReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        StderrStream { sender, tag: None },
        StderrReceiver { receiver },
    )
}

impl StderrStream {
    /// A stream nobody listens to.
    pub fn discard() -> Self {
        stderr_stream().0
    }

    /// A handle on the same stream, tagged with `stage`.
    pub fn tagged(&self, stage: &str) -> Self {
        Self {
            sender: self.sender.clone(),
            tag: Some(Arc::from(stage)),
        }
    }

    /// The stage this handle is tagged with.
    pub fn stage(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Write a message to the stderr stream.
    ///
    /// Non-blocking. If the receiver has been dropped, the message is silently
    /// discarded (same as writing to a closed pipe).
    pub fn write(&self, msg: &str) {
        if !msg.is_empty() {
            let _ = self.sender.send(StderrMessage {
                stage: self.tag.clone(),
                text: msg.to_string(),
            });
        }
    }
}

impl StderrReceiver {
    /// Wait for the next message. `None` once every handle is dropped.
    pub async fn recv(&mut self) -> Option<StderrMessage> {
        self.receiver.recv().await
    }

    /// Drain all pending messages into a single rendered string.
    ///
    /// Non-blocking; returns immediately with whatever is available.
    pub fn drain(&mut self) -> String {
        let mut buf = String::new();
        while let Ok(msg) = self.receiver.try_recv() {
            buf.push_str(&msg.render());
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_messages_render_with_stage() {
        let (stream, mut rx) = stderr_stream();
        stream.tagged("grep").write("bad pattern");
        stream.write("untagged\n");
        assert_eq!(rx.drain(), "grep: bad pattern\nuntagged\n");
    }

    #[test]
    fn test_retagging_replaces_tag() {
        let (stream, _rx) = stderr_stream();
        let inner = stream.tagged("pipeline").tagged("sort");
        assert_eq!(inner.stage(), Some("sort"));
    }

    #[test]
    fn test_empty_messages_are_dropped() {
        let (stream, mut rx) = stderr_stream();
        stream.write("");
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_recv_ends_when_all_handles_drop() {
        let (stream, mut rx) = stderr_stream();
        let tagged = stream.tagged("a");
        drop(stream);
        tagged.write("last");
        drop(tagged);
        assert_eq!(rx.recv().await.map(|m| m.text), Some("last".to_string()));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_discard_does_not_panic() {
        StderrStream::discard().tagged("x").write("nobody hears this");
    }
}
