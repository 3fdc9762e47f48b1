use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Sending half of a mailbox. Cheap to clone; posting never blocks.
#[derive(Debug)]
pub struct MailboxSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for MailboxSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

/// Receiving half of a mailbox.
#[derive(Debug)]
pub struct MailboxReceiver<T> {
    rx: mpsc::Receiver<T>,
}

/// Create a bounded FIFO mailbox.
pub fn channel<T>(capacity: usize) -> (MailboxSender<T>, MailboxReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MailboxSender { tx }, MailboxReceiver { rx })
}

impl<T> MailboxSender<T> {
    /// Enqueue without waiting. Returns false when the mailbox is full or the
    /// receiver is gone; the message is dropped in that case.
    pub fn post(&self, msg: T) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("mailbox full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> MailboxReceiver<T> {
    /// Take everything currently queued, oldest first. Never waits.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Wait for the next message; `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}
