use std::fmt;

use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::debug;

use crate::Result;

const CAPACITY: usize = 20;

/// Transient notices for the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Error(String),
    Warning(String),
    Info(String),
}

impl Notification {
    pub fn message(&self) -> &str {
        match self {
            Notification::Error(message)
            | Notification::Warning(message)
            | Notification::Info(message) => message,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Error(message) => write!(f, "error: {message}"),
            Notification::Warning(message) => write!(f, "warning: {message}"),
            Notification::Info(message) => f.write_str(message),
        }
    }
}

/// Fans notices out to every host that subscribed. A notice sent while
/// nobody listens is dropped.
#[derive(Debug)]
pub struct NotificationBroadcast {
    tx: Sender<Notification>,
}

impl NotificationBroadcast {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Fails when there are no subscribers.
    pub fn send(&self, notification: Notification) -> Result<()> {
        self.tx.send(notification)?;
        Ok(())
    }

    pub fn send_error(&self, message: impl Into<String>) {
        self.notify(Notification::Error(message.into()));
    }

    pub fn send_warning(&self, message: impl Into<String>) {
        self.notify(Notification::Warning(message.into()));
    }

    pub fn send_info(&self, message: impl Into<String>) {
        self.notify(Notification::Info(message.into()));
    }

    fn notify(&self, notification: Notification) {
        if self.send(notification).is_err() {
            debug!("no listener for notification");
        }
    }
}

impl Default for NotificationBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_notices_in_order() {
        let broadcast = NotificationBroadcast::new();
        let mut receiver = broadcast.subscribe();

        broadcast.send_error("Unable to play 1:1");
        broadcast.send_info(String::from("Finished playing juz:30"));

        assert_eq!(
            receiver.recv().await.unwrap(),
            Notification::Error("Unable to play 1:1".to_string())
        );
        assert_eq!(
            receiver.recv().await.unwrap().message(),
            "Finished playing juz:30"
        );
    }

    #[test]
    fn notices_without_listeners_are_dropped() {
        let broadcast = NotificationBroadcast::new();

        assert!(broadcast.send(Notification::Info("ignored".into())).is_err());
        broadcast.send_warning("also ignored");
    }

    #[test]
    fn display_prefixes_severity() {
        assert_eq!(
            Notification::Warning("cache is read only".into()).to_string(),
            "warning: cache is read only"
        );
        assert_eq!(Notification::Info("done".into()).to_string(), "done");
    }
}
