use tokio::sync::watch;

use crate::Result;

/// What the listener sees: which verse is highlighted and which transport
/// icons to show.
#[derive(Default, Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub current_item_id: Option<String>,
    pub is_playing: bool,
    pub is_sequencing: bool,
    pub repeat: bool,
    /// Runs that completed or were stopped. A replaced run does not count.
    pub runs_ended: u64,
}

impl PlaybackState {
    pub fn is_idle(&self) -> bool {
        self.current_item_id.is_none() && !self.is_playing
    }
}

#[derive(Debug)]
pub struct ReadOnly<T>(watch::Receiver<T>);

impl<T> Clone for ReadOnly<T> {
    fn clone(&self) -> Self {
        ReadOnly(self.0.clone())
    }
}

impl<T: Clone> ReadOnly<T> {
    pub fn read(&self) -> T {
        T::clone(&self.0.borrow())
    }

    /// Wait for the next published value.
    pub async fn changed(&mut self) -> Result<T> {
        self.0.changed().await?;
        Ok(T::clone(&self.0.borrow_and_update()))
    }

    pub async fn wait_for(&mut self, predicate: impl FnMut(&T) -> bool) -> Result<T> {
        let value = self.0.wait_for(predicate).await?;
        Ok(T::clone(&value))
    }
}

impl<T> From<watch::Receiver<T>> for ReadOnly<T> {
    fn from(receiver: watch::Receiver<T>) -> Self {
        ReadOnly(receiver)
    }
}
