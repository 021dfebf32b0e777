use std::fmt;

use tokio::sync::mpsc;

use crate::operation::OperationResult;

/// Identity of a listener. Registering twice under the same id delivers once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(String);

impl ListenerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListenerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ListenerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Sending half of a result subscription.
#[derive(Debug, Clone)]
pub struct Listener {
    id: ListenerId,
    sender: mpsc::UnboundedSender<OperationResult>,
}

impl Listener {
    pub fn new(id: impl Into<ListenerId>, sender: mpsc::UnboundedSender<OperationResult>) -> Self {
        Self { id: id.into(), sender }
    }

    pub fn id(&self) -> &ListenerId {
        &self.id
    }

    pub(crate) fn into_parts(self) -> (ListenerId, mpsc::UnboundedSender<OperationResult>) {
        (self.id, self.sender)
    }
}

/// Create a listener and the receiver its results arrive on.
pub fn listener(
    id: impl Into<ListenerId>,
) -> (Listener, mpsc::UnboundedReceiver<OperationResult>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Listener::new(id, tx), rx)
}
