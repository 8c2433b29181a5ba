use thiserror::Error;

use crate::arena::NodeId;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Stale node handle: {0:?}")]
    StaleNode(NodeId),

    #[error("No node for path: {0}")]
    NodeNotFound(String),

    #[error("Path already present: {0}")]
    DuplicatePath(String),

    #[error("Watch target missing: {0}")]
    WatchTarget(String),

    #[error("Watcher error: {0}")]
    Watch(String),

    #[error("UI marshaller disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, TreeError>;

impl From<notify::Error> for TreeError {
    fn from(error: notify::Error) -> Self {
        match error.kind {
            notify::ErrorKind::PathNotFound => TreeError::WatchTarget(
                error
                    .paths
                    .first()
                    .map(|path| path.display().to_string())
                    .unwrap_or_default(),
            ),
            notify::ErrorKind::Io(io) => TreeError::Io(io),
            _ => TreeError::Watch(error.to_string()),
        }
    }
}
