use crate::transport::TransportError;
use thiserror::Error;
use toroid_types::errors::TypeError;
use toroid_types::node::NodeId;
use toroid_types::tag::ParityTag;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("Overlay requires at least one node")]
    EmptyNetwork,
    #[error("Node {0} does not exist")]
    InvalidNode(NodeId),
    #[error("Vector of dimension [{got}] supplied, overlay dimension is [{expected}]")]
    DimensionMismatch { got: usize, expected: usize },
    #[error("No surviving copies of parity tag '{0}'")]
    Unrecoverable(ParityTag),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Journal io failure: {0}")]
    Journal(#[from] std::io::Error),
    #[error(transparent)]
    InvalidType(#[from] TypeError),
}

impl OverlayError {
    /// Usage-class errors map to exit code 1 on the command surface,
    /// everything else to 2.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            OverlayError::EmptyNetwork
                | OverlayError::InvalidNode(_)
                | OverlayError::DimensionMismatch { .. }
                | OverlayError::InvalidType(_)
        )
    }
}
