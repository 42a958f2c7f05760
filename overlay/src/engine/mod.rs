pub mod ann;
pub mod broadcast;
pub mod merkle;
pub mod network;
pub mod placement;
pub mod recovery;
pub mod routing;
