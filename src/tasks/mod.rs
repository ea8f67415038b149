//! Background tasks

mod probe;

pub use probe::PeerProbeTask;
