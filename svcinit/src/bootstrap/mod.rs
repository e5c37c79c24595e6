//! Initialize-once orchestration of the managed service.

mod api;
mod sequencer;
mod state;
mod types;

pub use api::ServiceApi;
pub use sequencer::BootstrapSequencer;
pub use state::{BootstrapPhase, BootstrapState, Failure, PhaseChange};
pub use types::{
    AdminCheck, BootstrapPath, BootstrapReport, EndpointCreationType, EndpointSummary,
    ProvisionOutcome, ResourceSpec, SessionToken,
};
