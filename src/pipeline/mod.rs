//! Voice turn orchestration.
//!
//! A single cooperative state machine sequences recording, transcription,
//! chat and speech. Collaborators outside the audio/network core (link state,
//! credentials, status display, activity hooks, fallback text) are consumed
//! through the traits in [`collaborators`].

pub mod collaborators;
pub mod orchestrator;
pub mod state;

pub use collaborators::{
    Activity, ActivityNotifier, CountingNotifier, CredentialStore,
    FallbackResponder, LogStatusSink, NetworkStatus, NoopNotifier, RecordingStatusSink,
    StaticCredentials, StaticNetwork, StatusSink,
};
pub use orchestrator::{
    PipelineCollaborators, PipelineResources, PipelineServices, PipelineSettings, TurnOutcome,
    VoicePipeline,
};
pub use state::{PipelineState, TurnCounter};
