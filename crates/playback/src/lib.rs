//! playback: paced, cancellable execution of chat-embedded device commands
//!
//! A [`Session`] watches the current chat message, scans it for commands,
//! queues the new ones and executes them in text order at a simulated
//! reading pace. Long-running commands run as a single cancellable effect
//! owned by the [`Executor`].

mod animator;
mod config;
mod effect;
mod error;
mod executor;
mod metrics;
mod presentation;
mod scheduler;
mod session;
mod source;
mod stroke_machine;

pub use animator::ProgressAnimator;
pub use config::{load_config_file, HighlightColors, PlaybackConfig};
pub use effect::EffectSlot;
pub use error::{PlaybackError, Result};
pub use executor::Executor;
pub use metrics::PlaybackMetrics;
pub use presentation::{
    DisplayValue, Highlight, PresentationSink, ProgressFrame, RecordingSink, StatusEvent,
    TracingSink,
};
pub use scheduler::pacing_wait;
pub use session::Session;
pub use source::{MessageId, MessageSnapshot, MessageSource, SharedMessage};
pub use stroke_machine::{Cursor, Stroke, StrokeMachine, StrokeState};
