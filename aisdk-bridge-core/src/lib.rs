//! # aisdk-bridge-core
//!
//! Core types for the aisdk-bridge workspace.
//!
//! - **Events**: [`UiEvent`], the normalized stream event every other
//!   component produces or consumes
//! - **Messages**: [`Message`] and its ordered [`MessagePart`]s
//! - **Accumulation**: [`MessageAccumulator`], which replays an event
//!   history into a message
//! - **Usage**: token accounting shared by steps and streams
//! - **Identifiers**: prefixed unique ids for runs, calls and messages
//!
//! ## Example
//!
//! ```rust
//! use aisdk_bridge_core::{FinishReason, MessageAccumulator, UiEvent, Usage};
//!
//! let mut acc = MessageAccumulator::new("msg_1");
//! acc.extend([
//!     UiEvent::StepStart,
//!     UiEvent::text_start("t1"),
//!     UiEvent::text_delta("t1", "Hi"),
//!     UiEvent::text_end("t1"),
//!     UiEvent::step_finish(FinishReason::Stop, Usage::new(4, 1)),
//! ]);
//!
//! let message = acc.build();
//! assert_eq!(message.content, "Hi");
//! assert_eq!(message.step_count(), 1);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod accumulator;
pub mod errors;
pub mod events;
pub mod identifier;
pub mod message;
pub mod usage;

pub use accumulator::{MessageAccumulator, StepSummary};
pub use errors::{CoreError, Result};
pub use events::{FinishReason, UiEvent};
pub use identifier::now_utc;
pub use message::{
    Message, MessagePart, Role, Source, SourceType, ToolInvocation, ToolInvocationState,
};
pub use usage::Usage;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        FinishReason, Message, MessageAccumulator, MessagePart, StepSummary, ToolInvocation,
        ToolInvocationState, UiEvent, Usage,
    };
}
