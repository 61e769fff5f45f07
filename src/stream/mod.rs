//! Chat completion stream parsing and reassembly
//!
//! - [`reader`]: SSE framing, JSON decoding and the cancellation check
//! - [`event`]: wire payload and the tagged [`StreamEvent`]
//! - [`classifier`]: out-of-order mode tracking
//! - [`reassembly`]: sequence-ordered fragment buffer
//! - [`function_call`]: tool-call delta accumulation
//! - [`assembly`]: per-stream state combining all of the above

pub mod assembly;
pub mod classifier;
pub mod event;
pub mod function_call;
pub mod reader;
pub mod reassembly;

pub use assembly::{Effect, ResponseAssembly};
pub use event::{MetaEvent, StreamEvent, StreamMode, ToolCallDelta, WirePayload};
pub use function_call::{FunctionCall, FunctionCallBuffer};
pub use reader::{EventReader, ReadItem};
pub use reassembly::{OrderedFragment, ReassemblyBuffer};
