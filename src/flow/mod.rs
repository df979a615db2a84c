//! Flow execution engine: node model, run state, handlers and the interpreter.

pub mod condition;
pub mod context;
pub mod events;
pub mod filter;
pub mod handlers;
pub mod interpreter;
pub mod lifecycle;
pub mod schema;

pub use context::RunContext;
pub use events::{EventBus, PickerState, RunEvent, RunStatus};
pub use interpreter::{Interpreter, MAX_CONDITION_ITERATIONS};
pub use lifecycle::{Lifecycle, PickerLease, RecordingLease, RunTicket};
pub use schema::{FlowNode, FlowTree, NodeKind, SelectorType};
