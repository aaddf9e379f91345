//! Tools: schema-validated callables bound to the reasoning node.
//!
//! - `schema`: argument schemas, validation, JSON Schema translation
//! - `descriptor`: the descriptor type, handler seam and per-turn tool set
//! - `registry`: static fallback tools and the handoff tool
//! - `remote`: provider tools wrapped as local descriptors
//! - `aggregator`: static + discovered tools, queried per turn

pub mod aggregator;
pub mod descriptor;
pub mod errors;
pub mod handoff;
pub mod registry;
pub mod remote;
pub mod schema;

pub use aggregator::ToolAggregator;
pub use descriptor::{ToolDescriptor, ToolHandler, ToolSet};
pub use errors::ToolError;
pub use handoff::{HandoffDirective, HANDOFF_TOOL_NAME};
pub use registry::ToolRegistry;
pub use remote::RemoteTool;
pub use schema::{ArgSchema, FieldType};
