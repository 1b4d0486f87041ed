//! Cascade Core
//!
//! This crate provides the incremental dataflow engine behind the Cascade
//! scene-authoring toolkit. Cameras, pane layout, shape state and GPU
//! resources are all nodes in one dependency graph, pulled once per frame or
//! per command. The engine implements:
//!
//! - Nodes with named, optionally typed input and output ports
//! - Memoized pull recomputation of only what is out of date
//! - Push invalidation that stops at the dirty frontier
//! - Sibling ports that gather an ordered list of producers
//! - Failure containment: a failing node yields failure sentinels, not errors
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: nodes, ports, edges, pull and invalidate
//! - `value`: the dynamically typed values carried by ports
//! - `config`: type and cycle policies
//! - `command`: structural edits from worker threads
//! - `registry`: injected id-to-entity lookup
//! - `logging`: subscriber setup for the `tracing` events the engine emits
//!
//! # Example
//!
//! ```rust
//! use cascade_core::error::CalcError;
//! use cascade_core::graph::{Args, Graph, Node, NodeSchema, Outputs, PortSpec};
//! use cascade_core::value::Value;
//!
//! struct Concat;
//!
//! impl Node for Concat {
//!     fn schema(&self) -> NodeSchema {
//!         NodeSchema::new("Concat")
//!             .input(PortSpec::new("a"))
//!             .input(PortSpec::new("b"))
//!             .output(PortSpec::new("out"))
//!     }
//!
//!     fn calculate(&mut self, args: &Args<'_>) -> Result<Outputs, CalcError> {
//!         Ok(Value::from(format!("{}{}", args.text(0)?, args.text(1)?)).into())
//!     }
//! }
//!
//! let mut graph = Graph::new();
//! let first = graph.add_node(Concat);
//! let second = graph.add_node(Concat);
//!
//! graph.assign(graph.input(first, "a")?, "x")?;
//! graph.assign(graph.input(first, "b")?, "y")?;
//! graph.assign(graph.input(second, "a")?, graph.output(first, "out")?)?;
//! graph.assign(graph.input(second, "b")?, "z")?;
//!
//! let out = graph.output(second, "out")?;
//! assert_eq!(graph.pull(out), Value::from("xyz"));
//! # Ok::<(), cascade_core::error::GraphError>(())
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod registry;
pub mod value;

pub use config::EngineConfig;
pub use error::{CalcError, GraphError};
pub use graph::{Graph, Node, NodeId};
pub use value::{NullValue, Value};
