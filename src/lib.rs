//! # sceneio
//!
//! Scene-description interchange layer: a typed scene-graph object model
//! with time-sampled reads and writes over an externally-owned Scene
//! Storage Engine.
//!
//! The engine owns file parsing, on-disk layout, and composition; this
//! crate owns the object model above it: a prim hierarchy with typed
//! schema views (transforms, cameras, meshes, point clouds), generic
//! typed attributes, variant sets, instancing, and a per-context cache
//! of decoded samples. A JSON-backed reference engine ships in
//! [`engine::json`].
//!
//! ## Modules
//!
//! - [`util`] - Error type, math types, bounding boxes
//! - [`value`] - Typed value model (`AttributeType`, `Value`)
//! - [`engine`] - Storage engine boundary and the JSON reference engine
//! - [`cache`] - Decoded-sample cache with optional double buffering
//! - [`graph`] - Schema graph (prim hierarchy, instancing, variants)
//! - [`schema`] - Typed schema views (Xform, Camera, Mesh, Points)
//! - [`attribute`] - Generic typed attributes
//! - [`config`] - Import/export configuration
//! - [`context`] - One bound document plus graph and cache
//! - [`runtime`] - Process-wide configuration and engine ownership
//!
//! ## Example
//!
//! ```ignore
//! use sceneio::prelude::*;
//!
//! let mut ctx = Context::new();
//! ctx.open(Path::new("scene.json"))?;
//! let root = ctx.root().unwrap();
//!
//! for &child in ctx.children(root) {
//!     println!("{}", ctx.path(child));
//! }
//! ```

pub mod attribute;
pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod graph;
pub mod runtime;
pub mod schema;
pub mod util;
pub mod value;

// Re-export commonly used types
pub use attribute::{Attribute, AttributeSummary};
pub use config::{ExportConfig, ImportConfig, InterpolationType, NormalCalculationType};
pub use context::{Context, ContextState};
pub use runtime::{DebugLevel, Runtime, RuntimeConfig};
pub use util::{Aabb, Error, Result, Time, DEFAULT_TIME};
pub use value::{AttributeType, Value};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::attribute::{Attribute, AttributeSummary};
    pub use crate::config::{ExportConfig, ImportConfig, InterpolationType, NormalCalculationType};
    pub use crate::context::{Context, ContextState};
    pub use crate::engine::{Document, JsonEngine, StorageEngine};
    pub use crate::graph::{AttrId, SchemaId};
    pub use crate::runtime::{DebugLevel, Runtime, RuntimeConfig};
    pub use crate::schema::*;
    pub use crate::util::{Aabb, Error, Result, Time, DEFAULT_TIME};
    pub use crate::value::{AttributeType, Value};
}
