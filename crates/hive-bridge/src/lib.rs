//! Hive bridge
//!
//! Exposes the managed runtime to a native host through opaque 64-bit IDs,
//! GC handle addresses and caller-owned buffers. Lookups walk the
//! context → assembly → type → member chain; every failing operation logs
//! one line and returns an error the FFI layer turns into a zero or null
//! sentinel.
//!
//! ```no_run
//! use hive_bridge::{Bridge, BridgeOptions};
//! use std::path::Path;
//!
//! let mut bridge = Bridge::new(BridgeOptions::default());
//! let ctx = bridge.create_assembly_context("scripts", true);
//! let asm = bridge.load_assembly_from_path(ctx, Path::new("scripts.toml"))?;
//! for cls in bridge.types_of_assembly(ctx, asm)? {
//!     println!("{}", bridge.class_full_name(ctx, asm, cls)?);
//! }
//! bridge.unload_context(ctx)?;
//! # Ok::<(), hive_bridge::BridgeError>(())
//! ```

pub mod bridge;
pub mod bulk;
mod catalog;
pub mod config;
pub mod context;
pub mod delegate;
pub mod error;
pub mod ids;
mod invoke;
pub mod logger;
mod marshal;
pub mod memory;
pub mod shared;
mod table;

pub use bridge::Bridge;
pub use bulk::ArrayInfo;
pub use config::{BridgeOptions, ConfigError};
pub use context::{ContextState, UnloadState, UnloadTracker};
pub use delegate::{DelegateInvokeFn, DelegateThunk};
pub use error::{BridgeError, BridgeResult, ErrorCategory};
pub use ids::{AssemblyId, ClassId, ContextId, FieldId, HandleAllocator, MethodId, RawId, INVALID_ID};
pub use logger::{BoundarySink, LogCallback, LogSeverity};
pub use memory::UnmanagedMemory;
pub use shared::SharedBridge;

pub use hive_runtime;
