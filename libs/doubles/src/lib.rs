//! Actor-Based Test Doubles
//!
//! Create substitute objects ("doubles"), program them to respond to specific
//! calls with specific results, and record every invocation for later
//! assertions. Each double is backed by one long-lived actor that owns its
//! stub table, so concurrent `allow` calls and concurrent invocations of the
//! doubled entity are serialized without shared mutable state.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   register    ┌───────────────────┐
//! │   facade    │──────────────▶│  DoubleRegistry   │
//! │ double()    │               │  id -> {actor,    │
//! │ allow()     │   lookup      │   test, source,   │
//! │ spy() ...   │◀──────────────│   config}         │
//! └──────┬──────┘               └───────────────────┘
//!        │ commands (mpsc + oneshot reply)
//!        ▼
//! ┌─────────────┐  resolve/allow/clear   ┌───────────┐
//! │ DoubleActor │───────────────────────▶│ StubStore │
//! └──────┬──────┘                        └───────────┘
//!        │ RecordedCall (fire-and-forget)
//!        ▼
//! ┌─────────────┐
//! │  TestInbox  │  next_call(timeout) assertions
//! └─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use testing_doubles::{allow, double};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> testing_doubles::Result<()> {
//! let dbl = double().await?;
//! let dbl = allow(&dbl, "fetch")
//!     .with_args(vec![json!("key")])
//!     .returns(json!("value"))
//!     .install()
//!     .await?;
//!
//! assert_eq!(dbl.call("fetch", vec![json!("key")]).await?, json!("value"));
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod error;
pub mod facade;
pub mod messages;
pub mod recorder;
pub mod registry;
pub mod source;
pub mod store;

pub use actor::{DoubleCommand, DoubleHandle};
pub use error::{DoubleError, Result};
pub use facade::{
    allow, clear, double, double_of, lookup, reinstall, spy, stub, AllowBuilder, Double, Shape,
    SpyTarget, StubFn,
};
pub use messages::{CallArgs, ClearTarget, RecordedCall, Value};
pub use recorder::{CallRecorder, TestAddress, TestInbox};
pub use registry::{global as registry, DoubleConfig, DoubleId, DoubleRegistry, RegistryEntry};
pub use source::{
    InstalledStub, Installer, SourceDescriptor, SourceKind, StaticSymbolTable, Symbol, SymbolKind,
    SymbolTable,
};
pub use store::{Matcher, Responder, StubRegistration, StubStore};
