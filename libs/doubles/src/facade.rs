//! Public operations: create doubles, program stubs, spy, clear
//!
//! The facade orchestrates the registry, the per-double actor, verification,
//! and call recording. Creating a double registers it globally and spawns its
//! actor; `allow` resolves the double, checks shape and signature before any
//! mutation, then sends the registration to the owning actor.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::actor::{self, DoubleHandle};
use crate::error::{DoubleError, Result};
use crate::messages::{CallArgs, ClearTarget, Value};
use crate::recorder::{CallRecorder, TestInbox};
use crate::registry::{self, DoubleConfig, DoubleId, RegistryEntry};
use crate::source::{InstalledStub, SourceDescriptor, SourceKind};
use crate::store::{Matcher, Responder};

/// Shape of a double, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// Open mapping; keys appear as stubs are installed
    Bare,
    /// Closed record; only the listed fields may be stubbed
    Record { fields: Vec<String> },
    /// Module/namespace; the whole surface is installed on a live target
    Module,
}

/// A logical test substitute, addressable by its opaque identifier
#[derive(Debug, Clone)]
pub struct Double {
    id: DoubleId,
    shape: Shape,
    source: Option<SourceDescriptor>,
    config: DoubleConfig,
    handle: DoubleHandle,
    recorder: CallRecorder,
    inbox: Option<TestInbox>,
    /// Installed callables bound onto this copy of the double
    bindings: HashMap<String, StubFn>,
}

impl Double {
    pub fn id(&self) -> &DoubleId {
        &self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Installed callable bound under `name` on this copy, if any
    pub fn get(&self, name: &str) -> Option<&StubFn> {
        self.bindings.get(name)
    }

    /// Recorded-call inbox. Absent on doubles rebuilt via [`lookup`]; the
    /// receiver stays with the copy handed out at creation.
    pub fn inbox(&self) -> Option<&TestInbox> {
        self.inbox.as_ref()
    }

    /// Build a callable for `name` without binding it
    pub fn stub_fn(&self, name: &str) -> StubFn {
        StubFn {
            name: name.to_string(),
            handle: self.handle.clone(),
            recorder: self.recorder.clone(),
        }
    }

    /// Invoke an operation on the double: resolve, record, return
    pub async fn call(&self, name: &str, args: CallArgs) -> Result<Value> {
        self.stub_fn(name).call(args).await
    }
}

/// An installed callable: resolves through the owning actor and notifies the
/// test of every invocation, successful or not, before returning its result.
#[derive(Debug, Clone)]
pub struct StubFn {
    name: String,
    handle: DoubleHandle,
    recorder: CallRecorder,
}

impl StubFn {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, args: CallArgs) -> Result<Value> {
        let result = self.handle.resolve(self.name.clone(), args.clone()).await;
        self.recorder.record(&self.name, args);
        result
    }
}

/// Create a bare double: an open mapping with no source
pub async fn double() -> Result<Double> {
    create(None, DoubleConfig::default()).await
}

/// Create a double shaped by a source descriptor
pub async fn double_of(source: SourceDescriptor, config: DoubleConfig) -> Result<Double> {
    create(Some(source), config).await
}

async fn create(source: Option<SourceDescriptor>, config: DoubleConfig) -> Result<Double> {
    let id = match (&config.name, source.as_ref().and_then(|s| s.name())) {
        (Some(name), _) => DoubleId::from_name(name),
        (None, Some(source_name)) => DoubleId::derived_from_source(source_name),
        (None, None) => DoubleId::anonymous(),
    };

    let shape = match source.as_ref().map(|s| s.kind()) {
        None => Shape::Bare,
        Some(SourceKind::Record { fields }) => Shape::Record {
            fields: fields.clone(),
        },
        Some(SourceKind::Module { .. }) => Shape::Module,
    };

    let handle = actor::spawn(id.clone());
    let (address, inbox) = TestInbox::channel();

    let source_tag = if config.send_source_in_messages {
        source.as_ref().and_then(|s| s.name()).map(String::from)
    } else {
        None
    };
    let recorder = CallRecorder::new(address.clone(), source_tag);

    registry::global()
        .register(
            id.clone(),
            RegistryEntry {
                actor: handle.clone(),
                test: address,
                source: source.clone(),
                config: config.clone(),
            },
        )
        .await?;

    info!(double = %id, shape = ?shape, "created double");
    Ok(Double {
        id,
        shape,
        source,
        config,
        handle,
        recorder,
        inbox: Some(inbox),
        bindings: HashMap::new(),
    })
}

/// Rebuild a `Double` from the global registry by opaque identifier.
/// Fatal when absent: the caller expected the double to exist.
pub async fn lookup(id: &DoubleId) -> Result<Double> {
    let entry = registry::global()
        .entry_for(id)
        .await
        .ok_or_else(|| DoubleError::RegistryMiss { id: id.to_string() })?;

    let shape = match entry.source.as_ref().map(|s| s.kind()) {
        None => Shape::Bare,
        Some(SourceKind::Record { fields }) => Shape::Record {
            fields: fields.clone(),
        },
        Some(SourceKind::Module { .. }) => Shape::Module,
    };
    let source_tag = if entry.config.send_source_in_messages {
        entry.source.as_ref().and_then(|s| s.name()).map(String::from)
    } else {
        None
    };

    Ok(Double {
        id: id.clone(),
        shape,
        recorder: CallRecorder::new(entry.test.clone(), source_tag),
        source: entry.source,
        config: entry.config,
        handle: entry.actor,
        inbox: None,
        bindings: HashMap::new(),
    })
}

/// Program a stub onto a double. Finish with [`AllowBuilder::install`].
pub fn allow<'a>(dbl: &'a Double, name: &str) -> AllowBuilder<'a> {
    AllowBuilder {
        double: dbl,
        name: name.to_string(),
        matcher: None,
        returns: Vec::new(),
        raises: None,
        forward: None,
    }
}

/// Builder for one `allow` call; collects matcher and responder, then checks
/// shape and signature before mutating the store.
pub struct AllowBuilder<'a> {
    double: &'a Double,
    name: String,
    matcher: Option<Matcher>,
    returns: Vec<Value>,
    raises: Option<String>,
    forward: Option<Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>>,
}

impl<'a> AllowBuilder<'a> {
    /// Match exactly these argument values, element-wise
    pub fn with_args(mut self, args: CallArgs) -> Self {
        self.matcher = Some(Matcher::Exact(args));
        self
    }

    /// Match any call of the given arity
    pub fn with_any(mut self, arity: usize) -> Self {
        self.matcher = Some(Matcher::Any(arity));
        self
    }

    /// Add a return value. Repeating builds a sequence: values are consumed
    /// in order across calls, and the last one repeats forever.
    pub fn returns(mut self, value: Value) -> Self {
        self.returns.push(value);
        self
    }

    /// Raise the designated failure instead of returning
    pub fn raises(mut self, message: impl Into<String>) -> Self {
        self.raises = Some(message.into());
        self
    }

    /// Delegate the response to a closure
    pub fn returning<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.forward = Some(Arc::new(f));
        self
    }

    /// Validate and install the registration. Returns an updated copy of the
    /// double with the callable bound; module-shaped doubles are returned
    /// unchanged after their surface is re-installed.
    pub async fn install(self) -> Result<Double> {
        let matcher = self.matcher.unwrap_or_else(|| Matcher::Exact(Vec::new()));

        // Shape and signature checks happen before any mutation, so a
        // rejected allow leaves the store exactly as it was.
        match &self.double.shape {
            Shape::Record { fields } => {
                if !fields.contains(&self.name) {
                    return Err(DoubleError::UnknownKey {
                        key: self.name.clone(),
                    });
                }
            }
            Shape::Module => {
                if self.double.config.verify {
                    if let Some(source) = &self.double.source {
                        source.verify_stub(&self.name, matcher.arity())?;
                    }
                }
            }
            Shape::Bare => {}
        }

        let responder = if let Some(f) = self.forward {
            Responder::Forward(f)
        } else if let Some(message) = self.raises {
            Responder::Raise(message)
        } else {
            Responder::from_returns(self.returns)
        };

        debug!(double = %self.double.id, stub = %self.name, arity = matcher.arity(), "installing stub");
        self.double
            .handle
            .allow(self.name.clone(), matcher, responder)
            .await?;

        match &self.double.shape {
            Shape::Module => {
                install_surface(self.double).await?;
                Ok(self.double.clone())
            }
            _ => {
                let mut updated = self.double.clone();
                let callable = updated.stub_fn(&self.name);
                updated.bindings.insert(self.name, callable);
                Ok(updated)
            }
        }
    }
}

/// Remove registrations from a double's store
pub async fn clear(dbl: &Double, target: ClearTarget) -> Result<usize> {
    dbl.handle.clear(target).await
}

/// Low-level install: bypasses shape closure and verification on an
/// already-registered double.
pub async fn stub(dbl: &Double, name: &str, matcher: Matcher, responder: Responder) -> Result<Double> {
    dbl.handle.allow(name.to_string(), matcher, responder).await?;
    let mut updated = dbl.clone();
    let callable = updated.stub_fn(name);
    updated.bindings.insert(name.to_string(), callable);
    Ok(updated)
}

/// Re-push a module double's whole registered surface through its installer
pub async fn reinstall(dbl: &Double) -> Result<()> {
    install_surface(dbl).await
}

async fn install_surface(dbl: &Double) -> Result<()> {
    let Some(installer) = &dbl.config.installer else {
        return Ok(());
    };
    let surface = dbl.handle.surface().await?;
    let stubs: Vec<InstalledStub> = surface
        .into_iter()
        .map(|(name, arity)| InstalledStub {
            callable: dbl.stub_fn(&name),
            name,
            arity,
        })
        .collect();

    let target = dbl
        .source
        .as_ref()
        .and_then(|s| s.name())
        .unwrap_or_else(|| dbl.id.as_str())
        .to_string();
    debug!(double = %dbl.id, target = %target, stubs = stubs.len(), "installing module surface");
    installer.install(&target, stubs).await
}

/// Real collaborator a spy forwards to
pub trait SpyTarget: Send + Sync {
    /// Name used for identifier derivation and source tagging
    fn name(&self) -> &str;
    /// Discoverable operations as `(name, arity)` pairs
    fn operations(&self) -> Vec<(String, usize)>;
    /// Invoke the real operation
    fn invoke(&self, name: &str, args: &[Value]) -> Result<Value>;
}

/// Derive a double whose every discoverable operation forwards to the real
/// target, selectively overridable by later `allow` calls.
pub async fn spy(target: Arc<dyn SpyTarget>) -> Result<Double> {
    let operations = target.operations();
    let fields: Vec<String> = operations.iter().map(|(n, _)| n.clone()).collect();
    let source = SourceDescriptor::record(Some(target.name().to_string()), fields);

    let mut dbl = double_of(source, DoubleConfig::default()).await?;
    for (op, arity) in operations {
        let real = Arc::clone(&target);
        let op_name = op.clone();
        dbl.handle
            .allow(
                op.clone(),
                Matcher::Any(arity),
                Responder::Forward(Arc::new(move |args: &[Value]| real.invoke(&op_name, args))),
            )
            .await?;
        let callable = dbl.stub_fn(&op);
        dbl.bindings.insert(op, callable);
    }

    info!(double = %dbl.id, "created spy");
    Ok(dbl)
}
