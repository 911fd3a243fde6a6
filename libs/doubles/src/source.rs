//! Source descriptors and collaborator contracts
//!
//! The core never reflects over live modules and never generates code. Both
//! capabilities arrive as injected collaborators: a [`SymbolTable`] answers
//! "which `(name, arity)` pairs does the source expose" for verification, and
//! an [`Installer`] makes stub callables reachable on a live target when a
//! module-shaped double changes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DoubleError, Result};
use crate::facade::StubFn;

/// One exposed symbol of a doubled source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub arity: usize,
    pub kind: SymbolKind,
}

/// What kind of callable a source exposes under a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    /// Ordinary function
    Function,
    /// Macro-like symbol that is callable in source text
    Macro,
    /// Interface/behaviour callback the source is expected to implement
    Callback,
}

impl Symbol {
    pub fn function(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            kind: SymbolKind::Function,
        }
    }

    pub fn macro_like(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            kind: SymbolKind::Macro,
        }
    }

    pub fn callback(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            kind: SymbolKind::Callback,
        }
    }
}

/// Exposed-symbol lookup for a doubled source.
///
/// Verification treats every symbol kind alike: a stub is acceptable when any
/// exposed symbol matches its `(name, arity)`.
pub trait SymbolTable: Send + Sync {
    fn symbols(&self) -> Vec<Symbol>;

    fn exposes(&self, name: &str, arity: usize) -> bool {
        self.symbols()
            .iter()
            .any(|s| s.name == name && s.arity == arity)
    }
}

/// Fixed symbol table, the common in-process implementation
#[derive(Debug, Clone, Default)]
pub struct StaticSymbolTable {
    symbols: Vec<Symbol>,
}

impl StaticSymbolTable {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self { symbols }
    }
}

impl SymbolTable for StaticSymbolTable {
    fn symbols(&self) -> Vec<Symbol> {
        self.symbols.clone()
    }
}

/// A stub callable handed to the installer for one exposed name
#[derive(Debug, Clone)]
pub struct InstalledStub {
    pub name: String,
    pub arity: usize,
    pub callable: StubFn,
}

/// Dynamic-installation collaborator: make the given stubs callable on the
/// target, replacing any previous installation atomically with respect to
/// external observers.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, target: &str, stubs: Vec<InstalledStub>) -> Result<()>;
}

/// Reference to the real entity being doubled, used only for verification
/// and for naming. Never invoked by the core.
#[derive(Clone)]
pub struct SourceDescriptor {
    name: Option<String>,
    kind: SourceKind,
}

/// Shape the source imposes on its double
#[derive(Clone)]
pub enum SourceKind {
    /// Namespace with a verifiable exposed-symbol table
    Module { symbols: Arc<dyn SymbolTable> },
    /// Closed record with a fixed field set
    Record { fields: Vec<String> },
}

impl SourceDescriptor {
    pub fn module(name: impl Into<String>, symbols: Arc<dyn SymbolTable>) -> Self {
        Self {
            name: Some(name.into()),
            kind: SourceKind::Module { symbols },
        }
    }

    pub fn record(name: Option<String>, fields: Vec<String>) -> Self {
        Self {
            name,
            kind: SourceKind::Record { fields },
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> &SourceKind {
        &self.kind
    }

    /// Check a stub signature against the exposed symbol table. Only
    /// module-shaped sources verify; record sources are checked for field
    /// closure by the facade instead.
    pub fn verify_stub(&self, name: &str, arity: usize) -> Result<()> {
        if let SourceKind::Module { symbols } = &self.kind {
            if !symbols.exposes(name, arity) {
                return Err(DoubleError::VerificationFailure {
                    source: self.name.clone().unwrap_or_else(|| "<anonymous>".to_string()),
                    name: name.to_string(),
                    arity,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            SourceKind::Module { .. } => "Module",
            SourceKind::Record { fields } => return f
                .debug_struct("SourceDescriptor")
                .field("name", &self.name)
                .field("kind", &"Record")
                .field("fields", fields)
                .finish(),
        };
        f.debug_struct("SourceDescriptor")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}
