//! Double actor: one long-lived worker per double
//!
//! Each actor owns exactly one [`StubStore`] and serializes every read and
//! write through its mailbox, so concurrent `allow` calls and concurrent
//! invocations of the doubled entity are totally ordered by arrival. Store
//! failures are forwarded through the reply channel, never swallowed.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{DoubleError, Result};
use crate::messages::{CallArgs, ClearTarget, Value};
use crate::registry::DoubleId;
use crate::store::{Matcher, Responder, StubStore};

/// Mailbox depth per double. Callers block on send once full, which keeps
/// a runaway producer from growing memory without bound.
const MAILBOX_CAPACITY: usize = 100;

/// Commands a double actor processes, in arrival order
#[derive(Debug)]
pub enum DoubleCommand {
    /// Install a stub registration ahead of all existing ones
    Allow {
        name: String,
        matcher: Matcher,
        responder: Responder,
        reply: oneshot::Sender<()>,
    },
    /// Remove registrations; replies with how many were dropped
    Clear {
        target: ClearTarget,
        reply: oneshot::Sender<usize>,
    },
    /// Resolve an invocation against the store
    Resolve {
        name: String,
        args: CallArgs,
        reply: oneshot::Sender<Result<Value>>,
    },
    /// Distinct `(name, arity)` pairs currently registered
    Surface {
        reply: oneshot::Sender<Vec<(String, usize)>>,
    },
}

/// Cloneable address of a running double actor
#[derive(Debug, Clone)]
pub struct DoubleHandle {
    id: DoubleId,
    tx: mpsc::Sender<DoubleCommand>,
}

/// Spawn the worker task for one double and return its address
pub fn spawn(id: DoubleId) -> DoubleHandle {
    let (tx, mut rx) = mpsc::channel(MAILBOX_CAPACITY);
    let actor_id = id.clone();

    tokio::spawn(async move {
        let mut store = StubStore::new();
        debug!(double = %actor_id, "double actor started");

        while let Some(command) = rx.recv().await {
            match command {
                DoubleCommand::Allow {
                    name,
                    matcher,
                    responder,
                    reply,
                } => {
                    store.push(name, matcher, responder);
                    let _ = reply.send(());
                }
                DoubleCommand::Clear { target, reply } => {
                    let removed = store.clear(&target);
                    debug!(double = %actor_id, removed, "cleared stub registrations");
                    let _ = reply.send(removed);
                }
                DoubleCommand::Resolve { name, args, reply } => {
                    let _ = reply.send(store.resolve(&name, &args));
                }
                DoubleCommand::Surface { reply } => {
                    let _ = reply.send(store.surface());
                }
            }
        }

        debug!(double = %actor_id, "double actor stopped");
    });

    DoubleHandle { id, tx }
}

impl DoubleHandle {
    pub fn id(&self) -> &DoubleId {
        &self.id
    }

    fn gone(&self, reason: &str) -> DoubleError {
        DoubleError::Unreachable {
            id: self.id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Install a stub; blocks until the actor has applied the mutation
    pub async fn allow(&self, name: impl Into<String>, matcher: Matcher, responder: Responder) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DoubleCommand::Allow {
                name: name.into(),
                matcher,
                responder,
                reply,
            })
            .await
            .map_err(|_| self.gone("command channel closed"))?;
        rx.await.map_err(|_| self.gone("actor dropped the reply"))
    }

    /// Remove registrations; returns how many were dropped
    pub async fn clear(&self, target: ClearTarget) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DoubleCommand::Clear { target, reply })
            .await
            .map_err(|_| self.gone("command channel closed"))?;
        rx.await.map_err(|_| self.gone("actor dropped the reply"))
    }

    /// Resolve an invocation to a responder result
    pub async fn resolve(&self, name: impl Into<String>, args: CallArgs) -> Result<Value> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DoubleCommand::Resolve {
                name: name.into(),
                args,
                reply,
            })
            .await
            .map_err(|_| self.gone("command channel closed"))?;
        rx.await.map_err(|_| self.gone("actor dropped the reply"))?
    }

    /// Registered `(name, arity)` surface, newest-first
    pub async fn surface(&self) -> Result<Vec<(String, usize)>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DoubleCommand::Surface { reply })
            .await
            .map_err(|_| self.gone("command channel closed"))?;
        rx.await.map_err(|_| self.gone("actor dropped the reply"))
    }
}
