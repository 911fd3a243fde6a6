//! Stub store: ordered registrations and call resolution for one double
//!
//! Registrations live in a single queue ordered newest-first across *all*
//! operation names, not per name. Spy-wrapped doubles depend on this: a later
//! `allow` must shadow an earlier pass-through responder regardless of which
//! name either was registered under.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{DoubleError, Result};
use crate::messages::{CallArgs, ClearTarget, Value};

/// Predicate over call arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Element-wise equality against an exact ordered argument list
    Exact(CallArgs),
    /// Accept any arguments of the declared arity
    Any(usize),
}

impl Matcher {
    /// Number of arguments this matcher is declared for
    pub fn arity(&self) -> usize {
        match self {
            Matcher::Exact(args) => args.len(),
            Matcher::Any(arity) => *arity,
        }
    }

    /// Whether the actual call arguments satisfy this matcher
    pub fn accepts(&self, args: &[Value]) -> bool {
        match self {
            Matcher::Exact(expected) => expected.as_slice() == args,
            Matcher::Any(arity) => args.len() == *arity,
        }
    }
}

/// Produces a result (or designated failure) for a matched call
#[derive(Clone)]
pub enum Responder {
    /// Fixed value, returned on every call
    Value(Value),
    /// Bounded value queue; advances per call, last value repeats forever.
    /// The cursor is shared across clones so the sequence has one position
    /// no matter how the registration is copied.
    Sequence {
        values: Arc<Vec<Value>>,
        cursor: Arc<Mutex<usize>>,
    },
    /// Raise the designated failure instead of returning
    Raise(String),
    /// Delegate to a closure (spy pass-through, custom responders)
    Forward(Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>),
}

impl Responder {
    /// Build a responder from the `returns:` values of one `allow` call.
    ///
    /// Zero values means the absence-of-value response; one value is a plain
    /// fixed responder; several become a stateful sequence.
    pub fn from_returns(mut values: Vec<Value>) -> Self {
        match values.len() {
            0 => Responder::Value(Value::Null),
            1 => Responder::Value(values.remove(0)),
            _ => Responder::Sequence {
                values: Arc::new(values),
                cursor: Arc::new(Mutex::new(0)),
            },
        }
    }

    /// Execute the responder for a matched call
    pub fn respond(&self, args: &[Value]) -> Result<Value> {
        match self {
            Responder::Value(v) => Ok(v.clone()),
            Responder::Sequence { values, cursor } => {
                let mut position = cursor.lock();
                let index = (*position).min(values.len().saturating_sub(1));
                *position = position.saturating_add(1);
                Ok(values.get(index).cloned().unwrap_or(Value::Null))
            }
            Responder::Raise(message) => Err(DoubleError::Raised {
                message: message.clone(),
            }),
            Responder::Forward(f) => f(args),
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Responder::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Responder::Sequence { values, .. } => {
                f.debug_struct("Sequence").field("values", values).finish()
            }
            Responder::Raise(msg) => f.debug_tuple("Raise").field(msg).finish(),
            Responder::Forward(_) => f.write_str("Forward(..)"),
        }
    }
}

/// One programmed stub: name, matcher, responder, insertion sequence
#[derive(Debug, Clone)]
pub struct StubRegistration {
    pub name: String,
    pub matcher: Matcher,
    pub responder: Responder,
    /// Monotonic insertion counter. Diagnostic only: resolution and
    /// `surface()` order come from queue position (front = newest), so two
    /// registrations never compare by `seq` at runtime. It survives in trace
    /// output and snapshots to tell apart registrations that are otherwise
    /// identical.
    pub seq: u64,
}

/// Ordered stub registrations for exactly one double
#[derive(Debug, Default)]
pub struct StubStore {
    /// Front = newest. Resolution scans front-to-back.
    entries: VecDeque<StubRegistration>,
    next_seq: u64,
}

impl StubStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a registration ahead of all existing ones, for any name
    pub fn push(&mut self, name: impl Into<String>, matcher: Matcher, responder: Responder) {
        let name = name.into();
        let seq = self.next_seq;
        self.next_seq += 1;
        trace!(stub = %name, arity = matcher.arity(), seq, "registering stub");
        self.entries.push_front(StubRegistration {
            name,
            matcher,
            responder,
            seq,
        });
    }

    /// Resolve a call to a responder result.
    ///
    /// Newest registration whose matcher accepts wins. A name with
    /// registrations but no accepting matcher is an argument mismatch; a name
    /// with no registrations at all is not stubbed. Responder failures
    /// (designated raises, forward errors) propagate unchanged.
    pub fn resolve(&self, name: &str, args: &[Value]) -> Result<Value> {
        let mut name_seen = false;
        for entry in &self.entries {
            if entry.name != name {
                continue;
            }
            name_seen = true;
            if entry.matcher.accepts(args) {
                return entry.responder.respond(args);
            }
        }
        if name_seen {
            Err(DoubleError::ArgumentMismatch {
                name: name.to_string(),
                arity: args.len(),
            })
        } else {
            Err(DoubleError::NotStubbed {
                name: name.to_string(),
            })
        }
    }

    /// Remove the selected registrations; returns how many were dropped
    pub fn clear(&mut self, target: &ClearTarget) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| !target.selects(&entry.name));
        before - self.entries.len()
    }

    /// Distinct `(name, arity)` pairs currently registered, newest-first.
    /// This is the surface a module installer re-installs after each change.
    pub fn surface(&self) -> Vec<(String, usize)> {
        let mut seen: Vec<(String, usize)> = Vec::new();
        for entry in &self.entries {
            let pair = (entry.name.clone(), entry.matcher.arity());
            if !seen.contains(&pair) {
                seen.push(pair);
            }
        }
        seen
    }

    /// Registrations in resolution order (front = newest)
    pub fn registrations(&self) -> impl Iterator<Item = &StubRegistration> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exact(args: Vec<Value>) -> Matcher {
        Matcher::Exact(args)
    }

    #[test]
    fn most_recent_registration_wins() {
        let mut store = StubStore::new();
        store.push("calc", exact(vec![json!(1), json!(2), json!(3)]), Responder::from_returns(vec![json!(1)]));
        store.push("calc", exact(vec![json!(1), json!(2), json!(3)]), Responder::from_returns(vec![json!(2)]));

        let args = [json!(1), json!(2), json!(3)];
        // Overwrite semantics, not queueing: repeated resolution stays at 2.
        assert_eq!(store.resolve("calc", &args).unwrap(), json!(2));
        assert_eq!(store.resolve("calc", &args).unwrap(), json!(2));
    }

    #[test]
    fn independent_matchers_coexist() {
        let mut store = StubStore::new();
        store.push("lookup", exact(vec![json!(1)]), Responder::from_returns(vec![json!("one")]));
        store.push("lookup", exact(vec![json!(2)]), Responder::from_returns(vec![json!("two")]));
        store.push("lookup", exact(vec![json!(3)]), Responder::from_returns(vec![json!("three")]));

        assert_eq!(store.resolve("lookup", &[json!(2)]).unwrap(), json!("two"));
        assert_eq!(store.resolve("lookup", &[json!(1)]).unwrap(), json!("one"));
        assert_eq!(store.resolve("lookup", &[json!(3)]).unwrap(), json!("three"));
        // Idempotent: a second resolution yields the same value.
        assert_eq!(store.resolve("lookup", &[json!(3)]).unwrap(), json!("three"));
    }

    #[test]
    fn multi_value_sequence_sticks_on_last() {
        let mut store = StubStore::new();
        store.push(
            "next",
            Matcher::Any(0),
            Responder::from_returns(vec![json!(1), json!(2), json!(3)]),
        );

        assert_eq!(store.resolve("next", &[]).unwrap(), json!(1));
        assert_eq!(store.resolve("next", &[]).unwrap(), json!(2));
        assert_eq!(store.resolve("next", &[]).unwrap(), json!(3));
        assert_eq!(store.resolve("next", &[]).unwrap(), json!(3));
    }

    #[test]
    fn wildcard_matches_on_arity_only() {
        let mut store = StubStore::new();
        store.push("send", Matcher::Any(3), Responder::from_returns(vec![json!("ok")]));

        assert_eq!(
            store.resolve("send", &[json!("a"), json!(null), json!(9)]).unwrap(),
            json!("ok")
        );
        assert_eq!(
            store.resolve("send", &[json!("a")]),
            Err(DoubleError::ArgumentMismatch {
                name: "send".to_string(),
                arity: 1,
            })
        );
    }

    #[test]
    fn no_return_value_resolves_to_null() {
        let mut store = StubStore::new();
        store.push("ping", exact(vec![]), Responder::from_returns(vec![]));

        assert_eq!(store.resolve("ping", &[]).unwrap(), Value::Null);
    }

    #[test]
    fn unknown_name_is_not_stubbed() {
        let store = StubStore::new();
        assert_eq!(
            store.resolve("ghost", &[]),
            Err(DoubleError::NotStubbed {
                name: "ghost".to_string()
            })
        );
    }

    #[test]
    fn mismatch_is_distinct_from_not_stubbed() {
        let mut store = StubStore::new();
        store.push("f", exact(vec![json!(1)]), Responder::from_returns(vec![json!(10)]));

        assert!(matches!(
            store.resolve("f", &[json!(99)]),
            Err(DoubleError::ArgumentMismatch { .. })
        ));
        assert!(matches!(
            store.resolve("g", &[json!(99)]),
            Err(DoubleError::NotStubbed { .. })
        ));
    }

    #[test]
    fn raise_responder_surfaces_designated_failure() {
        let mut store = StubStore::new();
        store.push("boom", Matcher::Any(0), Responder::Raise("kaput".to_string()));

        assert_eq!(
            store.resolve("boom", &[]),
            Err(DoubleError::Raised {
                message: "kaput".to_string()
            })
        );
    }

    #[test]
    fn clear_all_and_clear_by_name() {
        let mut store = StubStore::new();
        store.push("a", Matcher::Any(0), Responder::from_returns(vec![json!(1)]));
        store.push("b", Matcher::Any(0), Responder::from_returns(vec![json!(2)]));
        store.push("c", Matcher::Any(0), Responder::from_returns(vec![json!(3)]));

        assert_eq!(store.clear(&ClearTarget::Name("b".to_string())), 1);
        assert!(store.resolve("a", &[]).is_ok());
        assert!(matches!(
            store.resolve("b", &[]),
            Err(DoubleError::NotStubbed { .. })
        ));

        assert_eq!(store.clear(&ClearTarget::All), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn clear_name_set_removes_each() {
        let mut store = StubStore::new();
        store.push("a", Matcher::Any(0), Responder::from_returns(vec![json!(1)]));
        store.push("b", Matcher::Any(1), Responder::from_returns(vec![json!(2)]));
        store.push("c", Matcher::Any(2), Responder::from_returns(vec![json!(3)]));

        let removed = store.clear(&ClearTarget::Names(vec!["a".to_string(), "c".to_string()]));
        assert_eq!(removed, 2);
        assert_eq!(store.surface(), vec![("b".to_string(), 1)]);
    }

    #[test]
    fn surface_deduplicates_and_keeps_newest_first() {
        let mut store = StubStore::new();
        store.push("f", exact(vec![json!(1)]), Responder::from_returns(vec![json!(1)]));
        store.push("g", Matcher::Any(2), Responder::from_returns(vec![json!(2)]));
        store.push("f", exact(vec![json!(9)]), Responder::from_returns(vec![json!(3)]));

        assert_eq!(
            store.surface(),
            vec![("f".to_string(), 1), ("g".to_string(), 2)]
        );
    }

    #[test]
    fn insertion_sequence_is_monotonic_and_agrees_with_position() {
        let mut store = StubStore::new();
        store.push("a", Matcher::Any(0), Responder::from_returns(vec![json!(1)]));
        store.push("b", Matcher::Any(0), Responder::from_returns(vec![json!(2)]));
        store.push("a", Matcher::Any(0), Responder::from_returns(vec![json!(3)]));

        // Front = newest, so seq decreases walking the queue.
        let seqs: Vec<u64> = store.registrations().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![2, 1, 0]);
    }

    #[test]
    fn later_registration_shadows_other_names_pass_through() {
        // Global ordering: a fallback Forward registered first is shadowed by
        // a later exact registration for the same name.
        let mut store = StubStore::new();
        store.push(
            "greet",
            Matcher::Any(1),
            Responder::Forward(Arc::new(|args: &[Value]| Ok(json!(format!("real:{}", args[0]))))),
        );
        store.push("greet", exact(vec![json!("bob")]), Responder::from_returns(vec![json!("stubbed")]));

        assert_eq!(store.resolve("greet", &[json!("bob")]).unwrap(), json!("stubbed"));
        assert_eq!(
            store.resolve("greet", &[json!("eve")]).unwrap(),
            json!("real:\"eve\"")
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // Whatever came earlier, the newest accepting registration wins.
            #[test]
            fn newest_exact_registration_always_wins(values in proptest::collection::vec(0i64..100, 1..20)) {
                let mut store = StubStore::new();
                let args = vec![json!("k")];
                for v in &values {
                    store.push("op", Matcher::Exact(args.clone()), Responder::from_returns(vec![json!(v)]));
                }
                let resolved = store.resolve("op", &args).unwrap();
                prop_assert_eq!(resolved, json!(values.last().unwrap()));
            }

            // A sequence of n values settles on the last one forever.
            #[test]
            fn sequence_settles_on_last(values in proptest::collection::vec(0i64..100, 2..8), extra in 1usize..6) {
                let mut store = StubStore::new();
                let returns: Vec<Value> = values.iter().map(|v| json!(v)).collect();
                store.push("seq", Matcher::Any(0), Responder::from_returns(returns));

                for v in &values {
                    prop_assert_eq!(store.resolve("seq", &[]).unwrap(), json!(v));
                }
                for _ in 0..extra {
                    prop_assert_eq!(store.resolve("seq", &[]).unwrap(), json!(values.last().unwrap()));
                }
            }
        }
    }
}
