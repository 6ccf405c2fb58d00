//! The name-to-handler dispatch tables.
//!
//! There is no reflection here: everything a peer may invoke is registered
//! at startup. Free functions live under a namespace; class-level members
//! (constructors included) live under a class name. Registration is also
//! the allow-list - an unregistered name simply cannot be called.

use crate::error::RemoteException;
use crate::eval::{Evaluator, ExprEvaluator};
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;

pub type Handler = Box<dyn Fn(Vec<Value>) -> Result<Value, RemoteException> + Send + Sync>;

#[derive(Default)]
struct ClassEntry {
    members: IndexMap<String, Handler>,
}

/// Everything one node is willing to execute on behalf of its peer.
pub struct Registry {
    functions: IndexMap<String, IndexMap<String, Handler>>,
    classes: IndexMap<String, ClassEntry>,
    evaluator: Box<dyn Evaluator>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("namespaces", &self.functions.len())
            .field("classes", &self.classes.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            functions: IndexMap::new(),
            classes: IndexMap::new(),
            evaluator: Box::new(ExprEvaluator),
        }
    }

    /// Register a free function under `namespace`.
    pub fn register_function<F>(&mut self, namespace: &str, name: &str, handler: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, RemoteException> + Send + Sync + 'static,
    {
        self.functions
            .entry(namespace.to_owned())
            .or_default()
            .insert(name.to_owned(), Box::new(handler));
    }

    /// Register a class-level member (a constructor returns
    /// `Value::Object`, but any class-level function is allowed).
    pub fn register_class_member<F>(&mut self, class: &str, member: &str, handler: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, RemoteException> + Send + Sync + 'static,
    {
        self.classes
            .entry(class.to_owned())
            .or_default()
            .members
            .insert(member.to_owned(), Box::new(handler));
    }

    /// Replace the expression evaluator backing the `eval` call kind.
    pub fn set_evaluator<E: Evaluator + 'static>(&mut self, evaluator: E) {
        self.evaluator = Box::new(evaluator);
    }

    pub(crate) fn function(&self, namespace: &str, name: &str) -> Option<&Handler> {
        self.functions.get(namespace)?.get(name)
    }

    pub(crate) fn class_member(&self, class: &str, member: &str) -> Option<&Handler> {
        self.classes.get(class)?.members.get(member)
    }

    pub(crate) fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
