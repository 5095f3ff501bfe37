//! Host-object collaborator.
//!
//! The embedding application supplies a [`HostFactory`] that builds zero-value
//! instances for a class identifier. Compiled programs then read and write named
//! properties on those instances exactly like struct fields.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use crate::val::Val;

pub trait HostObject: fmt::Debug + Send + Sync {
    fn class_name(&self) -> &str;

    fn get(&self, key: &str) -> Option<Val>;

    fn set(&mut self, key: &str, value: Val) -> Result<()>;

    /// All properties, sorted by key.
    fn properties(&self) -> Vec<(Arc<str>, Val)>;

    /// Fresh copy used when a shared instance has to be modified.
    fn duplicate(&self) -> Box<dyn HostObject>;
}

pub trait HostFactory: Send + Sync {
    fn instantiate(&self, class: &str) -> Result<Arc<dyn HostObject>>;
}

impl<F> HostFactory for F
where
    F: Fn(&str) -> Result<Arc<dyn HostObject>> + Send + Sync,
{
    fn instantiate(&self, class: &str) -> Result<Arc<dyn HostObject>> {
        self(class)
    }
}
