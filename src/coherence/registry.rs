use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

use crate::cluster::types::SiteId;

use super::types::Variable;

/// Node-local map from variable id to its record.
///
/// Records are inserted while receiver tasks may concurrently look ids up;
/// the map handles that, and each record's own mutex serializes protocol
/// state. A lookup miss is normal during destruction races — callers log
/// and drop the message.
#[derive(Default)]
pub struct VariableRegistry {
    vars: DashMap<SiteId, Arc<Variable>>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record; refuses a duplicate id.
    pub fn insert(&self, var: Arc<Variable>) -> bool {
        match self.vars.entry(var.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(var);
                true
            }
        }
    }

    pub fn get(&self, id: SiteId) -> Option<Arc<Variable>> {
        self.vars.get(&id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: SiteId) -> Option<Arc<Variable>> {
        self.vars.remove(&id).map(|(_, var)| var)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
