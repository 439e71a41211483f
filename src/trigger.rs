//! Trigger matching for hook registration
//!
//! A trigger gates hook execution on an intercepted argument value. The
//! variants are explicit: a type trigger is authoritative whenever one is
//! supplied, a value trigger uses structural equality, and `Always` fires
//! unconditionally. Empty trigger sets are invalid.

use std::collections::HashSet;

use crate::errors::{Result, TraceError};
use crate::value::{TypeTag, Value};

/// Condition gating hook execution
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Fire on every observed value
    Always,
    /// Fire when the value's runtime type is in the set
    ByType(HashSet<TypeTag>),
    /// Fire when the value is structurally equal to a member
    ByValue(Vec<Value>),
}

impl Trigger {
    /// Build a type trigger; empty sets are invalid
    pub fn by_types(tags: impl IntoIterator<Item = TypeTag>) -> Result<Self> {
        let set: HashSet<TypeTag> = tags.into_iter().collect();
        if set.is_empty() {
            return Err(TraceError::InvalidTrigger(
                "type trigger set must not be empty".to_string(),
            ));
        }
        Ok(Trigger::ByType(set))
    }

    /// Build a value trigger; empty sets are invalid
    pub fn by_values(values: impl IntoIterator<Item = Value>) -> Result<Self> {
        let members: Vec<Value> = values.into_iter().collect();
        if members.is_empty() {
            return Err(TraceError::InvalidTrigger(
                "value trigger set must not be empty".to_string(),
            ));
        }
        Ok(Trigger::ByValue(members))
    }

    /// Resolve the optional type/value trigger pair from a registration call.
    ///
    /// A type trigger always takes precedence: when both are supplied the
    /// value trigger is ignored. Supplying neither yields `Always`.
    pub fn resolve(
        type_trigger: Option<Vec<TypeTag>>,
        value_trigger: Option<Vec<Value>>,
    ) -> Result<Self> {
        match (type_trigger, value_trigger) {
            (Some(tags), _) => Self::by_types(tags),
            (None, Some(values)) => Self::by_values(values),
            (None, None) => Ok(Trigger::Always),
        }
    }

    /// Does this trigger fire on the given value?
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Trigger::Always => true,
            Trigger::ByType(tags) => tags.contains(&value.type_tag()),
            Trigger::ByValue(members) => members.contains(value),
        }
    }
}
