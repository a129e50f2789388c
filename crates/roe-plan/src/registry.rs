//! Plan registry: system type to plan template
//!
//! Populated once at startup and read-only afterwards; the engine takes
//! ownership of the registry when it is constructed.

use crate::builtin;
use crate::error::PlanError;
use crate::plan::SystemRecoveryPlan;
use std::collections::BTreeMap;

/// Registry of recovery plan templates keyed by system type
#[derive(Debug, Clone, Default)]
pub struct PlanRegistry {
    plans: BTreeMap<String, SystemRecoveryPlan>,
}

impl PlanRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            plans: BTreeMap::new(),
        }
    }

    /// Create registry with the `database`, `webapp` and `network` plans
    #[must_use]
    pub fn with_builtin_plans() -> Self {
        let mut registry = Self::new();
        for (system_type, plan) in builtin::plans() {
            // Built-in plans are covered by tests; a failure here is a bug in them.
            if let Err(e) = registry.register(system_type, plan) {
                tracing::error!(system_type, error = %e, "built-in plan rejected");
            }
        }
        registry
    }

    /// Register a validated plan under `system_type`
    ///
    /// # Errors
    /// - `DuplicateSystemType` if the type is already registered
    /// - any [`SystemRecoveryPlan::validate`] error
    pub fn register(
        &mut self,
        system_type: impl Into<String>,
        plan: SystemRecoveryPlan,
    ) -> Result<(), PlanError> {
        let system_type = system_type.into();
        if self.plans.contains_key(&system_type) {
            return Err(PlanError::DuplicateSystemType(system_type));
        }
        plan.validate()?;
        tracing::debug!(system_type = %system_type, plan_id = %plan.id, tasks = plan.tasks.len(), "registered recovery plan");
        self.plans.insert(system_type, plan);
        Ok(())
    }

    /// Look up the template for `system_type`
    #[inline]
    #[must_use]
    pub fn lookup(&self, system_type: &str) -> Option<&SystemRecoveryPlan> {
        self.plans.get(system_type)
    }

    /// Look up the template, failing with `UnknownSystemType`
    ///
    /// # Errors
    /// `PlanError::UnknownSystemType` when nothing is registered for the type
    pub fn resolve(&self, system_type: &str) -> Result<&SystemRecoveryPlan, PlanError> {
        self.lookup(system_type)
            .ok_or_else(|| PlanError::UnknownSystemType(system_type.to_string()))
    }

    /// Registered system types, sorted
    #[must_use]
    pub fn system_types(&self) -> Vec<&str> {
        self.plans.keys().map(String::as_str).collect()
    }

    /// Number of registered plans
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Whether no plan is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
