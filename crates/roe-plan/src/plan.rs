//! Immutable recovery plan templates

use crate::error::PlanError;
use crate::task::RecoveryTask;
use crate::types::{Criticality, Phase};
use chrono::{DateTime, Utc};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Recovery plan for one recoverable system type
///
/// Templates are never mutated once registered. Each recovery instance gets
/// its own deep copy of [`SystemRecoveryPlan::tasks`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRecoveryPlan {
    /// Plan identifier
    pub id: String,
    /// Target system name
    pub system_name: String,
    /// Criticality tier
    pub criticality: Criticality,
    /// Task templates in creation order
    pub tasks: Vec<RecoveryTask>,
    /// Where backups for this system live
    pub backup_location: Option<String>,
    /// Free-text restoration checklist
    pub restoration_procedures: Vec<String>,
    /// Free-text validation checklist
    pub validation_checks: Vec<String>,
    /// Role to contact address
    pub contact_info: BTreeMap<String, String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl SystemRecoveryPlan {
    /// Create an empty plan
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        system_name: impl Into<String>,
        criticality: Criticality,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            system_name: system_name.into(),
            criticality,
            tasks: Vec::new(),
            backup_location: None,
            restoration_procedures: Vec::new(),
            validation_checks: Vec::new(),
            contact_info: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a task template
    #[inline]
    #[must_use]
    pub fn with_task(mut self, task: RecoveryTask) -> Self {
        self.tasks.push(task);
        self
    }

    /// With backup location
    #[inline]
    #[must_use]
    pub fn with_backup_location(mut self, location: impl Into<String>) -> Self {
        self.backup_location = Some(location.into());
        self
    }

    /// With restoration checklist
    #[must_use]
    pub fn with_restoration_procedures<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restoration_procedures = steps.into_iter().map(Into::into).collect();
        self
    }

    /// With validation checklist
    #[must_use]
    pub fn with_validation_checks<I, S>(mut self, checks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validation_checks = checks.into_iter().map(Into::into).collect();
        self
    }

    /// Add a contact entry
    #[inline]
    #[must_use]
    pub fn with_contact(mut self, role: impl Into<String>, address: impl Into<String>) -> Self {
        self.contact_info.insert(role.into(), address.into());
        self
    }

    /// Find a task template by id
    #[must_use]
    pub fn task(&self, id: &str) -> Option<&RecoveryTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Task templates belonging to `phase`, in creation order
    pub fn tasks_in_phase(&self, phase: Phase) -> impl Iterator<Item = &RecoveryTask> {
        self.tasks.iter().filter(move |t| t.phase == phase)
    }

    /// Check structural soundness of the plan
    ///
    /// # Errors
    /// - `DuplicateTaskId` if two tasks share an id
    /// - `UnknownDependency` if a dependency id is not in the plan
    /// - `ForwardPhaseDependency` if a dependency sits in a later phase
    /// - `DependencyCycle` if dependencies form a cycle
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(self.tasks.len());
        for (i, task) in self.tasks.iter().enumerate() {
            if index.insert(task.id.as_str(), i).is_some() {
                return Err(PlanError::DuplicateTaskId(task.id.clone()));
            }
        }

        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        for (i, task) in self.tasks.iter().enumerate() {
            graph.add_node(i);
            for dep in &task.dependencies {
                let Some(&d) = index.get(dep.as_str()) else {
                    return Err(PlanError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                let dep_task = &self.tasks[d];
                if dep_task.phase > task.phase {
                    return Err(PlanError::ForwardPhaseDependency {
                        task: task.id.clone(),
                        task_phase: task.phase,
                        dependency: dep.clone(),
                        dependency_phase: dep_task.phase,
                    });
                }
                graph.add_edge(d, i, ());
            }
        }

        toposort(&graph, None)
            .map(|_| ())
            .map_err(|cycle| PlanError::DependencyCycle(self.tasks[cycle.node_id()].id.clone()))
    }
}
