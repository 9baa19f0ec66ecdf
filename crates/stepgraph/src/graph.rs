//! Dependency graph over the steps of one compilation
//!
//! Steps live in an insertion-ordered arena indexed by [`StepId`]. Forward
//! edges (step → its dependencies) and reverse edges (step → its
//! dependents) are recorded when a step is added, even if the dependency
//! has not been added yet; [`StepGraph::validate`] reports anything still
//! dangling once every provider has run.

use crate::error::GraphError;
use crate::step::{BoxedStep, Step};
use crate::step_id::StepId;
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;

/// The dependency DAG of all steps in one compilation
#[derive(Debug, Default)]
pub struct StepGraph {
    steps: Vec<BoxedStep>,
    index: HashMap<StepId, usize>,
    /// step -> steps it depends on
    forward: HashMap<StepId, Vec<StepId>>,
    /// step -> steps that depend on it
    reverse: HashMap<StepId, Vec<StepId>>,
}

impl StepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step, recording its dependency edges
    ///
    /// Fails without touching the graph if the ID is already present.
    pub fn add(&mut self, step: BoxedStep) -> Result<(), GraphError> {
        let id = step.id().clone();
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateStep { id });
        }

        let deps = step.depends_on().to_vec();
        for dep in &deps {
            self.reverse.entry(dep.clone()).or_default().push(id.clone());
        }
        self.forward.insert(id.clone(), deps);
        self.index.insert(id, self.steps.len());
        self.steps.push(step);
        Ok(())
    }

    pub fn get(&self, id: &StepId) -> Option<&dyn Step> {
        self.index.get(id).map(|&i| self.steps[i].as_ref())
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.index.contains_key(id)
    }

    /// All steps, in insertion order
    pub fn steps(&self) -> Vec<&dyn Step> {
        self.steps.iter().map(AsRef::as_ref).collect()
    }

    /// All step IDs, in insertion order
    pub fn ids(&self) -> impl Iterator<Item = &StepId> {
        self.steps.iter().map(|s| s.id())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Declared dependencies of a step, including dangling ones
    pub fn dependencies(&self, id: &StepId) -> &[StepId] {
        self.forward.get(id).map_or(&[], Vec::as_slice)
    }

    /// Steps that declared a dependency on `id`
    pub fn dependents(&self, id: &StepId) -> &[StepId] {
        self.reverse.get(id).map_or(&[], Vec::as_slice)
    }

    /// Check that every dependency edge points at an added step
    pub fn validate(&self) -> Result<(), GraphError> {
        for step in &self.steps {
            for dep in self.dependencies(step.id()) {
                if !self.contains(dep) {
                    return Err(GraphError::MissingDependency {
                        step: step.id().clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Steps with no dependencies among the added steps
    pub fn roots(&self) -> Vec<&dyn Step> {
        self.steps
            .iter()
            .filter(|s| !self.dependencies(s.id()).iter().any(|d| self.contains(d)))
            .map(AsRef::as_ref)
            .collect()
    }

    /// Steps nothing depends on
    pub fn leaves(&self) -> Vec<&dyn Step> {
        self.steps
            .iter()
            .filter(|s| self.dependents(s.id()).is_empty())
            .map(AsRef::as_ref)
            .collect()
    }

    /// Order steps so every step comes after its dependencies
    ///
    /// Kahn's algorithm with a FIFO queue seeded in insertion order. Edges
    /// to steps that were never added do not count toward in-degree. If any
    /// step is left unsorted the graph has a cycle and no order is returned.
    pub fn topological_sort(&self) -> Result<Vec<&dyn Step>, GraphError> {
        let order = self.sorted_indices()?;
        Ok(order.into_iter().map(|i| self.steps[i].as_ref()).collect())
    }

    /// Arena indices in dependency order
    pub(crate) fn sorted_indices(&self) -> Result<Vec<usize>, GraphError> {
        let mut in_degree = self.in_degrees();

        let mut queue: VecDeque<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for dependent in self.dependents(self.steps[i].id()) {
                let j = self.index[dependent];
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    queue.push_back(j);
                }
            }
        }

        if order.len() < self.steps.len() {
            let steps = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, &degree)| degree > 0)
                .map(|(i, _)| self.steps[i].id().clone())
                .collect();
            return Err(GraphError::CyclicDependency { steps });
        }

        Ok(order)
    }

    /// In-degree per arena index, counting only edges to added steps
    pub(crate) fn in_degrees(&self) -> Vec<usize> {
        self.steps
            .iter()
            .map(|s| {
                self.dependencies(s.id())
                    .iter()
                    .filter(|d| self.contains(d))
                    .count()
            })
            .collect()
    }

    pub(crate) fn index_of(&self, id: &StepId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn step_at(&self, i: usize) -> &dyn Step {
        self.steps[i].as_ref()
    }

    /// Render the graph in Graphviz DOT format
    ///
    /// Edges point from a dependency to its dependent; dangling
    /// dependencies are drawn dashed.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph steps {\n    rankdir=LR;\n");
        for step in &self.steps {
            let _ = writeln!(out, "    {:?};", step.id().as_str());
        }
        for step in &self.steps {
            for dep in self.dependencies(step.id()) {
                let style = if self.contains(dep) { "" } else { " [style=dashed]" };
                let _ = writeln!(
                    out,
                    "    {:?} -> {:?}{style};",
                    dep.as_str(),
                    step.id().as_str()
                );
            }
        }
        out.push_str("}\n");
        out
    }
}
