use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kind::EntityKind;

/// Kind-level dependency DAG.
///
/// Edges point from a consumer kind to the kinds it may reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    dependencies: BTreeMap<EntityKind, BTreeSet<EntityKind>>,
}

/// Summary of DAG structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraphSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Report for kind ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraphReport {
    pub summary: DependencyGraphSummary,
    pub topo_order: Option<Vec<EntityKind>>,
    pub cycle: Option<Vec<EntityKind>>,
}

impl DependencyGraph {
    /// The static graph of all healthcare kinds.
    pub fn healthcare() -> Self {
        Self::from_edges(
            EntityKind::ALL,
            EntityKind::ALL.into_iter().flat_map(|kind| {
                kind.dependencies()
                    .iter()
                    .map(move |dependency| (kind, *dependency))
            }),
        )
    }

    /// Build a graph from explicit (consumer, dependency) pairs.
    pub fn from_edges(
        kinds: impl IntoIterator<Item = EntityKind>,
        edges: impl IntoIterator<Item = (EntityKind, EntityKind)>,
    ) -> Self {
        let mut dependencies: BTreeMap<EntityKind, BTreeSet<EntityKind>> = BTreeMap::new();
        for kind in kinds {
            dependencies.entry(kind).or_default();
        }
        for (consumer, dependency) in edges {
            dependencies.entry(dependency).or_default();
            dependencies.entry(consumer).or_default().insert(dependency);
        }
        Self { dependencies }
    }

    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.dependencies.keys().copied()
    }

    pub fn contains(&self, kind: EntityKind) -> bool {
        self.dependencies.contains_key(&kind)
    }

    /// Whether `consumer` may reference `dependency`.
    pub fn allows(&self, consumer: EntityKind, dependency: EntityKind) -> bool {
        self.dependencies
            .get(&consumer)
            .is_some_and(|targets| targets.contains(&dependency))
    }

    /// Kinds in an order where every kind follows all of its dependencies.
    pub fn publish_order(&self) -> Result<Vec<EntityKind>> {
        toposort(&self.dependents()).map_err(|cycle| {
            let names: Vec<&str> = cycle.iter().map(|kind| kind.resource_type()).collect();
            Error::InvalidGraph(format!("dependency cycle among: {}", names.join(", ")))
        })
    }

    pub fn report(&self) -> DependencyGraphReport {
        let nodes = self.dependencies.len();
        let edges = self.dependencies.values().map(BTreeSet::len).sum();
        let summary = DependencyGraphSummary { nodes, edges };

        match toposort(&self.dependents()) {
            Ok(order) => DependencyGraphReport {
                summary,
                topo_order: Some(order),
                cycle: None,
            },
            Err(cycle) => DependencyGraphReport {
                summary,
                topo_order: None,
                cycle: Some(cycle),
            },
        }
    }

    fn dependents(&self) -> BTreeMap<EntityKind, BTreeSet<EntityKind>> {
        let mut graph: BTreeMap<EntityKind, BTreeSet<EntityKind>> = BTreeMap::new();
        for (consumer, targets) in &self.dependencies {
            graph.entry(*consumer).or_default();
            for target in targets {
                graph.entry(*target).or_default().insert(*consumer);
            }
        }
        graph
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::healthcare()
    }
}

fn toposort(
    graph: &BTreeMap<EntityKind, BTreeSet<EntityKind>>,
) -> std::result::Result<Vec<EntityKind>, Vec<EntityKind>> {
    let mut indegree: BTreeMap<EntityKind, usize> = BTreeMap::new();

    for node in graph.keys() {
        indegree.entry(*node).or_insert(0);
    }

    for targets in graph.values() {
        for target in targets {
            *indegree.entry(*target).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<EntityKind> = indegree
        .iter()
        .filter_map(|(node, count)| if *count == 0 { Some(*node) } else { None })
        .collect();

    let mut order = Vec::with_capacity(graph.len());

    while let Some(node) = ready.pop_first() {
        order.push(node);

        if let Some(targets) = graph.get(&node) {
            for target in targets {
                if let Some(count) = indegree.get_mut(target) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(*target);
                    }
                }
            }
        }
    }

    if order.len() == indegree.len() {
        Ok(order)
    } else {
        let cycle_nodes: Vec<EntityKind> = indegree
            .into_iter()
            .filter_map(|(node, count)| if count > 0 { Some(node) } else { None })
            .collect();
        Err(cycle_nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[EntityKind], kind: EntityKind) -> usize {
        order.iter().position(|item| *item == kind).unwrap()
    }

    #[test]
    fn toposort_orders_dependencies() {
        let graph = DependencyGraph::healthcare();
        let order = graph.publish_order().expect("expected toposort");

        assert_eq!(order.len(), EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            for dependency in kind.dependencies() {
                assert!(
                    position(&order, *dependency) < position(&order, kind),
                    "{dependency} must precede {kind}"
                );
            }
        }
    }

    #[test]
    fn toposort_reports_cycle() {
        let graph = DependencyGraph::from_edges(
            [EntityKind::Patient],
            [
                (EntityKind::Encounter, EntityKind::Observation),
                (EntityKind::Observation, EntityKind::Encounter),
            ],
        );

        let report = graph.report();
        assert!(report.topo_order.is_none());
        let cycle = report.cycle.unwrap();
        assert!(cycle.contains(&EntityKind::Encounter));
        assert!(!cycle.contains(&EntityKind::Patient));
        assert!(graph.publish_order().is_err());
    }

    #[test]
    fn ties_break_in_declaration_order() {
        let order = DependencyGraph::healthcare().publish_order().unwrap();
        assert_eq!(order[0], EntityKind::Organization);
        assert_eq!(order[1], EntityKind::Location);
    }

    #[test]
    fn allows_only_declared_edges() {
        let graph = DependencyGraph::healthcare();
        assert!(graph.allows(EntityKind::Condition, EntityKind::Patient));
        assert!(!graph.allows(EntityKind::Patient, EntityKind::Condition));
    }
}
