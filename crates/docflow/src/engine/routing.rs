use super::address::NodeKey;
use super::arena::ComponentId;
use rustc_hash::{FxHashMap, FxHashSet};

/// Reverse edges of the dependency graph.
///
/// Besides producer → consumer edges it tracks two kinds of structural
/// watches: nodes that read a component's child list, and nodes that looked
/// up a name (whether or not the lookup succeeded). Edges and watches are
/// also indexed by the components they touch, so removing a component only
/// visits its own.
#[derive(Debug, Default)]
pub struct DependentsIndex {
    consumers: FxHashMap<NodeKey, FxHashSet<NodeKey>>,
    structure_watchers: FxHashMap<ComponentId, FxHashSet<NodeKey>>,
    name_watchers: FxHashMap<String, FxHashSet<NodeKey>>,
    edges_by_component: FxHashMap<ComponentId, FxHashSet<(NodeKey, NodeKey)>>,
    watches_by_component: FxHashMap<ComponentId, FxHashSet<Watch>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Watch {
    Structure(ComponentId),
    Name(String),
}

impl DependentsIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, producer: NodeKey, consumer: NodeKey) {
        if !self.consumers.entry(producer).or_default().insert(consumer) {
            return;
        }
        self.edges_by_component
            .entry(producer.component)
            .or_default()
            .insert((producer, consumer));
        if consumer.component != producer.component {
            self.edges_by_component
                .entry(consumer.component)
                .or_default()
                .insert((producer, consumer));
        }
    }

    pub fn remove_edge(&mut self, producer: NodeKey, consumer: NodeKey) {
        let Some(consumers) = self.consumers.get_mut(&producer) else {
            return;
        };
        if !consumers.remove(&consumer) {
            return;
        }
        if consumers.is_empty() {
            self.consumers.remove(&producer);
        }
        for component in [producer.component, consumer.component] {
            self.unindex_edge(component, (producer, consumer));
        }
    }

    fn unindex_edge(&mut self, component: ComponentId, edge: (NodeKey, NodeKey)) {
        if let Some(edges) = self.edges_by_component.get_mut(&component) {
            edges.remove(&edge);
            if edges.is_empty() {
                self.edges_by_component.remove(&component);
            }
        }
    }

    pub fn consumers_of(&self, producer: &NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        self.consumers.get(producer).into_iter().flatten().copied()
    }

    pub fn watch_structure(&mut self, component: ComponentId, consumer: NodeKey) {
        if self.structure_watchers.entry(component).or_default().insert(consumer) {
            self.watches_by_component
                .entry(consumer.component)
                .or_default()
                .insert(Watch::Structure(component));
        }
    }

    pub fn watch_name(&mut self, name: &str, consumer: NodeKey) {
        let inserted = match self.name_watchers.get_mut(name) {
            Some(watchers) => watchers.insert(consumer),
            None => {
                self.name_watchers
                    .insert(name.to_string(), FxHashSet::from_iter([consumer]));
                true
            }
        };
        if inserted {
            self.watches_by_component
                .entry(consumer.component)
                .or_default()
                .insert(Watch::Name(name.to_string()));
        }
    }

    /// Watchers fire once: taking them clears the registration.
    pub fn take_structure_watchers(&mut self, component: ComponentId) -> Vec<NodeKey> {
        self.structure_watchers
            .remove(&component)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn take_name_watchers(&mut self, name: &str) -> Vec<NodeKey> {
        self.name_watchers
            .remove(name)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    /// Drop every edge touching a component that is being removed.
    /// Returns the surviving consumers that lost a producer.
    pub fn remove_component(&mut self, component: ComponentId) -> Vec<NodeKey> {
        let mut orphaned = Vec::new();
        for (producer, consumer) in self.edges_by_component.remove(&component).unwrap_or_default() {
            if let Some(consumers) = self.consumers.get_mut(&producer) {
                consumers.remove(&consumer);
                if consumers.is_empty() {
                    self.consumers.remove(&producer);
                }
            }
            let other = match producer.component == component {
                true => consumer.component,
                false => producer.component,
            };
            if other != component {
                self.unindex_edge(other, (producer, consumer));
                if producer.component == component {
                    orphaned.push(consumer);
                }
            }
        }

        self.structure_watchers.remove(&component);
        // Stale entries for watches that already fired are harmless.
        for watch in self.watches_by_component.remove(&component).unwrap_or_default() {
            let watchers = match &watch {
                Watch::Structure(watched) => self.structure_watchers.get_mut(watched),
                Watch::Name(name) => self.name_watchers.get_mut(name),
            };
            if let Some(watchers) = watchers {
                watchers.retain(|consumer| consumer.component != component);
            }
        }
        orphaned
    }

    pub fn edge_count(&self) -> usize {
        self.consumers.values().map(FxHashSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::address::VarId;

    fn id(index: u32) -> ComponentId {
        ComponentId {
            index,
            generation: 0,
        }
    }

    #[test]
    fn edges_add_remove() {
        let mut index = DependentsIndex::new();
        let a = NodeKey::whole(id(1), VarId(0));
        let b = NodeKey::whole(id(2), VarId(0));
        let c = NodeKey::whole(id(3), VarId(0));

        index.add_edge(a, b);
        index.add_edge(a, c);
        assert_eq!(index.consumers_of(&a).count(), 2);

        index.remove_edge(a, b);
        assert_eq!(index.consumers_of(&a).collect::<Vec<_>>(), vec![c]);
    }

    #[test]
    fn removing_component_reports_orphans() {
        let mut index = DependentsIndex::new();
        let producer = NodeKey::whole(id(1), VarId(0));
        let consumer = NodeKey::whole(id(2), VarId(0));
        index.add_edge(producer, consumer);
        index.watch_structure(id(1), consumer);

        let orphaned = index.remove_component(id(1));
        assert_eq!(orphaned, vec![consumer]);
        assert_eq!(index.edge_count(), 0);
        assert!(index.take_structure_watchers(id(1)).is_empty());
    }

    #[test]
    fn removing_a_consumer_leaves_other_edges() {
        let mut index = DependentsIndex::new();
        let producer = NodeKey::whole(id(1), VarId(0));
        let doomed = NodeKey::whole(id(2), VarId(0));
        let survivor = NodeKey::whole(id(3), VarId(0));
        index.add_edge(producer, doomed);
        index.add_edge(producer, survivor);
        index.watch_name("p", doomed);
        index.watch_structure(id(1), doomed);
        index.watch_structure(id(1), survivor);

        assert!(index.remove_component(id(2)).is_empty());
        assert_eq!(index.consumers_of(&producer).collect::<Vec<_>>(), vec![survivor]);
        assert!(index.take_name_watchers("p").is_empty());
        assert_eq!(index.take_structure_watchers(id(1)), vec![survivor]);

        assert_eq!(index.remove_component(id(1)), vec![survivor]);
        assert_eq!(index.edge_count(), 0);
        assert!(index.edges_by_component.is_empty());
    }

    #[test]
    fn name_watchers_fire_once() {
        let mut index = DependentsIndex::new();
        let consumer = NodeKey::whole(id(2), VarId(1));
        index.watch_name("p", consumer);
        index.watch_name("p", consumer);
        assert_eq!(index.take_name_watchers("p"), vec![consumer]);
        assert!(index.take_name_watchers("p").is_empty());
    }
}
