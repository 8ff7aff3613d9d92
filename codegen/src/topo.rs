//! Emission order for a service closure.
//!
//! Shapes are ordered so that every shape comes after the shapes it references.
//! Shapes that take part in a reference cycle can't be ordered that way; they
//! form the recursive set, which is emitted after everything else, sorted by id.
//! Any reference to a recursive shape must be written as a deferred reference.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::{
    error::{Error, Result},
    model::{Model, ShapeId},
};

#[derive(Debug)]
pub struct TopologicalIndex {
    ordered: Vec<ShapeId>,
    recursive: Vec<ShapeId>,
    recursive_set: BTreeSet<ShapeId>,
}

impl TopologicalIndex {
    /// Computes the order of all declared shapes reachable from `root`.
    /// Fails if the root doesn't resolve.
    pub fn new(model: &Model, root: &ShapeId) -> Result<Self> {
        let nodes = model.walk_shapes(root)?;
        let mut edges = BTreeMap::new();
        for id in nodes.iter() {
            let shape = model.expect_shape(id)?;
            let mut targets: Vec<ShapeId> = Vec::new();
            for target in shape.kind.references() {
                if nodes.contains(target) && !targets.contains(target) {
                    targets.push(target.clone());
                }
            }
            edges.insert(id.clone(), targets);
        }

        let mut tarjan = Tarjan::new(&edges);
        for id in edges.keys() {
            if !tarjan.indices.contains_key(id) {
                tarjan.connect(id);
            }
        }

        let mut ordered = Vec::new();
        let mut recursive_set = BTreeSet::new();
        for component in tarjan.components {
            let self_edge = component.len() == 1
                && edges.get(component[0]).map(|t| t.contains(component[0])).unwrap_or(false);
            if component.len() > 1 || self_edge {
                recursive_set.extend(component.into_iter().cloned());
            } else {
                ordered.push(component[0].clone());
            }
        }
        let recursive = recursive_set.iter().cloned().collect::<Vec<_>>();
        debug!(
            ordered = ordered.len(),
            recursive = recursive.len(),
            "computed shape order"
        );
        let index = TopologicalIndex { ordered, recursive, recursive_set };
        index.verify(&edges)?;
        Ok(index)
    }

    /// Non-recursive shapes, each after all its dependencies
    pub fn ordered_shapes(&self) -> &[ShapeId] {
        &self.ordered
    }

    /// Recursive shapes, sorted by id
    pub fn recursive_shapes(&self) -> &[ShapeId] {
        &self.recursive
    }

    pub fn recursive_set(&self) -> &BTreeSet<ShapeId> {
        &self.recursive_set
    }

    pub fn is_recursive(&self, id: &ShapeId) -> bool {
        self.recursive_set.contains(id)
    }

    /// A reference to `target` must be deferred when the target is recursive:
    /// its declaration is either later in the file or part of the same cycle.
    pub fn needs_deferred_reference(&self, target: &ShapeId) -> bool {
        self.is_recursive(target)
    }

    /// All shapes: ordered, then recursive
    pub fn emission_order(&self) -> impl Iterator<Item = &ShapeId> {
        self.ordered.iter().chain(self.recursive.iter())
    }

    /// Every non-recursive dependency must be placed before its dependent
    fn verify(&self, edges: &BTreeMap<ShapeId, Vec<ShapeId>>) -> Result<()> {
        let mut placed = HashSet::new();
        for id in self.ordered.iter() {
            for target in edges.get(id).into_iter().flatten() {
                if !self.is_recursive(target) && !placed.contains(target) {
                    return Err(Error::UnclassifiedCycle(id.to_string()));
                }
            }
            placed.insert(id);
        }
        Ok(())
    }
}

/// Tarjan's strongly connected components.
/// Components are produced in reverse topological order: sinks first.
struct Tarjan<'a> {
    edges: &'a BTreeMap<ShapeId, Vec<ShapeId>>,
    next_index: usize,
    indices: HashMap<&'a ShapeId, usize>,
    lowlink: HashMap<&'a ShapeId, usize>,
    stack: Vec<&'a ShapeId>,
    on_stack: HashSet<&'a ShapeId>,
    components: Vec<Vec<&'a ShapeId>>,
}

impl<'a> Tarjan<'a> {
    fn new(edges: &'a BTreeMap<ShapeId, Vec<ShapeId>>) -> Self {
        Tarjan {
            edges,
            next_index: 0,
            indices: HashMap::new(),
            lowlink: HashMap::new(),
            stack: Vec::new(),
            on_stack: HashSet::new(),
            components: Vec::new(),
        }
    }

    fn connect(&mut self, v: &'a ShapeId) {
        self.indices.insert(v, self.next_index);
        self.lowlink.insert(v, self.next_index);
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack.insert(v);

        let edges = self.edges;
        for w in edges.get(v).into_iter().flatten() {
            if !self.indices.contains_key(w) {
                self.connect(w);
                let low = self.lowlink[v].min(self.lowlink[w]);
                self.lowlink.insert(v, low);
            } else if self.on_stack.contains(w) {
                let low = self.lowlink[v].min(self.indices[w]);
                self.lowlink.insert(v, low);
            }
        }

        if self.lowlink[v] == self.indices[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack.remove(w);
                component.push(w);
                if w == v {
                    break;
                }
            }
            component.sort();
            self.components.push(component);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ListOrSet, Member, Shape, ShapeKind, StructureOrUnion};
    use proptest::prelude::*;

    fn id(name: &str) -> ShapeId {
        format!("ex#{}", name).parse().unwrap()
    }

    fn structure(name: &str, targets: &[&str]) -> Shape {
        let sid = id(name);
        let members = targets
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let target = if t.contains('#') { t.parse().unwrap() } else { id(t) };
                Member::new(sid.with_member(&format!("m{}", i)), target)
            })
            .collect();
        Shape::new(sid, ShapeKind::Structure(StructureOrUnion { members }))
    }

    fn model(shapes: Vec<Shape>) -> Model {
        let mut model = Model::new();
        for shape in shapes {
            model.add_shape(shape).unwrap();
        }
        model
    }

    fn position(index: &TopologicalIndex, name: &str) -> usize {
        index.emission_order().position(|s| s == &id(name)).unwrap()
    }

    #[test]
    fn dependencies_come_first() {
        let m = model(vec![
            structure("Root", &["Order", "Customer"]),
            structure("Order", &["Customer", "smithy.api#String"]),
            structure("Customer", &["smithy.api#String"]),
        ]);
        let index = TopologicalIndex::new(&m, &id("Root")).unwrap();
        assert!(index.recursive_shapes().is_empty());
        assert!(position(&index, "Customer") < position(&index, "Order"));
        assert!(position(&index, "Order") < position(&index, "Root"));
    }

    #[test]
    fn mutual_recursion_is_classified() {
        let m = model(vec![
            structure("Root", &["A", "Leaf"]),
            structure("A", &["B"]),
            structure("B", &["A"]),
            structure("Leaf", &[]),
        ]);
        let index = TopologicalIndex::new(&m, &id("Root")).unwrap();
        assert_eq!(index.recursive_shapes(), &[id("A"), id("B")]);
        assert!(index.needs_deferred_reference(&id("A")));
        assert!(!index.needs_deferred_reference(&id("Leaf")));
        // Root references A, which is emitted later
        assert!(position(&index, "Root") < position(&index, "A"));
    }

    #[test]
    fn self_reference_through_collection() {
        let node = id("Node");
        let list = Shape::new(
            id("NodeList"),
            ShapeKind::List(ListOrSet { member: Member::new(id("NodeList").with_member("member"), node) }),
        );
        let m = model(vec![structure("Node", &["NodeList"]), list]);
        let index = TopologicalIndex::new(&m, &id("Node")).unwrap();
        assert!(index.is_recursive(&id("Node")));
        assert!(index.is_recursive(&id("NodeList")));

        let m = model(vec![structure("Tree", &["Tree"])]);
        let index = TopologicalIndex::new(&m, &id("Tree")).unwrap();
        assert_eq!(index.recursive_shapes(), &[id("Tree")]);
    }

    #[test]
    fn unreachable_shapes_are_dropped() {
        let m = model(vec![structure("Root", &[]), structure("Orphan", &[])]);
        let index = TopologicalIndex::new(&m, &id("Root")).unwrap();
        assert_eq!(index.emission_order().collect::<Vec<_>>(), vec![&id("Root")]);
    }

    #[test]
    fn missing_root_is_fatal() {
        let m = model(vec![]);
        assert!(matches!(TopologicalIndex::new(&m, &id("Root")), Err(Error::ShapeNotFound(_))));
    }

    fn graph_model(n: usize, edges: &[(usize, usize)]) -> Model {
        let names = (0..n).map(|i| format!("S{}", i)).collect::<Vec<_>>();
        let mut shapes = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let targets = edges
                .iter()
                .filter(|(from, _)| *from == i)
                .map(|(_, to)| names[*to].as_str())
                .collect::<Vec<_>>();
            shapes.push(structure(name, &targets));
        }
        shapes.push(structure("Root", &names.iter().map(String::as_str).collect::<Vec<_>>()));
        model(shapes)
    }

    proptest! {
        #[test]
        fn order_respects_dependencies(
            (n, edges) in (1usize..12).prop_flat_map(|n| {
                (Just(n), proptest::collection::vec((0..n, 0..n), 0..30))
            })
        ) {
            let m = graph_model(n, &edges);
            let index = TopologicalIndex::new(&m, &id("Root")).unwrap();
            let order = index.emission_order().cloned().collect::<Vec<_>>();
            prop_assert_eq!(order.len(), n + 1);

            let first_recursive = index.ordered_shapes().len();
            for (from, to) in edges.iter() {
                let (from, to) = (id(&format!("S{}", from)), id(&format!("S{}", to)));
                let pf = order.iter().position(|s| s == &from).unwrap();
                let pt = order.iter().position(|s| s == &to).unwrap();
                if !index.is_recursive(&to) {
                    prop_assert!(pt < pf);
                } else {
                    prop_assert!(pt >= first_recursive);
                }
                if from == to {
                    prop_assert!(index.is_recursive(&from));
                }
            }
            // recursive shapes come after all non-recursive ones
            for (pos, s) in order.iter().enumerate() {
                prop_assert_eq!(index.is_recursive(s), pos >= first_recursive);
            }

            // same input, same output
            let again = TopologicalIndex::new(&m, &id("Root")).unwrap();
            prop_assert_eq!(order, again.emission_order().cloned().collect::<Vec<_>>());
        }
    }
}
