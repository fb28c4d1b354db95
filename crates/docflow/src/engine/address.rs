use super::arena::ComponentId;
use serde::{Deserialize, Serialize};

/// Index of a state variable in its component's variable table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct VarId(pub u16);

/// Which part of a state variable a node stands for.
/// Scalar variables only ever have `Whole`. Array variables also get a
/// `Size` node and one `Entry` node per requested flat key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum NodePart {
    Whole,
    Size,
    Entry(usize),
}

/// Address of one node in the dependency graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct NodeKey {
    pub component: ComponentId,
    pub variable: VarId,
    pub part: NodePart,
}

impl NodeKey {
    pub fn whole(component: ComponentId, variable: VarId) -> Self {
        Self {
            component,
            variable,
            part: NodePart::Whole,
        }
    }

    pub fn size(component: ComponentId, variable: VarId) -> Self {
        Self {
            component,
            variable,
            part: NodePart::Size,
        }
    }

    pub fn entry(component: ComponentId, variable: VarId, key: usize) -> Self {
        Self {
            component,
            variable,
            part: NodePart::Entry(key),
        }
    }

    pub fn with_part(self, part: NodePart) -> Self {
        Self { part, ..self }
    }

    pub fn var(&self) -> (ComponentId, VarId) {
        (self.component, self.variable)
    }
}

/// Flat row-major key for an entry of a shaped array.
pub fn flat_key(shape: &[usize], indices: &[usize]) -> Option<usize> {
    if shape.len() != indices.len() {
        return None;
    }
    let mut key = 0;
    for (dim, index) in shape.iter().zip(indices) {
        if index >= dim {
            return None;
        }
        key = key * dim + index;
    }
    Some(key)
}

/// Inverse of `flat_key`.
pub fn unflatten_key(shape: &[usize], mut key: usize) -> Vec<usize> {
    let mut indices = vec![0; shape.len()];
    for (slot, dim) in indices.iter_mut().zip(shape).rev() {
        if *dim == 0 {
            continue;
        }
        *slot = key % dim;
        key /= dim;
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_keys_are_row_major() {
        let shape = [3, 2];
        assert_eq!(flat_key(&shape, &[0, 0]), Some(0));
        assert_eq!(flat_key(&shape, &[1, 0]), Some(2));
        assert_eq!(flat_key(&shape, &[2, 1]), Some(5));
        assert_eq!(flat_key(&shape, &[3, 0]), None);
        assert_eq!(unflatten_key(&shape, 5), vec![2, 1]);
        assert_eq!(unflatten_key(&[100], 3), vec![3]);
    }

    #[test]
    fn node_key_parts() {
        let id = ComponentId {
            index: 4,
            generation: 1,
        };
        let whole = NodeKey::whole(id, VarId(2));
        assert_eq!(whole.with_part(NodePart::Entry(7)), NodeKey::entry(id, VarId(2), 7));
        assert_eq!(whole.var(), (id, VarId(2)));
    }
}
