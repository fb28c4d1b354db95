use super::dependency::DependencySpec;
use super::inverse::{ArrayInverseContext, InverseInstruction};
use super::values::{DependencyValues, DeterminingValues};
use super::{DependenciesFn, Definition};
use crate::value::Value;
use std::sync::Arc;

pub type SizeFn = Arc<dyn Fn(&DependencyValues) -> Vec<usize> + Send + Sync>;
pub type KeyDependenciesFn = Arc<dyn Fn(usize, &[usize], &DeterminingValues) -> DependencySpec + Send + Sync>;
pub type KeyDefinitionFn = Arc<dyn Fn(&EntryContext<'_>) -> Definition + Send + Sync>;
pub type KeyDefaultFn = Arc<dyn Fn(usize, &DependencyValues) -> Value + Send + Sync>;
pub type ArrayInverseFn =
    Arc<dyn Fn(&mut ArrayInverseContext<'_>) -> Result<Vec<InverseInstruction>, String> + Send + Sync>;

/// Inputs of one entry's definition.
pub struct EntryContext<'a> {
    /// Flat row-major key.
    pub key: usize,
    pub shape: &'a [usize],
    pub global: &'a DependencyValues,
    pub dependencies: &'a DependencyValues,
}

impl EntryContext<'_> {
    /// Row and column of a two-dimensional key.
    pub fn row_column(&self) -> (usize, usize) {
        let columns = self.shape.get(1).copied().unwrap_or(1).max(1);
        (self.key / columns, self.key % columns)
    }
}

/// An array-valued state variable.
///
/// Size comes first and only from the size dependencies. Each entry then
/// resolves on its own from the global dependencies plus its per-key
/// dependencies, so reading one key never evaluates the others.
#[derive(Clone)]
pub struct ArrayDef {
    pub dimensions: usize,
    pub size_dependencies: DependenciesFn,
    pub size: SizeFn,
    pub global_dependencies: DependenciesFn,
    pub dependencies_by_key: KeyDependenciesFn,
    pub definition_by_key: KeyDefinitionFn,
    pub inverse_by_key: Option<ArrayInverseFn>,
    pub default_by_key: KeyDefaultFn,
    /// `x` makes entries addressable as `x1`, `x2`; two-dimensional
    /// arrays use `vertex2_1`.
    pub entry_prefix: Option<String>,
}

impl ArrayDef {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            size_dependencies: Arc::new(|_| DependencySpec::new()),
            size: Arc::new(|_| vec![0]),
            global_dependencies: Arc::new(|_| DependencySpec::new()),
            dependencies_by_key: Arc::new(|_, _, _| DependencySpec::new()),
            definition_by_key: Arc::new(|_| Definition::use_default()),
            inverse_by_key: None,
            default_by_key: Arc::new(|_, _| Value::Null),
            entry_prefix: None,
        }
    }

    pub fn size_dependencies(
        mut self,
        f: impl Fn(&DeterminingValues) -> DependencySpec + Send + Sync + 'static,
    ) -> Self {
        self.size_dependencies = Arc::new(f);
        self
    }

    pub fn size(mut self, f: impl Fn(&DependencyValues) -> Vec<usize> + Send + Sync + 'static) -> Self {
        self.size = Arc::new(f);
        self
    }

    pub fn global_dependencies(
        mut self,
        f: impl Fn(&DeterminingValues) -> DependencySpec + Send + Sync + 'static,
    ) -> Self {
        self.global_dependencies = Arc::new(f);
        self
    }

    pub fn dependencies_by_key(
        mut self,
        f: impl Fn(usize, &[usize], &DeterminingValues) -> DependencySpec + Send + Sync + 'static,
    ) -> Self {
        self.dependencies_by_key = Arc::new(f);
        self
    }

    pub fn definition_by_key(
        mut self,
        f: impl Fn(&EntryContext<'_>) -> Definition + Send + Sync + 'static,
    ) -> Self {
        self.definition_by_key = Arc::new(f);
        self
    }

    pub fn inverse_by_key(
        mut self,
        f: impl Fn(&mut ArrayInverseContext<'_>) -> Result<Vec<InverseInstruction>, String>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.inverse_by_key = Some(Arc::new(f));
        self
    }

    pub fn default_by_key(mut self, f: impl Fn(usize, &DependencyValues) -> Value + Send + Sync + 'static) -> Self {
        self.default_by_key = Arc::new(f);
        self
    }

    pub fn entry_prefix(mut self, prefix: &str) -> Self {
        self.entry_prefix = Some(prefix.to_string());
        self
    }

    /// Total number of entries for a shape.
    pub fn flat_len(shape: &[usize]) -> usize {
        shape.iter().fold(1, |len, dim| len.saturating_mul(*dim))
    }

    /// Shrink `shape` so it holds at most `limit` entries, trimming later
    /// dimensions only when earlier ones leave no room. Returns whether
    /// anything was cut.
    pub fn clamp_shape(shape: &mut [usize], limit: usize) -> bool {
        let mut room = limit;
        let mut clamped = false;
        for dim in shape.iter_mut() {
            if *dim > room {
                *dim = room;
                clamped = true;
            }
            if *dim == 0 {
                break;
            }
            room /= *dim;
        }
        clamped
    }

    /// Parses `x2` or `vertex3_1` into 1-based indices.
    pub fn parse_entry_name(&self, name: &str) -> Option<Vec<usize>> {
        let rest = name.strip_prefix(self.entry_prefix.as_deref()?)?;
        let indices: Option<Vec<usize>> = rest
            .split('_')
            .map(|part| part.parse::<usize>().ok().filter(|index| *index > 0))
            .collect();
        indices.filter(|indices| indices.len() == self.dimensions)
    }

    /// Nest flat entries into rows for two-dimensional shapes.
    pub fn shape_value(shape: &[usize], entries: Vec<Value>) -> Value {
        match shape {
            [_, columns] if *columns > 0 => {
                let rows = entries
                    .chunks(*columns)
                    .map(|row| Value::array(row.iter().cloned()))
                    .collect::<Vec<_>>();
                Value::array(rows)
            }
            _ => Value::array(entries),
        }
    }

    /// Flatten a whole-array value back into entries.
    pub fn flatten_value(value: &Value) -> Option<Vec<Value>> {
        let items = value.as_array()?;
        let mut flat = Vec::new();
        for item in items {
            match item.as_array() {
                Some(row) => flat.extend(row.iter().cloned()),
                None => flat.push(item.clone()),
            }
        }
        Some(flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_names() {
        let points = ArrayDef::new(1).entry_prefix("x");
        assert_eq!(points.parse_entry_name("x2"), Some(vec![2]));
        assert_eq!(points.parse_entry_name("x0"), None);
        assert_eq!(points.parse_entry_name("y2"), None);

        let vertices = ArrayDef::new(2).entry_prefix("vertex");
        assert_eq!(vertices.parse_entry_name("vertex3_1"), Some(vec![3, 1]));
        assert_eq!(vertices.parse_entry_name("vertex3"), None);
    }

    #[test]
    fn oversized_shapes_are_clamped() {
        let mut rows = vec![usize::MAX];
        assert!(ArrayDef::clamp_shape(&mut rows, 50));
        assert_eq!(rows, vec![50]);

        let mut grid = vec![30, 4];
        assert!(ArrayDef::clamp_shape(&mut grid, 50));
        assert_eq!(grid, vec![30, 1]);

        let mut empty = vec![0, 2];
        assert!(!ArrayDef::clamp_shape(&mut empty, 50));
        assert_eq!(empty, vec![0, 2]);
        assert_eq!(ArrayDef::flat_len(&[usize::MAX, 2]), usize::MAX);
    }

    #[test]
    fn shaping_round_trips() {
        let flat: Vec<Value> = (0..6).map(|n| Value::Number(n as f64)).collect();
        let shaped = ArrayDef::shape_value(&[3, 2], flat.clone());
        assert_eq!(shaped.as_array().map(<[Value]>::len), Some(3));
        let back = ArrayDef::flatten_value(&shaped).unwrap();
        assert!(Value::array(back).same_as(&Value::array(flat)));
    }
}
