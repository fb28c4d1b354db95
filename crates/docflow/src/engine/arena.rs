use serde::{Deserialize, Serialize};
use std::fmt;

/// Generational index of a live component.
/// A removed component's id stops resolving even after its slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId {
    pub index: u32,
    pub generation: u32,
}

impl ComponentId {
    pub const INVALID: Self = Self {
        index: u32::MAX,
        generation: 0,
    };

    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot allocator for component instances.
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    pub fn alloc(&mut self, value: T) -> ComponentId {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let entry = &mut self.entries[index as usize];
            entry.generation += 1;
            entry.value = Some(value);
            ComponentId {
                index,
                generation: entry.generation,
            }
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(Entry {
                generation: 0,
                value: Some(value),
            });
            ComponentId {
                index,
                generation: 0,
            }
        }
    }

    pub fn free(&mut self, id: ComponentId) -> Option<T> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let value = entry.value.take()?;
        self.free_list.push(id.index);
        self.len -= 1;
        Some(value)
    }

    pub fn is_valid(&self, id: ComponentId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: ComponentId) -> Option<&T> {
        let entry = self.entries.get(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.value.as_ref()
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut T> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.value.as_mut()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live ids in slot order.
    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            entry.value.as_ref().map(|_| ComponentId {
                index: index as u32,
                generation: entry.generation,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_alloc_and_free() {
        let mut arena = Arena::new();
        let a = arena.alloc("a");
        let b = arena.alloc("b");
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a), Some(&"a"));

        assert_eq!(arena.free(a), Some("a"));
        assert!(!arena.is_valid(a));
        assert_eq!(arena.get(b), Some(&"b"));
    }

    #[test]
    fn arena_generation_reuse() {
        let mut arena = Arena::new();
        let first = arena.alloc(1);
        arena.free(first);
        let second = arena.alloc(2);

        assert_eq!(first.index, second.index);
        assert_ne!(first.generation, second.generation);
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&2));
        assert_eq!(arena.free(first), None);
    }

    #[test]
    fn invalid_id() {
        let arena: Arena<u8> = Arena::new();
        assert!(!ComponentId::INVALID.is_valid());
        assert!(arena.get(ComponentId::INVALID).is_none());
    }
}
