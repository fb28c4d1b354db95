//! Revision counter.
//!
//! Every invalidation advances the revision. Nodes remember the revision in
//! which their value last actually changed and the revision at which they
//! were last confirmed up to date; comparing the two is how a node that was
//! only *possibly* affected decides whether it must recompute.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Revision(pub u64);

impl Revision {
    pub const ZERO: Self = Self(0);
}

#[derive(Debug, Default)]
pub struct RevisionCounter {
    current: u64,
}

impl RevisionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Revision {
        Revision(self.current)
    }

    /// Start a new revision and return it.
    pub fn advance(&mut self) -> Revision {
        self.current += 1;
        Revision(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revisions_increase() {
        let mut counter = RevisionCounter::new();
        assert_eq!(counter.current(), Revision::ZERO);
        let first = counter.advance();
        let second = counter.advance();
        assert!(second > first);
        assert_eq!(counter.current(), second);
    }
}
