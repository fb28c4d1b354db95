use crate::component::serialized::SerializedComponent;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReplacementChange {
    /// Positions `start..start + count` were rebuilt in place.
    Replace { start: usize, count: usize },
    Add { start: usize, count: usize },
    Remove { start: usize, count: usize },
}

/// Positional diff between two replacement lists.
///
/// Replacements generated by one composite are keyed by position (their
/// names and links carry the index), so positions that compare equal are
/// kept, differing positions are replaced and only the tail grows or
/// shrinks.
pub fn calculate_replacement_changes(
    old: &[SerializedComponent],
    new: &[SerializedComponent],
) -> Vec<ReplacementChange> {
    let mut changes = Vec::new();
    let shared = old.len().min(new.len());
    let mut run: Option<(usize, usize)> = None;
    for index in 0..shared {
        if old[index] == new[index] {
            if let Some((start, count)) = run.take() {
                changes.push(ReplacementChange::Replace { start, count });
            }
            continue;
        }
        run = match run {
            Some((start, count)) => Some((start, count + 1)),
            None => Some((index, 1)),
        };
    }
    if let Some((start, count)) = run {
        changes.push(ReplacementChange::Replace { start, count });
    }
    if new.len() > shared {
        changes.push(ReplacementChange::Add {
            start: shared,
            count: new.len() - shared,
        });
    }
    if old.len() > shared {
        changes.push(ReplacementChange::Remove {
            start: shared,
            count: old.len() - shared,
        });
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(values: &[&str]) -> Vec<SerializedComponent> {
        values
            .iter()
            .map(|value| SerializedComponent::new("number").text(value))
            .collect()
    }

    #[test]
    fn identical_lists_need_nothing() {
        let list = numbers(&["1", "2"]);
        assert!(calculate_replacement_changes(&list, &list).is_empty());
    }

    #[test]
    fn growing_by_one_is_one_add() {
        let changes = calculate_replacement_changes(&numbers(&["1", "2"]), &numbers(&["1", "2", "3"]));
        assert_eq!(changes, vec![ReplacementChange::Add { start: 2, count: 1 }]);
    }

    #[test]
    fn shrinking_removes_the_tail() {
        let changes = calculate_replacement_changes(&numbers(&["1", "2", "3"]), &numbers(&["1"]));
        assert_eq!(changes, vec![ReplacementChange::Remove { start: 1, count: 2 }]);
    }

    #[test]
    fn differing_positions_coalesce_into_runs() {
        let changes = calculate_replacement_changes(
            &numbers(&["1", "2", "3", "4"]),
            &numbers(&["1", "x", "y", "4", "5"]),
        );
        assert_eq!(
            changes,
            vec![
                ReplacementChange::Replace { start: 1, count: 2 },
                ReplacementChange::Add { start: 4, count: 1 },
            ]
        );
    }
}
