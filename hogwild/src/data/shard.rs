use std::ops::Range;

/// Splits `total` rows among `nodes` and returns the partition owned by `node`.
///
/// Ranges are contiguous, disjoint and cover `[0..total)`, their sizes differ by at most 1.
pub fn shard_range(total: usize, node: usize, nodes: usize) -> Range<usize> {
    assert!(nodes > 0);
    assert!(node < nodes);

    let base = total / nodes;
    let rem = total % nodes;

    let start = node * base + node.min(rem);
    let extra = usize::from(node < rem);
    let end = start + base + extra;

    start..end
}

/// The part of `chunk` that falls inside `partition`, `None` if they don't overlap.
pub fn intersect(chunk: Range<usize>, partition: &Range<usize>) -> Option<Range<usize>> {
    let start = chunk.start.max(partition.start);
    let end = chunk.end.min(partition.end);
    (start < end).then_some(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced() {
        // total 10, nodes 3 => sizes 4,3,3
        assert_eq!(shard_range(10, 0, 3), 0..4);
        assert_eq!(shard_range(10, 1, 3), 4..7);
        assert_eq!(shard_range(10, 2, 3), 7..10);
    }

    #[test]
    fn fewer_rows_than_nodes() {
        assert_eq!(shard_range(2, 0, 3), 0..1);
        assert_eq!(shard_range(2, 1, 3), 1..2);
        assert_eq!(shard_range(2, 2, 3), 2..2);
    }

    #[test]
    fn intersections() {
        let partition = 4..7;
        assert_eq!(intersect(0..5, &partition), Some(4..5));
        assert_eq!(intersect(5..6, &partition), Some(5..6));
        assert_eq!(intersect(7..9, &partition), None);
    }
}
