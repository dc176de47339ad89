use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Iterator merging several slices that are each sorted by `key` into one
/// ascending sequence. Ties go to the lower lane index.
pub struct MergeByKey<'a, T, K, F>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    lanes: Vec<&'a [T]>,
    cursors: Vec<usize>,
    heap: BinaryHeap<Reverse<(K, usize)>>,
    key: F,
}

pub fn merge_by_key<'a, T, K, F, I>(lanes: I, key: F) -> MergeByKey<'a, T, K, F>
where
    K: Ord,
    F: Fn(&T) -> K,
    I: IntoIterator<Item = &'a [T]>,
{
    let lanes: Vec<&'a [T]> = lanes.into_iter().collect();
    let mut heap = BinaryHeap::with_capacity(lanes.len());
    for (i, lane) in lanes.iter().enumerate() {
        if let Some(first) = lane.first() {
            heap.push(Reverse((key(first), i)));
        }
    }
    MergeByKey {
        cursors: vec![0; lanes.len()],
        lanes,
        heap,
        key,
    }
}

impl<'a, T, K, F> Iterator for MergeByKey<'a, T, K, F>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let Reverse((_, lane)) = self.heap.pop()?;
        let lane_items = self.lanes[lane];
        let item = &lane_items[self.cursors[lane]];
        self.cursors[lane] += 1;
        if let Some(next) = lane_items.get(self.cursors[lane]) {
            self.heap.push(Reverse(((self.key)(next), lane)));
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining: usize = self
            .lanes
            .iter()
            .zip(&self.cursors)
            .map(|(lane, cursor)| lane.len() - cursor)
            .sum();
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sorted_lanes() {
        let a = vec![1, 4, 9];
        let b: Vec<i32> = vec![];
        let c = vec![2, 3, 10, 11];
        let merged: Vec<i32> = merge_by_key([&a[..], &b[..], &c[..]], |v| *v)
            .copied()
            .collect();
        assert_eq!(merged, vec![1, 2, 3, 4, 9, 10, 11]);
    }

    #[test]
    fn test_ties_prefer_earlier_lane() {
        let a = vec![(5, 'a')];
        let b = vec![(5, 'b')];
        let merged: Vec<char> = merge_by_key([&b[..], &a[..]], |v| v.0)
            .map(|v| v.1)
            .collect();
        assert_eq!(merged, vec!['b', 'a']);
    }
}
