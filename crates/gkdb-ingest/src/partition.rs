//! Order-preserving work partitioning

/// Split `items` into at most `bins` contiguous partitions
///
/// Partition sizes differ by at most one, larger partitions first. Fewer
/// than `bins` partitions are returned when there are fewer items than bins,
/// and none when `items` is empty. Concatenating the partitions in order
/// gives back `items`.
pub fn split_list<T>(items: Vec<T>, bins: usize) -> Vec<Vec<T>> {
    let total = items.len();
    let bins = bins.max(1).min(total);
    if bins == 0 {
        return Vec::new();
    }

    let base = total / bins;
    let extra = total % bins;

    let mut partitions = Vec::with_capacity(bins);
    let mut remaining = items.into_iter();
    for index in 0..bins {
        let size = base + usize::from(index < extra);
        partitions.push(remaining.by_ref().take(size).collect());
    }
    partitions
}

/// Split `items` into bundles of at most `bundle_size`, `ceil(len / size)` in total
pub fn bundles<T>(items: &[T], bundle_size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(bundle_size.max(1))
}
