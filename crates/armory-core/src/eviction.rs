//! Shared eviction strategies. Every bounded table in the kernel ranks its
//! entries by a strictly monotonic last-access stamp and sheds the oldest
//! batch; the two strategies differ only in how much of the table they are
//! willing to look at per call.

/// Pick up to `batch` keys with the smallest access stamps, ranking the
/// whole table. O(n log n), used where tables stay modest.
///
/// Ties break by key so repeated calls over identical state agree.
pub fn oldest_in_full_order<K: Ord + Clone>(
    entries: impl Iterator<Item = (K, u64)>,
    batch: usize,
) -> Vec<K> {
    if batch == 0 {
        return Vec::new();
    }
    let mut ranked: Vec<(u64, K)> = entries.map(|(key, stamp)| (stamp, key)).collect();
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    ranked.truncate(batch);
    ranked.into_iter().map(|(_, key)| key).collect()
}

/// Pick up to `batch` keys with the smallest access stamps among a bounded
/// window of `4 * batch` entries, in the table's iteration order.
///
/// Eviction only needs to keep the table roughly bounded, so ranking a
/// sample instead of everything keeps per-call cost flat on large tables.
pub fn oldest_in_sample<K: Ord + Clone>(
    entries: impl Iterator<Item = (K, u64)>,
    batch: usize,
) -> Vec<K> {
    if batch == 0 {
        return Vec::new();
    }
    let window = batch.saturating_mul(4);
    oldest_in_full_order(entries.take(window), batch)
}
