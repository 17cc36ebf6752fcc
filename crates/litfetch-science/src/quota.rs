use std::collections::{HashMap, VecDeque};

use litfetch_core::Record;
use tracing::debug;

use crate::dedup::{ProviderPreference, provider_key};

/// Round-robin trim of `records` down to `limit`, interleaving providers so a
/// high-volume provider cannot crowd out the others.
///
/// Records are bucketed by `source_provider` (case-insensitive). Buckets are
/// visited in preference order, then unlisted providers in first-seen order.
/// Inside a bucket the input order is kept.
pub fn balanced_trim(records: Vec<Record>, limit: usize, preference: &ProviderPreference) -> Vec<Record> {
    if records.len() <= limit {
        return records;
    }

    let mut first_seen: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, VecDeque<Record>> = HashMap::new();
    for record in records {
        let key = provider_key(&record.source_provider);
        if !buckets.contains_key(&key) {
            first_seen.push(key.clone());
        }
        buckets.entry(key).or_default().push_back(record);
    }

    let visit_order = |buckets: &HashMap<String, VecDeque<Record>>| -> VecDeque<String> {
        let mut order: VecDeque<String> = preference
            .as_slice()
            .iter()
            .filter(|key| buckets.get(*key).is_some_and(|b| !b.is_empty()))
            .cloned()
            .collect();
        for key in &first_seen {
            if !order.contains(key) && buckets.get(key).is_some_and(|b| !b.is_empty()) {
                order.push_back(key.clone());
            }
        }
        order
    };

    let mut active = visit_order(&buckets);
    let mut kept = Vec::with_capacity(limit);

    while kept.len() < limit {
        let Some(key) = active.pop_front() else {
            active = visit_order(&buckets);
            if active.is_empty() {
                break;
            }
            continue;
        };
        let Some(bucket) = buckets.get_mut(&key) else {
            continue;
        };
        if let Some(record) = bucket.pop_front() {
            kept.push(record);
        }
        if !bucket.is_empty() {
            active.push_back(key);
        }
    }

    debug!(
        kept = kept.len(),
        dropped = buckets.values().map(VecDeque::len).sum::<usize>(),
        "balanced trim finished"
    );
    kept
}
