//! Action history cleanup.

use tracing::debug;

use crate::types::api::ApiMatterHistory;

/// Sort by `timestamp` and drop entries whose `key` equals the key of the
/// entry kept just before them. The sort is stable, so same-time entries
/// keep their input order.
pub fn dedupe_adjacent<T, S, K, FS, FK>(mut items: Vec<T>, timestamp: FS, key: FK) -> Vec<T>
where
    S: Ord,
    K: PartialEq,
    FS: Fn(&T) -> S,
    FK: Fn(&T) -> K,
{
    items.sort_by_key(|item| timestamp(item));

    let mut kept: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if let Some(previous) = kept.last() {
            if key(previous) == key(&item) {
                continue;
            }
        }
        kept.push(item);
    }
    kept
}

/// History entries with a date, an action name and an acting body, names
/// trimmed, sorted by date, adjacent repeats removed.
pub fn clean_history(history: Vec<ApiMatterHistory>) -> Vec<ApiMatterHistory> {
    let total = history.len();
    let usable: Vec<ApiMatterHistory> = history
        .into_iter()
        .filter_map(|mut entry| {
            let name = entry.matter_history_action_name.as_deref()?.trim().to_string();
            let body = entry.matter_history_action_body_name.as_deref()?.trim().to_string();
            entry.matter_history_action_date.as_ref()?;
            if name.is_empty() || body.is_empty() {
                return None;
            }
            entry.matter_history_action_name = Some(name);
            entry.matter_history_action_body_name = Some(body);
            Some(entry)
        })
        .collect();

    let cleaned = dedupe_adjacent(
        usable,
        |e| e.matter_history_action_date.clone(),
        |e| {
            (
                e.matter_history_action_name.clone(),
                e.matter_history_action_body_name.clone(),
            )
        },
    );
    if cleaned.len() != total {
        debug!(before = total, after = cleaned.len(), "Dropped incomplete or repeated history");
    }
    cleaned
}
