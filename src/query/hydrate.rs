use crate::error::Result;
use crate::store::DocumentStore;
use crate::types::{HitSource, QueryModifiers, SearchResults};
use std::collections::HashMap;

/// Swap raw hit fields for the authoritative records from the primary store.
///
/// Rank order is untouched. A hit whose record the store no longer has stays
/// in its slot as [`HitSource::Raw`]; see [`SearchResults::unhydrated_ids`].
/// `modifiers` go to the store verbatim. A store failure fails the call.
pub async fn hydrate(
    mut results: SearchResults,
    store: &dyn DocumentStore,
    modifiers: &QueryModifiers,
) -> Result<SearchResults> {
    if results.hits.is_empty() {
        return Ok(results);
    }

    // id -> every slot holding it (an engine can return the same id from
    // several indices)
    let mut positions: HashMap<String, Vec<usize>> = HashMap::with_capacity(results.hits.len());
    let mut ids = Vec::with_capacity(results.hits.len());
    for (i, hit) in results.hits.iter().enumerate() {
        let slots = positions.entry(hit.id.clone()).or_default();
        if slots.is_empty() {
            ids.push(hit.id.clone());
        }
        slots.push(i);
    }

    let records = store.find_by_ids(&ids, modifiers).await?;

    for record in records {
        let id = match record.id() {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!("[HYDRATE] store returned a record without id: {}", e);
                continue;
            }
        };
        if let Some(slots) = positions.get(&id) {
            for &i in slots {
                results.hits[i].source = HitSource::Hydrated(record.clone());
            }
        }
    }

    Ok(results)
}
