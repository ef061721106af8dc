use crate::descriptor::IndexDescriptor;
use crate::engine::IndexEngine;
use crate::error::Result;
use crate::mapping::MappingNode;
use crate::types::{BulkAction, BulkOptions, BulkResponse};
use serde_json::{json, Map, Value};

/// `{<type>: <mapping>}`, the shape both create and put-mapping expect.
fn typed_mapping(descriptor: &IndexDescriptor, mapping: &MappingNode) -> Value {
    let mut complete = Map::new();
    complete.insert(descriptor.type_name.clone(), mapping.to_json());
    Value::Object(complete)
}

/// Make sure the index exists and carries `mapping` for the descriptor's type.
///
/// An existing index gets a put-mapping (merged by the engine, other types and
/// fields are left alone); a missing one is created with the mapping in a
/// single call. Engine errors come back unchanged.
pub async fn ensure_index(
    engine: &dyn IndexEngine,
    descriptor: &IndexDescriptor,
    mapping: &MappingNode,
) -> Result<Value> {
    let complete = typed_mapping(descriptor, mapping);

    if engine.index_exists(&descriptor.index).await? {
        tracing::debug!(
            "[LIFECYCLE {}] index exists, putting mapping for type {}",
            descriptor.index,
            descriptor.type_name
        );
        engine
            .put_mapping(&descriptor.index, &descriptor.type_name, &complete)
            .await
    } else {
        tracing::info!("[LIFECYCLE {}] creating index", descriptor.index);
        engine
            .create_index(&descriptor.index, &json!({ "mappings": complete }))
            .await
    }
}

/// Drop the index and build it again from `mapping`.
///
/// Destructive and unguarded: anything searching the index sees it vanish.
pub async fn recreate_index(
    engine: &dyn IndexEngine,
    descriptor: &IndexDescriptor,
    mapping: &MappingNode,
) -> Result<Value> {
    tracing::warn!("[LIFECYCLE {}] deleting index", descriptor.index);
    engine.delete_index(&descriptor.index).await?;
    ensure_index(engine, descriptor, mapping).await
}

/// Delete every document of the descriptor's type, leaving the index and its
/// mapping in place.
///
/// Works in batches of at most `batch_size` hits so neither the search nor
/// the bulk request outgrows the engine's result window. Every batch except
/// the last is refreshed so the next search doesn't return deleted hits.
/// Stops early when a batch has rejected deletes, since those documents would
/// come back on the next search. Nothing is sent when the type is empty.
pub async fn clear_type(
    engine: &dyn IndexEngine,
    descriptor: &IndexDescriptor,
    batch_size: u64,
    refresh: bool,
) -> Result<BulkResponse> {
    let total = engine
        .count(&descriptor.index, &descriptor.type_name, None)
        .await?;
    let mut cleared = BulkResponse::default();
    if total == 0 {
        return Ok(cleared);
    }
    let batch_size = batch_size.max(1);

    tracing::info!(
        "[LIFECYCLE {}] clearing {} documents of type {}",
        descriptor.index,
        total,
        descriptor.type_name
    );
    while (cleared.items.len() as u64) < total {
        let body = json!({
            "query": {"type": {"value": descriptor.type_name}},
            "size": batch_size,
            "_source": false
        });
        let results = engine.search(&descriptor.index, &body).await?;
        if results.hits.is_empty() {
            break;
        }
        let last = (results.hits.len() as u64) < batch_size
            || cleared.items.len() as u64 + results.hits.len() as u64 >= total;
        let actions: Vec<BulkAction> = results
            .hits
            .iter()
            .map(|hit| BulkAction::Delete {
                index: descriptor.index.clone(),
                type_name: descriptor.type_name.clone(),
                id: hit.id.clone(),
            })
            .collect();

        let batch = engine
            .bulk(
                &actions,
                BulkOptions {
                    refresh: refresh || !last,
                },
            )
            .await?;
        tracing::debug!(
            "[LIFECYCLE {}] deleted batch of {} ({} rejected)",
            descriptor.index,
            batch.items.len(),
            batch.failed_count()
        );
        let rejected = batch.failed_count() > 0 || batch.errors;
        cleared.took_ms += batch.took_ms;
        cleared.errors |= batch.errors;
        cleared.items.extend(batch.items);
        if rejected || last {
            break;
        }
    }
    Ok(cleared)
}
