use crate::error::{StoreError, StoreResult};
use crate::lm::{VisionExtractor, MAX_VISION_PHOTOS};
use crate::store::{DealStore, InputSet, WorkflowKind};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::info;

/// Extract property facts from the deal's photos into the CMA input set's
/// `vision` field. Other CMA inputs are kept.
pub fn extract_vision(
    store: &DealStore,
    deal_id: &str,
    extractor: &dyn VisionExtractor,
    instructions: &str,
) -> StoreResult<InputSet> {
    let kind = WorkflowKind::Cma;
    let deal = store.get_deal(deal_id)?;
    let photos = store.list_photos(deal_id)?;
    if photos.is_empty() {
        return Err(StoreError::InvalidInput {
            kind,
            message: "the deal has no photos; add some with `photos` first".to_string(),
        });
    }
    let sent = &photos[..photos.len().min(MAX_VISION_PHOTOS)];

    let started = Instant::now();
    let facts = extractor
        .extract(sent, instructions, &deal.record.address)
        .map_err(|err| StoreError::ExternalCall {
            kind,
            message: format!("vision extraction: {err:#}"),
        })?;
    if !facts.is_object() {
        return Err(StoreError::ExternalCall {
            kind,
            message: "vision extraction did not return a JSON object".to_string(),
        });
    }

    let saved = store.update_workflow_input(deal_id, kind, |mut payload| {
        match payload.as_object_mut() {
            Some(map) => {
                map.insert("vision".to_string(), facts);
            }
            None => payload = json!({ "vision": facts }),
        }
        Ok(payload)
    })?;
    info!(
        deal = %deal_id,
        photos = sent.len(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        revision = saved.revision,
        "merged vision facts"
    );
    Ok(saved)
}

/// Vision facts recorded in a CMA input set, if any.
pub fn vision_facts(inputs: &Value) -> Option<&Value> {
    inputs.get("vision").filter(|facts| !facts.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewDeal;
    use anyhow::{anyhow, Result};
    use std::fs;
    use std::path::PathBuf;

    fn store_with_photos(count: usize) -> (tempfile::TempDir, DealStore, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DealStore::open(dir.path().join("deals")).unwrap();
        let deal = store.create_deal(NewDeal::new("42 Smith St")).unwrap();
        let sources: Vec<PathBuf> = (0..count)
            .map(|n| {
                let path = dir.path().join(format!("photo{n:02}.jpg"));
                fs::write(&path, b"jpeg").unwrap();
                path
            })
            .collect();
        store.add_photos(deal.id(), &sources).unwrap();
        let id = deal.id().to_string();
        (dir, store, id)
    }

    #[test]
    fn facts_merge_into_cma_inputs() {
        let (_dir, store, id) = store_with_photos(2);
        store
            .save_workflow_input(&id, WorkflowKind::Cma, json!({"comps": [{"address": "1 A St"}]}))
            .unwrap();
        let extractor = |photos: &[PathBuf], _: &str, address: &str| -> Result<Value> {
            Ok(json!({"bedrooms": 3, "photos": photos.len(), "address": address}))
        };
        let saved = extract_vision(&store, &id, &Closure(extractor), "describe").unwrap();
        assert_eq!(saved.revision, 2);
        assert_eq!(saved.payload["comps"][0]["address"], "1 A St");
        assert_eq!(saved.payload["vision"]["photos"], 2);
        assert_eq!(saved.payload["vision"]["address"], "42 Smith St");
    }

    #[test]
    fn at_most_twenty_photos_are_sent() {
        let (_dir, store, id) = store_with_photos(MAX_VISION_PHOTOS + 3);
        let extractor = |photos: &[PathBuf], _: &str, _: &str| -> Result<Value> {
            Ok(json!({"sent": photos.len()}))
        };
        let saved = extract_vision(&store, &id, &Closure(extractor), "").unwrap();
        assert_eq!(saved.payload["vision"]["sent"], MAX_VISION_PHOTOS);
    }

    #[test]
    fn no_photos_is_invalid_input() {
        let (_dir, store, id) = store_with_photos(0);
        let extractor = |_: &[PathBuf], _: &str, _: &str| -> Result<Value> { Ok(json!({})) };
        let err = extract_vision(&store, &id, &Closure(extractor), "").unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput { kind: WorkflowKind::Cma, .. }));
    }

    #[test]
    fn extractor_failure_leaves_inputs_alone() {
        let (_dir, store, id) = store_with_photos(1);
        let extractor =
            |_: &[PathBuf], _: &str, _: &str| -> Result<Value> { Err(anyhow!("quota exceeded")) };
        let err = extract_vision(&store, &id, &Closure(extractor), "").unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("quota exceeded"));
        assert!(store.get_deal(&id).unwrap().input(WorkflowKind::Cma).is_none());
    }

    struct Closure<F>(F);

    impl<F> VisionExtractor for Closure<F>
    where
        F: Fn(&[PathBuf], &str, &str) -> Result<Value>,
    {
        fn extract(&self, photos: &[PathBuf], instructions: &str, address: &str) -> Result<Value> {
            (self.0)(photos, instructions, address)
        }
    }

    #[test]
    fn vision_facts_ignores_null() {
        assert!(vision_facts(&json!({"vision": null})).is_none());
        assert_eq!(vision_facts(&json!({"vision": {"a": 1}})), Some(&json!({"a": 1})));
    }
}
