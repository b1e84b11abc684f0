use super::*;
use crate::codec::PersistedEntry;
use crate::log::{InMemoryLog, LoggedItem};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn bucket(uid: ManifestUid, cids: &[u32]) -> BucketManifest {
    let collections: Vec<String> = cids
        .iter()
        .map(|cid| {
            let name = if *cid == 0 {
                "_default".to_string()
            } else {
                format!("c{cid}")
            };
            format!(r#"{{"name":"{name}","uid":"{cid:x}"}}"#)
        })
        .collect();
    let json = format!(
        r#"{{"uid":"{uid:x}","scopes":[{{"name":"_default","uid":"0","collections":[{}]}}]}}"#,
        collections.join(",")
    );
    BucketManifest::from_json(&json, 1000).unwrap()
}

fn events(log: &InMemoryLog) -> Vec<SystemEventItem> {
    log.pending_items()
        .into_iter()
        .filter_map(|item| match item {
            LoggedItem::SystemEvent(event) => Some(event),
            LoggedItem::Mutation { .. } => None,
        })
        .collect()
}

fn key(cid: u32) -> DocKey {
    DocKey::new(CollectionId::new(cid), "k")
}

fn check_invariants(manifest: &Manifest) {
    let deleting: Vec<&ManifestEntry> = manifest
        .entries()
        .map(|(_, entry)| entry)
        .filter(|entry| entry.is_deleting())
        .collect();
    assert_eq!(manifest.n_deleting_collections(), deleting.len());
    assert_eq!(
        manifest.greatest_end_seqno() == COLLECTION_OPEN_SEQNO,
        manifest.n_deleting_collections() == 0
    );
    for entry in deleting {
        assert!(entry.end_seqno() <= manifest.greatest_end_seqno());
    }
    let default_open = manifest
        .entry(CollectionId::DEFAULT)
        .is_some_and(ManifestEntry::is_open);
    assert_eq!(manifest.default_collection_exists(), default_open);
}

#[test]
fn test_from_empty() {
    let manifest = Manifest::new();
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest.manifest_uid(), 0);
    assert!(manifest.default_collection_exists());
    assert_eq!(manifest.greatest_end_seqno(), COLLECTION_OPEN_SEQNO);
    assert_eq!(manifest.n_deleting_collections(), 0);

    let entry = manifest.entry(CollectionId::DEFAULT).unwrap();
    assert_eq!(entry.start_seqno(), COLLECTION_OPEN_SEQNO);
    assert!(entry.is_open());
    assert!(manifest.does_key_contain_valid_collection(&DocKey::in_default("a")));
    assert!(!manifest.does_key_contain_valid_collection(&key(8)));
    check_invariants(&manifest);
}

#[test]
fn test_add_collection() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(1, &[0, 8])).unwrap();

    assert_eq!(manifest.manifest_uid(), 1);
    let entry = manifest.entry(CollectionId::new(8)).unwrap();
    assert_eq!(entry.start_seqno(), 1);
    assert_eq!(entry.end_seqno(), COLLECTION_OPEN_SEQNO);
    assert!(manifest.does_key_contain_valid_collection(&key(8)));

    let queued = events(&log);
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].event(), SystemEvent::Collection);
    assert!(!queued[0].is_deleted());
    assert_eq!(queued[0].by_seqno(), 1);

    // Re-applying the same manifest changes nothing
    manifest.update(&log, &bucket(1, &[0, 8])).unwrap();
    assert_eq!(events(&log).len(), 1);
    assert_eq!(manifest.manifest_uid(), 1);
    check_invariants(&manifest);
}

#[test]
fn test_empty_diff_keeps_uid() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(4, &[0])).unwrap();
    assert_eq!(manifest.manifest_uid(), 0);
    assert!(events(&log).is_empty());
}

#[test]
fn test_remove_collection_hides_items() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(1, &[0, 8])).unwrap();
    let item_seqno = log.queue_mutation(key(8));
    manifest.update(&log, &bucket(2, &[0])).unwrap();

    let entry = manifest.entry(CollectionId::new(8)).unwrap();
    assert_eq!(entry.end_seqno(), 3);
    assert!(entry.is_exclusive_deleting());
    assert_eq!(manifest.greatest_end_seqno(), 3);
    assert_eq!(manifest.n_deleting_collections(), 1);
    assert_eq!(manifest.manifest_uid(), 2);

    assert!(manifest.is_logically_deleted(&key(8), item_seqno).unwrap());
    assert!(!manifest.is_logically_deleted(&key(8), 4).unwrap());
    assert!(!manifest.is_logically_deleted(&DocKey::in_default("a"), item_seqno).unwrap());
    assert!(!manifest.does_key_contain_valid_collection(&key(8)));

    let queued = events(&log);
    assert_eq!(queued.len(), 2);
    assert!(queued[1].is_deleted());
    check_invariants(&manifest);
}

#[test]
fn test_complete_deletion_erases() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(1, &[0, 8])).unwrap();
    manifest.update(&log, &bucket(2, &[0])).unwrap();
    manifest.complete_deletion(&log, CollectionId::new(8)).unwrap();

    assert!(!manifest.exists(CollectionId::new(8)));
    assert_eq!(manifest.greatest_end_seqno(), COLLECTION_OPEN_SEQNO);
    assert_eq!(manifest.n_deleting_collections(), 0);

    let queued = events(&log);
    let last = queued.last().unwrap();
    assert_eq!(last.event(), SystemEvent::DeleteCollectionHard);
    assert_eq!(last.by_seqno(), 3);
    check_invariants(&manifest);

    assert!(matches!(
        manifest.complete_deletion(&log, CollectionId::new(8)),
        Err(Error::UnknownCollection { .. })
    ));
}

#[test]
fn test_complete_deletion_of_open_collection_fails() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(1, &[0, 8, 9])).unwrap();
    let item_seqno = log.queue_mutation(key(8));
    manifest.update(&log, &bucket(2, &[0, 9])).unwrap();

    let before = manifest.to_persisted_state();
    let queued = events(&log).len();
    let greatest = manifest.greatest_end_seqno();

    let err = manifest
        .complete_deletion(&log, CollectionId::new(9))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownCollection { collection } if collection == CollectionId::new(9)));

    assert_eq!(manifest.to_persisted_state(), before);
    assert_eq!(events(&log).len(), queued);
    assert_eq!(manifest.n_deleting_collections(), 1);
    assert_eq!(manifest.greatest_end_seqno(), greatest);
    assert!(manifest.is_logically_deleted(&key(8), item_seqno).unwrap());
    check_invariants(&manifest);

    // The collection really being deleted still completes
    manifest.complete_deletion(&log, CollectionId::new(8)).unwrap();
    assert_eq!(manifest.n_deleting_collections(), 0);
    check_invariants(&manifest);
}

#[test]
fn test_conflicting_deletion_changes_nothing() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(1, &[0, 8])).unwrap();
    manifest.update(&log, &bucket(2, &[0])).unwrap();

    let before = manifest.to_persisted_state();
    let queued = events(&log).len();
    let err = manifest.update(&log, &bucket(3, &[0, 8, 9])).unwrap_err();
    assert!(matches!(err, Error::ConflictingDeletion { collection } if collection == CollectionId::new(8)));
    assert_eq!(manifest.to_persisted_state(), before);
    assert_eq!(events(&log).len(), queued);
}

#[test]
fn test_final_change_carries_uid() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(1, &[0, 8, 9])).unwrap();
    manifest.update(&log, &bucket(5, &[0, 10, 11])).unwrap();

    let queued = events(&log);
    let summary: Vec<(CollectionId, bool, ManifestUid)> = queued[2..]
        .iter()
        .map(|event| {
            let data = Manifest::system_event_data(event.value().as_bytes()).unwrap();
            (data.collection_id, event.is_deleted(), data.manifest_uid)
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (CollectionId::new(8), true, 1),
            (CollectionId::new(9), true, 1),
            (CollectionId::new(10), false, 1),
            (CollectionId::new(11), false, 5),
        ]
    );
    assert_eq!(manifest.manifest_uid(), 5);

    // Each event closes its own batch
    assert_eq!(log.batches().len(), queued.len());
}

#[test]
fn test_final_deletion_carries_uid() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(1, &[0, 8, 9])).unwrap();
    manifest.update(&log, &bucket(7, &[0])).unwrap();

    let queued = events(&log);
    let uids: Vec<ManifestUid> = queued[2..]
        .iter()
        .map(|event| {
            Manifest::system_event_data(event.value().as_bytes())
                .unwrap()
                .manifest_uid
        })
        .collect();
    assert_eq!(uids, vec![1, 7]);
}

#[test]
fn test_patch_follows_event_flags() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(1, &[0, 8])).unwrap();
    manifest.update(&log, &bucket(2, &[0])).unwrap();
    manifest.complete_deletion(&log, CollectionId::new(8)).unwrap();

    let queued = events(&log);
    let flags: Vec<Option<SystemEvent>> = queued
        .iter()
        .map(|item| SystemEvent::from_flags(item.flags()))
        .collect();
    assert_eq!(
        flags,
        vec![
            Some(SystemEvent::Collection),
            Some(SystemEvent::Collection),
            Some(SystemEvent::DeleteCollectionHard),
        ]
    );

    let patched: Vec<PersistedState> = queued
        .iter()
        .map(|item| codec::decode(Manifest::patch_serialised_data(item).unwrap().as_bytes()).unwrap())
        .collect();
    let added = patched[0].entries.last().unwrap();
    assert_eq!(added.collection_id, CollectionId::new(8));
    assert_eq!(added.start_seqno, queued[0].by_seqno());
    let deleted = patched[1].entries.last().unwrap();
    assert_eq!(deleted.end_seqno, queued[1].by_seqno());
    assert!(
        patched[2]
            .entries
            .iter()
            .all(|entry| entry.collection_id != CollectionId::new(8))
    );
}

#[test]
fn test_persisted_round_trip() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(1, &[0, 8, 9])).unwrap();
    manifest.update(&log, &bucket(2, &[0, 9, 10])).unwrap();

    let persisted = log.flush().unwrap().manifest.unwrap();
    let restored = Manifest::from_persisted(persisted.as_bytes()).unwrap();
    assert_eq!(restored.to_persisted_state(), manifest.to_persisted_state());
    assert_eq!(restored.greatest_end_seqno(), manifest.greatest_end_seqno());
    assert_eq!(
        restored.n_deleting_collections(),
        manifest.n_deleting_collections()
    );
    check_invariants(&restored);

    manifest.complete_deletion(&log, CollectionId::new(8)).unwrap();
    let persisted = log.flush().unwrap().manifest.unwrap();
    let restored = Manifest::from_persisted(persisted.as_bytes()).unwrap();
    assert!(!restored.exists(CollectionId::new(8)));
    assert_eq!(restored.to_persisted_state(), manifest.to_persisted_state());

    let snapshot = manifest.to_persisted().unwrap();
    let restored = Manifest::from_persisted(snapshot.as_bytes()).unwrap();
    assert_eq!(restored.to_persisted_state(), manifest.to_persisted_state());
}

#[test]
fn test_from_persisted_edge_cases() {
    let empty = Manifest::from_persisted(&[]).unwrap();
    assert_eq!(empty.to_persisted_state(), Manifest::new().to_persisted_state());

    assert!(matches!(
        Manifest::from_persisted(b"garbage"),
        Err(Error::CorruptManifest(_))
    ));

    let entry = PersistedEntry {
        scope_id: ScopeId::DEFAULT,
        collection_id: CollectionId::new(8),
        start_seqno: 1,
        end_seqno: COLLECTION_OPEN_SEQNO,
    };
    let duplicated = codec::encode_state(&PersistedState {
        manifest_uid: 3,
        entries: vec![entry, entry],
    })
    .unwrap();
    assert!(matches!(
        Manifest::from_persisted(duplicated.as_bytes()),
        Err(Error::CorruptManifest(_))
    ));
}

fn reopened_manifest() -> Manifest {
    let state = PersistedState {
        manifest_uid: 4,
        entries: vec![
            PersistedEntry {
                scope_id: ScopeId::DEFAULT,
                collection_id: CollectionId::DEFAULT,
                start_seqno: 0,
                end_seqno: COLLECTION_OPEN_SEQNO,
            },
            PersistedEntry {
                scope_id: ScopeId::DEFAULT,
                collection_id: CollectionId::new(8),
                start_seqno: 10,
                end_seqno: 5,
            },
        ],
    };
    Manifest::from_persisted(codec::encode_state(&state).unwrap().as_bytes()).unwrap()
}

#[test]
fn test_reopened_collection_soft_delete() {
    let log = InMemoryLog::with_high_seqno(Vbid::new(0), 10);
    let mut manifest = reopened_manifest();
    assert_eq!(manifest.n_deleting_collections(), 1);
    assert_eq!(manifest.greatest_end_seqno(), 5);
    assert!(manifest.does_key_contain_valid_collection(&key(8)));
    assert!(manifest.is_logically_deleted(&key(8), 4).unwrap());
    assert!(!manifest.is_logically_deleted(&key(8), 7).unwrap());
    check_invariants(&manifest);

    manifest.complete_deletion(&log, CollectionId::new(8)).unwrap();
    let entry = manifest.entry(CollectionId::new(8)).unwrap();
    assert!(!entry.is_deleting());
    assert_eq!(entry.start_seqno(), 10);
    assert_eq!(manifest.n_deleting_collections(), 0);

    let queued = events(&log);
    assert_eq!(queued[0].event(), SystemEvent::DeleteCollectionSoft);
    // Soft delete snapshots need no patch
    assert_eq!(
        &Manifest::patch_serialised_data(&queued[0]).unwrap(),
        queued[0].value()
    );
    check_invariants(&manifest);
}

#[test]
fn test_reopened_collection_deleted_again() {
    let log = InMemoryLog::with_high_seqno(Vbid::new(0), 20);
    let mut manifest = reopened_manifest();
    manifest.update(&log, &bucket(5, &[0])).unwrap();

    let entry = manifest.entry(CollectionId::new(8)).unwrap();
    assert_eq!(entry.end_seqno(), 21);
    assert!(entry.is_exclusive_deleting());
    assert_eq!(manifest.n_deleting_collections(), 1);
    assert_eq!(manifest.greatest_end_seqno(), 21);
    check_invariants(&manifest);
}

#[test]
fn test_reopened_collection_blocks_add() {
    let log = InMemoryLog::with_high_seqno(Vbid::new(0), 20);
    let mut manifest = reopened_manifest();
    let before = manifest.to_persisted_state();

    let err = manifest.update(&log, &bucket(5, &[0, 8])).unwrap_err();
    assert!(matches!(err, Error::ConflictingDeletion { collection } if collection == CollectionId::new(8)));
    assert_eq!(manifest.to_persisted_state(), before);
    assert_eq!(manifest.manifest_uid(), 4);
    assert!(events(&log).is_empty());
    check_invariants(&manifest);

    // Once the old generation is purged the collection is plain open again
    manifest.complete_deletion(&log, CollectionId::new(8)).unwrap();
    let queued = events(&log).len();
    manifest.update(&log, &bucket(5, &[0, 8])).unwrap();
    assert_eq!(events(&log).len(), queued);
    assert!(manifest.entry(CollectionId::new(8)).unwrap().is_open());
    check_invariants(&manifest);
}

#[test]
fn test_default_collection_delete() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    let item = log.queue_mutation(DocKey::in_default("a"));
    manifest.update(&log, &bucket(1, &[8])).unwrap();

    assert!(!manifest.default_collection_exists());
    assert!(!manifest.does_key_contain_valid_collection(&DocKey::in_default("a")));
    assert!(manifest.is_logically_deleted(&DocKey::in_default("a"), item).unwrap());
    check_invariants(&manifest);

    manifest
        .complete_deletion(&log, CollectionId::DEFAULT)
        .unwrap();
    assert!(!manifest.exists(CollectionId::DEFAULT));
    check_invariants(&manifest);
}

#[test]
fn test_system_keys_resolve_embedded_collection() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(1, &[0, 8])).unwrap();
    manifest.update(&log, &bucket(2, &[0])).unwrap();

    let system_key = DocKey::system_event(SystemEvent::Collection, CollectionId::new(8));
    assert!(manifest.is_logically_deleted(&system_key, 2).unwrap());

    let resolved = manifest
        .get_manifest_entry_for_key(&system_key, true)
        .unwrap();
    assert_eq!(
        manifest.should_complete_deletion(&system_key, 2, resolved),
        Some(CollectionId::new(8))
    );
    let resolved = manifest.get_manifest_entry_for_key(&key(8), true).unwrap();
    assert_eq!(manifest.should_complete_deletion(&key(8), 2, resolved), None);

    let malformed = DocKey::system_event_with_extra(SystemEvent::Collection, b"xy");
    assert!(matches!(
        manifest.is_logically_deleted(&malformed, 1),
        Err(Error::MalformedSystemKey { len: 2 })
    ));
}

#[test]
fn test_is_logically_deleted_entry() {
    let manifest = Manifest::new();
    assert!(matches!(
        manifest.is_logically_deleted_entry(None, 3),
        Err(Error::InvalidIterator { seqno: 3 })
    ));
    let entry = manifest.entry(CollectionId::DEFAULT);
    assert!(!manifest.is_logically_deleted_entry(entry, 3).unwrap());
}

#[test]
fn test_short_circuit_above_greatest_end() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(1, &[0, 8, 9])).unwrap();
    manifest.update(&log, &bucket(2, &[0])).unwrap();
    let greatest = manifest.greatest_end_seqno();

    let malformed = DocKey::system_event_with_extra(SystemEvent::Collection, b"?");
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..500 {
        let seqno = rng.gen_range(greatest + 1..Seqno::MAX);
        let cid = rng.gen_range(0..16);
        assert!(!manifest.is_logically_deleted(&key(cid), seqno).unwrap());
        assert!(!manifest.is_logically_deleted(&malformed, seqno).unwrap());
    }
}

#[test]
fn test_random_updates_hold_invariants() {
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    let mut rng = StdRng::seed_from_u64(42);
    let mut uid = 0;

    for _ in 0..300 {
        if rng.gen_bool(0.6) {
            uid += 1;
            let cids: Vec<u32> = (0..12).filter(|id| *id != 1 && rng.gen_bool(0.5)).collect();
            let before = manifest.to_persisted_state();
            if manifest.update(&log, &bucket(uid, &cids)).is_err() {
                assert_eq!(manifest.to_persisted_state(), before);
            }
        } else {
            let known: Vec<(CollectionId, bool)> = manifest
                .entries()
                .map(|(cid, entry)| (cid, entry.is_deleting()))
                .collect();
            if !known.is_empty() {
                let (cid, deleting) = known[rng.gen_range(0..known.len())];
                if deleting {
                    manifest.complete_deletion(&log, cid).unwrap();
                } else {
                    let before = manifest.to_persisted_state();
                    assert!(manifest.complete_deletion(&log, cid).is_err());
                    assert_eq!(manifest.to_persisted_state(), before);
                }
            }
        }
        check_invariants(&manifest);
    }

    let persisted = log.flush().unwrap().manifest;
    if let Some(persisted) = persisted {
        let restored = Manifest::from_persisted(persisted.as_bytes()).unwrap();
        assert_eq!(restored.to_persisted_state(), manifest.to_persisted_state());
    }
}

#[test]
fn test_replica_changes() {
    let log = InMemoryLog::new(Vbid::new(1));
    let mut manifest = Manifest::new();
    let identifiers = (ScopeId::DEFAULT, CollectionId::new(8));
    manifest.replica_add(&log, 3, identifiers, 100).unwrap();
    manifest
        .replica_begin_delete(&log, 4, identifiers, 105)
        .unwrap();

    let entry = manifest.entry(CollectionId::new(8)).unwrap();
    assert_eq!(entry.start_seqno(), 100);
    assert_eq!(entry.end_seqno(), 105);
    assert_eq!(manifest.manifest_uid(), 4);
    assert_eq!(manifest.greatest_end_seqno(), 105);
    // Replicated events do not close batches
    assert_eq!(log.batches().len(), 1);

    assert!(matches!(
        manifest.replica_add(&log, 5, identifiers, 110),
        Err(Error::ConflictingDeletion { .. })
    ));
    assert!(matches!(
        manifest.replica_begin_delete(&log, 5, (ScopeId::DEFAULT, CollectionId::new(9)), 111),
        Err(Error::UnknownCollection { .. })
    ));
}

#[test]
fn test_scope_membership() {
    let json = r#"{"uid":"2","scopes":[
        {"name":"_default","uid":"0","collections":[{"name":"_default","uid":"0"}]},
        {"name":"brewery","uid":"8","collections":[{"name":"ipa","uid":"9"}]}]}"#;
    let target = BucketManifest::from_json(json, 10).unwrap();
    let log = InMemoryLog::new(Vbid::new(0));
    let mut manifest = Manifest::new();
    manifest.update(&log, &target).unwrap();

    let queued = events(&log);
    assert_eq!(queued.len(), 1);
    let data = Manifest::system_event_data(queued[0].value().as_bytes()).unwrap();
    assert_eq!(data.scope_id, ScopeId::new(8));
    assert_eq!(data.collection_id, CollectionId::new(9));
    assert_eq!(data.manifest_uid, 2);

    assert!(manifest.does_key_belong_to_scope(&key(9), ScopeId::new(8)));
    assert!(!manifest.does_key_belong_to_scope(&key(9), ScopeId::DEFAULT));
    assert!(manifest.does_key_belong_to_scope(&DocKey::in_default("a"), ScopeId::DEFAULT));
    assert!(!manifest.does_key_belong_to_scope(&key(10), ScopeId::DEFAULT));
}

#[test]
fn test_stats_and_summary() {
    let log = InMemoryLog::new(Vbid::new(3));
    let mut manifest = Manifest::new();
    manifest.update(&log, &bucket(1, &[0, 8])).unwrap();
    manifest.entry(CollectionId::new(8)).unwrap().set_disk_count(5);
    manifest
        .entry(CollectionId::DEFAULT)
        .unwrap()
        .set_disk_count(2);

    let mut stats = HashMap::new();
    manifest.add_stats(Vbid::new(3), &mut |k, v| {
        stats.insert(k.to_string(), v.to_string());
    });
    assert_eq!(stats["vb_3:manifest:entries"], "2");
    assert_eq!(stats["vb_3:manifest:default_exists"], "true");
    assert_eq!(stats["vb_3:manifest:greatest_end"], "-6");
    assert_eq!(stats["vb_3:manifest:n_deleting"], "0");
    assert_eq!(stats["vb_3:collection:8:entry:items"], "5");
    assert_eq!(stats["vb_3:collection:8:entry:start_seqno"], "1");

    let mut summary = Summary::new();
    manifest.update_summary(&mut summary);
    manifest.update_summary(&mut summary);
    assert_eq!(summary[&CollectionId::new(8)], 10);
    assert_eq!(summary[&CollectionId::DEFAULT], 4);
    assert_eq!(manifest.get_item_count(CollectionId::new(8)).unwrap(), 5);
    assert!(manifest.get_item_count(CollectionId::new(99)).is_err());

    let text = manifest.to_string();
    assert!(text.starts_with("VB::Manifest: uid:1"));
    assert!(text.contains("cid:8:"));
}
