use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use item_core::{
    Attachment, DefinitionId, Fragment, FragmentHook, FragmentRegistry, ItemChange,
    ItemDefinition, ItemId, ItemInstance, ItemSpec, LockTarget, RemoveAmount, SlotTag,
    SocketSlot, StoreError, StoreEvent, StoreId, StructureDigest,
};
use item_runtime::{
    DefinitionCache, Event, ObserverHandle, Origin, RuntimeConfig, RuntimeError, Session, Topic,
};
use tokio::sync::broadcast;

const PRIMARY: StoreId = StoreId(1);
const STASH: StoreId = StoreId(2);

const RIFLE: DefinitionId = DefinitionId(1);
const LONG_BARREL: DefinitionId = DefinitionId(3);
const SUPPRESSOR: DefinitionId = DefinitionId(4);
const HELMET: DefinitionId = DefinitionId(5);
const MEDKIT: DefinitionId = DefinitionId(7);
const MAP: DefinitionId = DefinitionId(8);

fn catalog() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../items/content/data")
}

async fn start(observers: usize) -> Session {
    let config = RuntimeConfig {
        observers,
        catalog_path: Some(catalog()),
        ..RuntimeConfig::default()
    };
    Session::start(config)
        .await
        .expect("session should start from the bundled catalog")
}

/// Waits for `observer` to catch up and checks it matches the authority.
async fn converged(session: &Session, observer: &ObserverHandle) -> StructureDigest {
    let (digest, sequence) = session.handle().digest(observer.store()).await.unwrap();
    observer.synced(sequence).await.unwrap();
    assert_eq!(
        observer.digest().await.unwrap(),
        digest,
        "observer {} diverged from {}",
        observer.index(),
        observer.store()
    );
    digest
}

async fn next_event(rx: &mut broadcast::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event should arrive")
        .expect("bus should stay open")
}

#[tokio::test]
async fn observers_converge_on_an_assembled_rifle() {
    let session = start(2).await;
    let handle = session.handle();

    let rifle = handle
        .add_item(PRIMARY, ItemSpec::new(RIFLE), None)
        .await
        .unwrap();
    let barrel = handle
        .add_item(
            PRIMARY,
            ItemSpec::new(LONG_BARREL),
            Some(Attachment::new(rifle, "Barrel")),
        )
        .await
        .unwrap();
    let suppressor = handle
        .add_item(
            PRIMARY,
            ItemSpec::new(SUPPRESSOR),
            Some(Attachment::new(barrel, "Muzzle")),
        )
        .await
        .unwrap();
    assert!(handle.add_to_slot(PRIMARY, rifle, "Primary").await.unwrap());

    let record = handle.query_item(PRIMARY, rifle).await.unwrap().unwrap();
    // default iron sights plus the barrel
    assert_eq!(record.attached_items.len(), 2);
    assert!(record.attached_items.contains(&barrel));
    assert_eq!(record.slot, Some(SlotTag::new("Primary")));

    for observer in session.observers() {
        converged(&session, observer).await;
        let replica = observer.item(suppressor).await.unwrap().unwrap();
        assert_eq!(replica.owner, Some(barrel));
        assert_eq!(replica.attached_to_slot, Some(SlotTag::new("Muzzle")));
    }

    assert!(
        handle
            .remove_item(PRIMARY, rifle, RemoveAmount::All, true)
            .await
            .unwrap()
    );
    for observer in session.observers() {
        converged(&session, observer).await;
        assert!(observer.item(suppressor).await.unwrap().is_none());
        assert_eq!(observer.status().await.unwrap().items, 0);
    }

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn refused_requests_surface_store_errors_and_change_nothing() {
    let session = start(1).await;
    let handle = session.handle();

    let rifle = handle
        .add_item(PRIMARY, ItemSpec::new(RIFLE), None)
        .await
        .unwrap();
    let barrel = handle
        .add_item(
            PRIMARY,
            ItemSpec::new(LONG_BARREL),
            Some(Attachment::new(rifle, "Barrel")),
        )
        .await
        .unwrap();
    handle
        .add_item(PRIMARY, ItemSpec::new(MAP), None)
        .await
        .unwrap();
    let (before, sequence) = handle.digest(PRIMARY).await.unwrap();

    let err = handle.add_to_slot(PRIMARY, barrel, "Back").await.unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Store(StoreError::ItemAttached { id, owner }) if id == barrel && owner == rifle
    ));

    let err = handle
        .add_item(PRIMARY, ItemSpec::new(MAP), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Store(StoreError::UniqueItemExists { .. })
    ));

    let err = handle
        .attach_item(PRIMARY, rifle, barrel, "Muzzle")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Store(StoreError::AttachmentCycle { .. })
    ));

    let err = handle
        .add_item(StoreId(9), ItemSpec::new(RIFLE), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownStore { store } if store == StoreId(9)));

    let err = handle.move_item(PRIMARY, PRIMARY, rifle).await.unwrap_err();
    assert!(matches!(err, RuntimeError::SameStoreMove { .. }));

    let missing = handle.detach_item(PRIMARY, ItemId(u64::MAX)).await.unwrap_err();
    assert!(missing.severity().is_recoverable());

    assert_eq!(handle.digest(PRIMARY).await.unwrap(), (before, sequence));
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn late_observer_joins_from_a_snapshot() {
    let mut session = start(0).await;
    let handle = session.handle();

    let helmet = handle
        .add_item(PRIMARY, ItemSpec::new(HELMET), None)
        .await
        .unwrap();
    handle.add_to_slot(PRIMARY, helmet, "Head").await.unwrap();
    handle.set_level(PRIMARY, helmet, 3).await.unwrap();
    handle
        .add_dynamic_tag(PRIMARY, helmet, "dented")
        .await
        .unwrap();
    let medkit = handle
        .add_item(PRIMARY, ItemSpec::new(MEDKIT), None)
        .await
        .unwrap();

    let observer = session.spawn_observer(PRIMARY).unwrap();
    converged(&session, &observer).await;

    let status = observer.status().await.unwrap();
    assert_eq!(status.items, 2);
    assert_eq!(status.pending, 0);
    assert_eq!(status.resyncs, 1);

    let replica = observer.item(helmet).await.unwrap().unwrap();
    assert_eq!(replica.level, 3);
    assert_eq!(replica.slot, Some(SlotTag::new("Head")));

    // later deltas flow incrementally
    handle
        .remove_item(PRIMARY, medkit, RemoveAmount::All, true)
        .await
        .unwrap();
    converged(&session, &observer).await;
    assert_eq!(observer.status().await.unwrap().resyncs, 1);

    assert!(matches!(
        session.spawn_observer(StoreId(5)),
        Err(RuntimeError::UnknownStore { .. })
    ));
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn moves_between_stores_replicate_to_both_sides() {
    let mut session = start(1).await;
    let stash_observer = session.spawn_observer(STASH).unwrap();
    let handle = session.handle();

    let rifle = handle
        .add_item(PRIMARY, ItemSpec::new(RIFLE), None)
        .await
        .unwrap();
    let sights = handle.query_item(PRIMARY, rifle).await.unwrap().unwrap().attached_items[0];

    handle.move_item(PRIMARY, STASH, rifle).await.unwrap();

    assert!(handle.query_item(PRIMARY, rifle).await.unwrap().is_none());
    assert!(handle.query_item(PRIMARY, sights).await.unwrap().is_none());
    let moved = handle.query_item(STASH, rifle).await.unwrap().unwrap();
    assert_eq!(moved.attached_items, vec![sights]);
    let moved_sights = handle.query_item(STASH, sights).await.unwrap().unwrap();
    assert_eq!(moved_sights.owner, Some(rifle));

    let primary_observer = session.observer(0).unwrap().clone();
    converged(&session, &primary_observer).await;
    converged(&session, &stash_observer).await;
    assert!(primary_observer.item(rifle).await.unwrap().is_none());
    assert_eq!(
        stash_observer.item(sights).await.unwrap().unwrap().owner,
        Some(rifle)
    );

    // moving it back collides with nothing: ids stay unique across stores
    handle.move_item(STASH, PRIMARY, rifle).await.unwrap();
    converged(&session, &primary_observer).await;
    assert_eq!(primary_observer.status().await.unwrap().items, 2);

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn replication_confirms_observer_locks() {
    let session = start(1).await;
    let handle = session.handle();
    let observer = session.observer(0).unwrap().clone();
    let mut locks = session.subscribe(Topic::Locks);

    let head = LockTarget::Slot(SlotTag::new("Head"));
    assert!(observer.lock_slot("Head").await.unwrap());
    assert!(!observer.lock_slot("Head").await.unwrap());
    assert!(observer.is_locked(head.clone()).await.unwrap());

    match next_event(&mut locks).await {
        Event::Store {
            origin: Origin::Observer(0),
            event: StoreEvent::LockChanged { target, locked, .. },
        } => {
            assert_eq!(target, head);
            assert!(locked);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let helmet = handle
        .add_item(PRIMARY, ItemSpec::new(HELMET), None)
        .await
        .unwrap();
    handle.add_to_slot(PRIMARY, helmet, "Head").await.unwrap();
    converged(&session, &observer).await;

    assert!(!observer.is_locked(head.clone()).await.unwrap());
    match next_event(&mut locks).await {
        Event::Store {
            event: StoreEvent::LockChanged { target, locked, .. },
            ..
        } => {
            assert_eq!(target, head);
            assert!(!locked);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // explicit unlock of something never locked is a no-op
    assert!(!observer.unlock(LockTarget::Item(helmet)).await.unwrap());
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn item_events_arrive_from_both_sides() {
    let session = start(1).await;
    let handle = session.handle();
    let mut items = session.subscribe(Topic::Items);

    let medkit = handle
        .add_item(PRIMARY, ItemSpec::new(MEDKIT), None)
        .await
        .unwrap();

    let mut origins = Vec::new();
    while origins.len() < 2 {
        if let Event::Store {
            origin,
            event:
                StoreEvent::Item {
                    item,
                    change: ItemChange::Added,
                    ..
                },
        } = next_event(&mut items).await
        {
            assert_eq!(item, medkit);
            origins.push(origin);
        }
    }
    assert_eq!(origins, vec![Origin::Authority, Origin::Observer(0)]);

    session.shutdown().await.unwrap();
}

#[derive(Default)]
struct SlotCounter(AtomicUsize);

impl FragmentHook for SlotCounter {
    fn on_added_to_slot(&self, _item: &ItemInstance, _slot: &SlotTag) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn builder_accepts_definitions_and_shared_hooks() {
    let definitions = DefinitionCache::from_definitions([
        ItemDefinition::new(DefinitionId(10), "pack").with_fragment(Fragment::SocketSlots(vec![
            SocketSlot::new("Pouch"),
        ])),
        ItemDefinition::new(DefinitionId(11), "pouch"),
    ]);
    let counter = Arc::new(SlotCounter::default());
    let mut fragments = FragmentRegistry::new();
    fragments.register_global(counter.clone());

    let session = Session::builder()
        .config(RuntimeConfig {
            stores: 1,
            ..RuntimeConfig::default()
        })
        .definitions(definitions)
        .fragments(fragments)
        .build()
        .await
        .unwrap();
    let handle = session.handle();

    let pack = handle
        .add_item(PRIMARY, ItemSpec::new(DefinitionId(10)), None)
        .await
        .unwrap();
    handle
        .add_item(
            PRIMARY,
            ItemSpec::new(DefinitionId(11)),
            Some(Attachment::new(pack, "Pouch")),
        )
        .await
        .unwrap();
    handle.add_to_slot(PRIMARY, pack, "Back").await.unwrap();

    converged(&session, session.observer(0).unwrap()).await;
    // pack and pouch, on the authority and on the replica
    assert_eq!(counter.0.load(Ordering::SeqCst), 4);

    let err = handle
        .add_item(STASH, ItemSpec::new(DefinitionId(10)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownStore { .. }));

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn sessions_need_definitions() {
    match Session::builder().build().await {
        Err(RuntimeError::MissingDefinitions) => {}
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("session started without definitions"),
    }

    let dir = tempfile::TempDir::new().unwrap();
    match Session::builder().catalog(dir.path()).build().await {
        Err(RuntimeError::Catalog { path, .. }) => assert_eq!(path, dir.path()),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("session started from an empty directory"),
    }
}

#[tokio::test]
async fn sessions_refuse_id_sessions_that_do_not_fit() {
    let config = RuntimeConfig {
        session: 1 << 24,
        catalog_path: Some(catalog()),
        ..RuntimeConfig::default()
    };
    match Session::start(config).await {
        Err(RuntimeError::IdSessionOverflow { session, store }) => {
            assert_eq!(session, 1 << 24);
            assert_eq!(store, PRIMARY);
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("session started with an oversized id session"),
    }
}
