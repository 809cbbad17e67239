//! Scripted replication scenario driven through a running session.
//!
//! Assembles a loadout against the primary store, exercises slot, stack,
//! lock and cross-store operations, then compares every observer's digest
//! with its authority.
use std::fmt;

use anyhow::{Context, Result, bail};
use item_core::{
    Attachment, DefinitionId, InstanceData, ItemSpec, RemoveAmount, StoreId, StructureDigest,
};
use item_runtime::{ObserverHandle, Session};
use tracing::info;

const RIFLE: DefinitionId = DefinitionId(1);
const LONG_BARREL: DefinitionId = DefinitionId(3);
const SUPPRESSOR: DefinitionId = DefinitionId(4);
const HELMET: DefinitionId = DefinitionId(5);
const RIFLE_AMMO: DefinitionId = DefinitionId(6);
const MEDKIT: DefinitionId = DefinitionId(7);

/// Digest comparison for one observer.
#[derive(Debug, Clone)]
pub struct ObserverOutcome {
    pub index: usize,
    pub store: StoreId,
    pub authority: StructureDigest,
    pub observer: StructureDigest,
    pub resyncs: u32,
}

impl ObserverOutcome {
    pub fn converged(&self) -> bool {
        self.authority == self.observer
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub operations: usize,
    pub observers: Vec<ObserverOutcome>,
}

impl ScenarioReport {
    pub fn converged(&self) -> bool {
        self.observers.iter().all(ObserverOutcome::converged)
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "operations: {}", self.operations)?;
        for outcome in &self.observers {
            writeln!(
                f,
                "observer {} ({}): {} resyncs={} authority={} observer={}",
                outcome.index,
                outcome.store,
                if outcome.converged() { "converged" } else { "DIVERGED" },
                outcome.resyncs,
                outcome.authority,
                outcome.observer,
            )?;
        }
        Ok(())
    }
}

/// Runs the scenario against the session's primary store.
///
/// Spawns one extra observer midway to exercise snapshot joins, and moves
/// an item into the second store when the session hosts one.
pub async fn run(session: &mut Session) -> Result<ScenarioReport> {
    let handle = session.handle();
    let primary = session.config().primary_store();
    let mut operations = 0;

    let rifle = handle.add_item(primary, ItemSpec::new(RIFLE), None).await?;
    let barrel = handle
        .add_item(
            primary,
            ItemSpec::new(LONG_BARREL),
            Some(Attachment::new(rifle, "Barrel")),
        )
        .await?;
    handle
        .add_item(
            primary,
            ItemSpec::new(SUPPRESSOR),
            Some(Attachment::new(barrel, "Muzzle")),
        )
        .await?;
    handle.add_to_slot(primary, rifle, "Primary").await?;
    operations += 4;
    info!(%rifle, %barrel, "rifle assembled and equipped");

    let helmet = handle.add_item(primary, ItemSpec::new(HELMET), None).await?;
    handle.add_to_slot(primary, helmet, "Head").await?;
    handle
        .set_instance_data(primary, helmet, InstanceData::Durability { current: 41, max: 60 })
        .await?;
    operations += 3;

    // 90 rounds overflow a 60-round stack into a second item
    let ammo = handle
        .add_item(primary, ItemSpec::new(RIFLE_AMMO).with_amount(90), None)
        .await?;
    handle
        .remove_item(primary, ammo, RemoveAmount::Stacks(40), true)
        .await?;
    operations += 2;

    if let Some(observer) = session.observer(0) {
        observer.lock_slot("Back").await?;
    }
    let medkit = handle.add_item(primary, ItemSpec::new(MEDKIT), None).await?;
    handle.add_to_slot(primary, medkit, "Back").await?;
    handle.change_slot(primary, medkit, "Belt").await?;
    operations += 3;

    let late = session.spawn_observer(primary)?;
    info!(replica = late.index(), "late observer joined");

    handle.detach_item(primary, barrel).await?;
    handle.add_dynamic_tag(primary, barrel, "loose").await?;
    operations += 2;

    let stash = StoreId(2);
    if session.config().stores >= 2 {
        handle.move_item(primary, stash, helmet).await?;
        operations += 1;
        info!(%helmet, %stash, "helmet moved to stash");
    }

    let mut observers = Vec::new();
    for observer in session.observers() {
        observers.push(compare(session, observer).await?);
    }

    Ok(ScenarioReport {
        operations,
        observers,
    })
}

async fn compare(session: &Session, observer: &ObserverHandle) -> Result<ObserverOutcome> {
    let (authority, sequence) = session.handle().digest(observer.store()).await?;
    observer
        .synced(sequence)
        .await
        .with_context(|| format!("observer {} stopped before catching up", observer.index()))?;
    let digest = observer.digest().await?;
    let status = observer.status().await?;
    Ok(ObserverOutcome {
        index: observer.index(),
        store: observer.store(),
        authority,
        observer: digest,
        resyncs: status.resyncs,
    })
}

/// Fails unless every observer matches its authority.
pub fn ensure_converged(report: &ScenarioReport) -> Result<()> {
    let diverged: Vec<usize> = report
        .observers
        .iter()
        .filter(|outcome| !outcome.converged())
        .map(|outcome| outcome.index)
        .collect();
    if !diverged.is_empty() {
        bail!("observers {diverged:?} diverged from their authority");
    }
    Ok(())
}
