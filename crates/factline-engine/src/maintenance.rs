use serde::Serialize;

use factline_core::{Collection, FactId, FactStatus, VectorIndex};
use factline_store::{export_snapshot, facts, FactStore, StoreSnapshot};

use crate::EngineError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub deactivated: Vec<FactId>,
}

impl SweepReport {
    pub fn count(&self) -> usize {
        self.deactivated.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexCounts {
    pub documents: usize,
    pub facts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    #[serde(flatten)]
    pub store: StoreSnapshot,
    pub index: IndexCounts,
}

/// Marks every FULFILLED Fact with no Links as DEACTIVATED in one transaction.
pub(crate) fn deactivate_unlinked_facts(store: &mut FactStore) -> Result<SweepReport, EngineError> {
    let transaction = store.begin()?;
    let now_unix_ms = factline_core::current_unix_timestamp_ms();
    let deactivated = facts::unlinked_fulfilled_fact_ids(&transaction)?;
    for fact_id in &deactivated {
        facts::set_fact_status(&transaction, *fact_id, FactStatus::Deactivated, now_unix_ms)?;
    }
    transaction.commit()?;
    tracing::info!(deactivated = deactivated.len(), "unlinked facts deactivated");
    Ok(SweepReport { deactivated })
}

pub(crate) fn reset(store: &mut FactStore, index: &dyn VectorIndex) -> Result<(), EngineError> {
    store.reset()?;
    index.clear()?;
    tracing::info!("engine state reset");
    Ok(())
}

pub(crate) fn snapshot(store: &FactStore, index: &dyn VectorIndex) -> Result<EngineSnapshot, EngineError> {
    Ok(EngineSnapshot {
        store: export_snapshot(store.connection())?,
        index: IndexCounts {
            documents: index.count(Collection::Documents)?,
            facts: index.count(Collection::Facts)?,
        },
    })
}
