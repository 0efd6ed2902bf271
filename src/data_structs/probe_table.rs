use std::sync::Arc;

use anyhow::bail;
use hashbrown::HashMap;
use polars::prelude::*;

use super::enums::Stage;
use super::typedef::{
    IntensityType,
    MaybeValue,
    ProbeId,
};
use crate::errors::ContractError;

/// Ordered set of probe identifiers every derived table of a sample is
/// aligned to.
#[derive(Debug, Clone, Default)]
pub struct ProbeIndex {
    ids:       Vec<ProbeId>,
    positions: HashMap<ProbeId, usize>,
}

impl PartialEq for ProbeIndex {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.ids == other.ids
    }
}

impl Eq for ProbeIndex {}

impl ProbeIndex {
    /// Builds the index. Identifiers must be unique.
    pub fn try_new(ids: Vec<ProbeId>) -> anyhow::Result<Self> {
        let mut positions = HashMap::with_capacity(ids.len());
        for (idx, id) in ids.iter().enumerate() {
            if positions.insert(id.clone(), idx).is_some() {
                bail!("duplicate probe identifier {} in probe index", id);
            }
        }
        Ok(Self { ids, positions })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ProbeId] {
        &self.ids
    }

    pub fn position(
        &self,
        probe_id: &str,
    ) -> Option<usize> {
        self.positions.get(probe_id).copied()
    }

    pub fn contains(
        &self,
        probe_id: &str,
    ) -> bool {
        self.positions.contains_key(probe_id)
    }

    /// Identifier column for export views.
    pub fn to_column(
        &self,
        name: &str,
    ) -> Column {
        Column::new(
            name.into(),
            self.ids
                .iter()
                .map(|id| id.as_str())
                .collect::<Vec<_>>(),
        )
    }
}

/// Probe counts separating two indexes: probes of `other` absent from the
/// reference, and probes present only in `other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    pub missing: usize,
    pub extra:   usize,
    pub ordered: bool,
}

impl Alignment {
    pub fn is_aligned(&self) -> bool {
        self.missing == 0 && self.extra == 0 && self.ordered
    }

    pub fn is_subset(&self) -> bool {
        self.extra == 0 && self.missing > 0
    }

    pub fn is_superset(&self) -> bool {
        self.missing == 0 && self.extra > 0
    }
}

/// One derived value per probe of a [`ProbeIndex`]. `None` is the missing
/// sentinel and is never coerced to a number.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTable {
    index:  Arc<ProbeIndex>,
    values: Vec<MaybeValue>,
}

impl ProbeTable {
    pub fn try_new(
        index: Arc<ProbeIndex>,
        values: Vec<MaybeValue>,
    ) -> anyhow::Result<Self> {
        if index.len() != values.len() {
            bail!(
                "probe table has {} values for an index of {} probes",
                values.len(),
                index.len()
            );
        }
        Ok(Self { index, values })
    }

    /// A table with every probe missing.
    pub fn missing(index: Arc<ProbeIndex>) -> Self {
        let values = vec![None; index.len()];
        Self { index, values }
    }

    /// Builds a table by evaluating `f` for every probe position.
    pub fn from_fn<F>(
        index: Arc<ProbeIndex>,
        f: F,
    ) -> Self
    where
        F: FnMut(usize) -> MaybeValue, {
        let values = (0..index.len()).map(f).collect();
        Self { index, values }
    }

    pub fn index(&self) -> &Arc<ProbeIndex> {
        &self.index
    }

    pub fn values(&self) -> &[MaybeValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a probe; outer `None` when the probe is not indexed.
    pub fn get(
        &self,
        probe_id: &str,
    ) -> Option<MaybeValue> {
        self.index
            .position(probe_id)
            .map(|idx| self.values[idx])
    }

    pub fn n_missing(&self) -> usize {
        self.values
            .iter()
            .filter(|v| v.is_none())
            .count()
    }

    pub fn present(&self) -> impl Iterator<Item = IntensityType> + '_ {
        self.values.iter().flatten().copied()
    }

    /// Compares the table's probe set and order with `reference`.
    pub fn alignment(
        &self,
        reference: &ProbeIndex,
    ) -> Alignment {
        if std::ptr::eq(self.index.as_ref(), reference) || *self.index == *reference {
            return Alignment {
                missing: 0,
                extra:   0,
                ordered: true,
            };
        }
        let missing = reference
            .ids()
            .iter()
            .filter(|id| !self.index.contains(id))
            .count();
        let extra = self
            .index
            .ids()
            .iter()
            .filter(|id| !reference.contains(id))
            .count();
        Alignment {
            missing,
            extra,
            ordered: false,
        }
    }

    /// Fails with [`ContractError::MisalignedStage`] unless the table is
    /// aligned to `reference`.
    pub fn check_aligned(
        &self,
        reference: &ProbeIndex,
        stage: Stage,
    ) -> Result<(), ContractError> {
        let alignment = self.alignment(reference);
        if alignment.is_aligned() {
            Ok(())
        }
        else {
            Err(ContractError::MisalignedStage {
                stage,
                missing: alignment.missing,
                extra: alignment.extra,
            })
        }
    }

    /// Conforms the table to `index`: probes absent from the table become
    /// missing, probes absent from `index` are dropped.
    pub fn reindex(
        &self,
        index: Arc<ProbeIndex>,
    ) -> ProbeTable {
        ProbeTable::from_fn(index.clone(), |pos| {
            self.get(index.ids()[pos].as_str()).flatten()
        })
    }

    /// Elementwise map over two tables aligned to the same index, producing
    /// the `stage` table. Missing in either input yields missing.
    pub fn zip_map<F>(
        &self,
        other: &ProbeTable,
        stage: Stage,
        mut f: F,
    ) -> Result<ProbeTable, ContractError>
    where
        F: FnMut(IntensityType, IntensityType) -> MaybeValue, {
        other.check_aligned(&self.index, stage)?;
        let values = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| {
                match (a, b) {
                    (Some(a), Some(b)) => f(*a, *b),
                    _ => None,
                }
            })
            .collect();
        Ok(ProbeTable {
            index: self.index.clone(),
            values,
        })
    }

    pub fn to_column(
        &self,
        name: &str,
    ) -> Column {
        Column::new(name.into(), self.values.clone())
    }
}
