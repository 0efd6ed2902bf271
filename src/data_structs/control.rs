use std::collections::BTreeMap;

use arcstr::ArcStr;
use itertools::Itertools;
use polars::prelude::*;

use super::typedef::{
    MaybeValue,
    ProbeAddress,
    ProbeId,
};

/// Readings of one control probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlRow {
    pub address:    ProbeAddress,
    pub probe_id:   ProbeId,
    pub group:      ArcStr,
    pub green:      MaybeValue,
    pub red:        MaybeValue,
    /// Noob-corrected readings, when a fit was available.
    pub noob_green: MaybeValue,
    pub noob_red:   MaybeValue,
}

/// Control probe readings of a sample, ordered by group label and then by
/// manifest order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlTable {
    rows: Vec<ControlRow>,
}

impl ControlTable {
    pub fn new(rows: Vec<ControlRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[ControlRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn probe_ids(&self) -> impl Iterator<Item = &ProbeId> {
        self.rows.iter().map(|r| &r.probe_id)
    }

    pub fn by_group(&self) -> BTreeMap<&str, Vec<&ControlRow>> {
        let mut groups: BTreeMap<&str, Vec<&ControlRow>> = BTreeMap::new();
        for row in &self.rows {
            groups.entry(row.group.as_str()).or_default().push(row);
        }
        groups
    }

    pub fn to_data_frame(&self) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Column::new(
                "IlmnID".into(),
                self.rows
                    .iter()
                    .map(|r| r.probe_id.as_str())
                    .collect_vec(),
            ),
            Column::new(
                "AddressID".into(),
                self.rows.iter().map(|r| r.address).collect_vec(),
            ),
            Column::new(
                "Control_Type".into(),
                self.rows
                    .iter()
                    .map(|r| r.group.as_str())
                    .collect_vec(),
            ),
            Column::new(
                "Grn".into(),
                self.rows.iter().map(|r| r.green).collect_vec(),
            ),
            Column::new("Red".into(), self.rows.iter().map(|r| r.red).collect_vec()),
            Column::new(
                "noob_Grn".into(),
                self.rows
                    .iter()
                    .map(|r| r.noob_green)
                    .collect_vec(),
            ),
            Column::new(
                "noob_Red".into(),
                self.rows
                    .iter()
                    .map(|r| r.noob_red)
                    .collect_vec(),
            ),
        ])
    }
}
