use itertools::Itertools;
use log::debug;

use crate::data_structs::container::SampleDataContainer;
use crate::data_structs::control::{
    ControlRow,
    ControlTable,
};
use crate::data_structs::layout::ProbeLayoutIndex;
use crate::data_structs::signal::RawSignalTable;
use crate::data_structs::Channel;
use crate::errors::ProcessingResult;
use crate::tools::noob::NoobFit;

/// Reads every control probe of `layout` from `raw`. Corrected columns are
/// filled when `fit` is given. Addresses absent from the sample are missing.
pub fn extract_controls(
    layout: &ProbeLayoutIndex,
    raw: &RawSignalTable,
    fit: Option<&NoobFit>,
) -> ControlTable {
    let rows = layout
        .controls()
        .iter()
        .sorted_by(|a, b| a.group.cmp(&b.group))
        .map(|probe| {
            let green = raw.read(probe.address, Channel::Green);
            let red = raw.read(probe.address, Channel::Red);
            let correct = |value: Option<f64>, channel| {
                fit.zip(value)
                    .map(|(fit, x)| fit.correct(x, channel))
            };
            ControlRow {
                address: probe.address,
                probe_id: probe.probe_id.clone(),
                group: probe.group.clone(),
                green,
                red,
                noob_green: correct(green, Channel::Green),
                noob_red: correct(red, Channel::Red),
            }
        })
        .collect_vec();
    ControlTable::new(rows)
}

/// Stores the control table of a sample.
pub fn apply(container: &mut SampleDataContainer) -> ProcessingResult<()> {
    let table = extract_controls(
        container.layout(),
        container.raw()?,
        container.noob_fit(),
    );
    debug!(
        "Sample {}: extracted {} control probes",
        container.sample_id(),
        table.len()
    );
    container.set_controls(table);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structs::layout::ProbeRecord;
    use crate::data_structs::signal::ChannelIntensity;
    use crate::data_structs::{
        Allele,
        Chemistry,
    };
    use crate::tools::noob::{
        BackgroundFit,
        DyeBias,
    };

    fn layout() -> ProbeLayoutIndex {
        ProbeLayoutIndex::try_from_records(vec![
            ProbeRecord::new(10, "cg01", Chemistry::TypeII, Allele::Both),
            ProbeRecord::control(50, "STAINING.1", "STAINING"),
            ProbeRecord::control(51, "NORM_A.1", "NORM_A"),
            ProbeRecord::control(52, "NORM_A.2", "NORM_A"),
        ])
        .unwrap()
    }

    #[test]
    fn test_exactly_control_probes() {
        let raw = RawSignalTable::from_iter_checked("s", [
            (10, ChannelIntensity::new(1.0, 2.0)),
            (50, ChannelIntensity::new(3.0, 4.0)),
            (51, ChannelIntensity::new(5.0, 6.0)),
        ])
        .unwrap();
        let table = extract_controls(&layout(), &raw, None);

        let ids = table
            .probe_ids()
            .map(|id| id.as_str())
            .collect_vec();
        assert_eq!(ids, vec!["NORM_A.1", "NORM_A.2", "STAINING.1"]);
        assert_eq!(table.rows()[0].red, Some(6.0));
        assert_eq!(table.rows()[1].green, None);
        assert!(table.rows().iter().all(|r| r.noob_green.is_none()));
        assert_eq!(table.by_group()["NORM_A"].len(), 2);

        let df = table.to_data_frame().unwrap();
        assert_eq!(df.height(), 3);
    }

    #[test]
    fn test_corrected_columns_with_fit() {
        let raw = RawSignalTable::from_iter_checked("s", [(
            50,
            ChannelIntensity::new(1000.0, 1000.0),
        )])
        .unwrap();
        let background = BackgroundFit {
            mu:    100.0,
            sigma: 0.0,
            alpha: 10.0,
            n_oob: 500,
        };
        let fit = NoobFit {
            green:  background,
            red:    background,
            dye:    DyeBias {
                green: 2.0,
                red:   1.0,
            },
            offset: 15.0,
        };
        let table = extract_controls(&layout(), &raw, Some(&fit));
        let groups = table.by_group();
        let staining = groups["STAINING"][0];
        assert_eq!(staining.noob_green, Some(915.0 * 2.0));
        assert_eq!(staining.noob_red, Some(915.0));
    }
}
