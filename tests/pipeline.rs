mod common;
use std::sync::Arc;

use assert_approx_eq::assert_approx_eq;
use common::DemoArrayBuilder;
use itertools::Itertools;
use methprep::prelude::*;
use methprep::tools::noob::DyeBias;
use rstest::{
    fixture,
    rstest,
};

#[fixture]
fn builder() -> DemoArrayBuilder {
    DemoArrayBuilder::new(150, 300, 42)
}

fn run(
    config: PipelineConfig,
    source: &MemorySource,
) -> (RunReport, MemoryExporter) {
    let pipeline = Pipeline::from_manifest(config, source).unwrap();
    let mut exporter = MemoryExporter::default();
    let report = pipeline
        .run(&source.sheet, source, &mut exporter)
        .unwrap();
    (report, exporter)
}

#[rstest]
fn betas_in_unit_interval(builder: DemoArrayBuilder) {
    let source = builder.source(3);
    let (report, _) = run(PipelineConfig::default(), &source);

    assert_eq!(report.n_processed(), 3);
    assert!(report.is_complete());
    let betas = report.matrices.matrix(Stage::Beta).unwrap();
    let m_values = report.matrices.matrix(Stage::MValue).unwrap();
    for sample_id in betas.samples() {
        let beta_column = betas.column(sample_id).unwrap();
        let m_column = m_values.column(sample_id).unwrap();
        for (beta, m) in beta_column.iter().zip(m_column) {
            let beta = beta.unwrap();
            assert!((0.0..=1.0).contains(&beta));
            assert!(m.unwrap().is_finite());
        }
    }
}

#[rstest]
fn derived_tables_share_probe_index(builder: DemoArrayBuilder) {
    let source = builder.source(2);
    let (report, _) = run(PipelineConfig::default(), &source);

    for container in report.containers.iter() {
        let index = container.probe_index();
        for stage in [
            Stage::RawMethylated,
            Stage::RawUnmethylated,
            Stage::NoobMethylated,
            Stage::NoobUnmethylated,
            Stage::Beta,
            Stage::MValue,
        ] {
            let table = container.table(stage).unwrap();
            assert!(Arc::ptr_eq(table.index(), index));
        }
        assert_eq!(container.state(), SampleState::Exported);
    }
}

#[rstest]
fn reference_type_ii_probe(builder: DemoArrayBuilder) {
    let mut records = builder.records();
    records.push(ProbeRecord::new(1, "cg00000029", Chemistry::TypeII, Allele::Both));
    let mut intensities = builder.sample_intensities(0);
    intensities.push((1, ChannelIntensity::new(2712.0, 4479.96501260212)));
    let source = MemorySource::new(records).with_sample(builder.sample(0), intensities);

    let (report, _) = run(PipelineConfig::default().with_noob(false), &source);
    let container = &report.containers[0];
    assert_eq!(container.table(Stage::NoobMethylated), None);

    let meth = container.table(Stage::RawMethylated).unwrap();
    let unmeth = container.table(Stage::RawUnmethylated).unwrap();
    assert_eq!(meth.get("cg00000029"), Some(Some(2712.0)));
    assert_eq!(unmeth.get("cg00000029"), Some(Some(4479.96501260212)));
    let beta = container
        .table(Stage::Beta)
        .unwrap()
        .get("cg00000029")
        .flatten()
        .unwrap();
    assert_approx_eq!(beta, 2712.0 / (2712.0 + 4479.96501260212 + 100.0));
}

#[rstest]
fn missing_probe_propagates(builder: DemoArrayBuilder) {
    let dropped = builder.address_of("cgII00007");
    let mut source = builder.source(1);
    let sample_id = builder.sample(0).sample_id();
    source
        .intensities
        .get_mut(&sample_id)
        .unwrap()
        .retain(|(address, _)| *address != dropped);

    let (report, _) = run(PipelineConfig::default(), &source);
    let container = &report.containers[0];
    for stage in [
        Stage::RawMethylated,
        Stage::NoobUnmethylated,
        Stage::Beta,
        Stage::MValue,
    ] {
        assert_eq!(container.table(stage).unwrap().get("cgII00007"), Some(None));
    }
    assert_eq!(
        container.table(Stage::Beta).unwrap().n_missing(),
        1
    );
    assert!(container.warnings().iter().any(|w| {
        matches!(w, SampleWarning::IncompleteProbes { probe_ids } if probe_ids.len() == 1)
    }));
}

#[rstest]
fn reapplying_noob_fit_is_noop(builder: DemoArrayBuilder) {
    let source = builder.source(1);
    let config = PipelineConfig::default().with_export(false);
    let (mut report, _) = run(config.clone(), &source);
    let container = &mut report.containers[0];
    assert_eq!(container.state(), SampleState::Valued);

    let fit = *container.noob_fit().unwrap();
    let before = container.table(Stage::NoobMethylated).unwrap().clone();
    let corrector = NoobCorrector::new(config.noob_params());
    assert_eq!(corrector.fit_sample(container).unwrap(), fit);
    corrector.apply(container, &fit).unwrap();
    corrector.apply(container, &fit).unwrap();
    assert_eq!(container.table(Stage::NoobMethylated).unwrap(), &before);
    assert!(container.table(Stage::Beta).is_some());

    let shifted = NoobFit {
        offset: fit.offset + 10.0,
        ..fit
    };
    corrector.apply(container, &shifted).unwrap();
    let after = container.table(Stage::NoobMethylated).unwrap();
    assert_ne!(after, &before);
    assert!(container.table(Stage::Beta).is_none());
    assert_eq!(container.state(), SampleState::Corrected);

    // Noob tables are always recomputed from raw.
    corrector.apply(container, &fit).unwrap();
    assert_eq!(container.table(Stage::NoobMethylated).unwrap(), &before);
}

#[rstest]
fn insufficient_out_of_band_skips_only_that_sample(builder: DemoArrayBuilder) {
    let mut source = builder.source(3);
    let red_type_i = builder
        .records()
        .into_iter()
        .filter(|r| r.chemistry == Chemistry::TypeIRed)
        .skip(80)
        .map(|r| r.address)
        .collect_vec();
    let sample_id = builder.sample(1).sample_id();
    source
        .intensities
        .get_mut(&sample_id)
        .unwrap()
        .retain(|(address, _)| !red_type_i.contains(address));

    let (report, exporter) = run(PipelineConfig::default(), &source);
    assert_eq!(report.n_processed(), 2);
    assert_eq!(report.n_failed(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.sample.sample_id(), sample_id);
    assert!(failure.error.is_sample_scoped());
    assert!(matches!(
        failure.error,
        ProcessingError::InsufficientControlData(InsufficientControlDataError {
            channel: Channel::Green,
            found: 80,
            required: 200,
        })
    ));

    let exported = exporter
        .views
        .iter()
        .map(|v| v.sample.sample_id())
        .collect_vec();
    assert_eq!(exported, vec![
        builder.sample(0).sample_id(),
        builder.sample(2).sample_id()
    ]);
}

#[rstest]
fn degenerate_background_is_offset_only(builder: DemoArrayBuilder) {
    let mut source = builder.source(1);
    let red_type_i = builder
        .records()
        .into_iter()
        .filter(|r| r.chemistry == Chemistry::TypeIRed)
        .map(|r| r.address)
        .collect_vec();
    let sample_id = builder.sample(0).sample_id();
    for (address, value) in source.intensities.get_mut(&sample_id).unwrap() {
        if red_type_i.contains(address) {
            value.green = 300.0;
        }
    }

    let (report, _) = run(PipelineConfig::default(), &source);
    let container = &report.containers[0];
    let fit = container.noob_fit().unwrap();
    assert!(fit.green.is_degenerate());
    assert_eq!(fit.dye, DyeBias::identity());
    assert!(container.warnings().iter().any(|w| {
        matches!(w, SampleWarning::DegenerateBackground {
            channel: Channel::Green,
            ..
        })
    }));
}

#[rstest]
fn control_table_holds_exactly_control_probes(builder: DemoArrayBuilder) {
    let source = builder.source(1);
    let (report, _) = run(PipelineConfig::default(), &source);
    let container = &report.containers[0];

    let expected = builder
        .layout()
        .controls()
        .iter()
        .map(|c| c.probe_id.to_string())
        .sorted()
        .collect_vec();
    let controls = container.controls().unwrap();
    let actual = controls
        .probe_ids()
        .map(|id| id.to_string())
        .sorted()
        .collect_vec();
    assert_eq!(actual, expected);
    assert!(controls
        .rows()
        .iter()
        .all(|r| r.noob_green.is_some() && r.noob_red.is_some()));
    assert_eq!(controls.by_group().len(), 6);
}

#[rstest]
fn export_corrected_uncorrected_and_control(builder: DemoArrayBuilder) {
    let source = builder.source(2);
    let config = PipelineConfig::default()
        .with_save_uncorrected(true)
        .with_save_control(true);
    let (_, exporter) = run(config, &source);

    assert_eq!(exporter.views.len(), 2);
    for view in exporter.views.iter() {
        let uncorrected = view.uncorrected.as_ref().unwrap();
        assert_eq!(uncorrected.height(), view.processed.height());
        assert!(uncorrected
            .column("IlmnID")
            .unwrap()
            .as_materialized_series()
            .equals(
                view.processed
                    .column("IlmnID")
                    .unwrap()
                    .as_materialized_series()
            ));
        assert_eq!(view.processed.get_column_names_str(), vec![
            "IlmnID",
            "noob_meth",
            "noob_unmeth",
            "beta_value",
            "m_value"
        ]);
        assert_eq!(view.control.as_ref().unwrap().height(), 18);
        assert_eq!(view.snp.as_ref().unwrap().height(), 10);
    }
    let matrices = exporter.matrices.unwrap();
    assert_eq!(matrices.matrix(Stage::Beta).unwrap().n_samples(), 2);
    assert_eq!(
        matrices
            .control_data_frame()
            .unwrap()
            .unwrap()
            .height(),
        36
    );
}

#[rstest]
#[case::noob(
    true,
    "IlmnID,noob_meth,noob_unmeth,beta_value,m_value,meth,unmeth",
    &["noob_meth_values.csv", "noob_unmeth_values.csv"]
)]
#[case::raw(false, "IlmnID,meth,unmeth,beta_value,m_value", &[])]
fn csv_export_layout(
    builder: DemoArrayBuilder,
    #[case] noob: bool,
    #[case] expected_header: &str,
    #[case] noob_matrices: &[&str],
) {
    let dir = tempfile::tempdir().unwrap();
    let source = builder.source(2);
    let pipeline = Pipeline::from_manifest(
        PipelineConfig::default()
            .with_noob(noob)
            .with_save_control(true)
            .with_save_uncorrected(true),
        &source,
    )
    .unwrap();
    let mut exporter = CsvExporter::try_new(dir.path()).unwrap();
    let report = pipeline
        .run(&source.sheet, &source, &mut exporter)
        .unwrap();
    assert!(report.is_complete());

    let sample = builder.sample(0);
    let processed = exporter.processed_path(&sample);
    assert_eq!(
        processed,
        dir.path()
            .join(&sample.sentrix_id)
            .join(format!("{}_processed.csv", sample.sample_id()))
    );
    let header = std::fs::read_to_string(&processed)
        .unwrap()
        .lines()
        .next()
        .unwrap()
        .to_string();
    assert_eq!(header, expected_header);
    for name in [
        "beta_values.csv",
        "m_values.csv",
        "meth_values.csv",
        "unmeth_values.csv",
        "control_probes.csv",
        "sample_sheet_meta_data.csv",
    ]
    .iter()
    .chain(noob_matrices)
    {
        assert!(dir.path().join(name).exists(), "{} missing", name);
    }
    if !noob {
        assert!(!dir.path().join("noob_meth_values.csv").exists());
    }
}

#[rstest]
fn batch_fit_scope_shares_fit(builder: DemoArrayBuilder) {
    let source = builder.source(3);
    let sample_scope = PipelineConfig::default().with_export(false);
    let batch_scope = sample_scope
        .clone()
        .with_background_scope(FitScope::Batch)
        .with_dye_bias_scope(FitScope::Batch);

    let (per_sample, _) = run(sample_scope, &source);
    let (batched, _) = run(batch_scope, &source);

    let fits = |report: &RunReport| {
        report
            .containers
            .iter()
            .map(|c| *c.noob_fit().unwrap())
            .collect_vec()
    };
    let per_sample_fits = fits(&per_sample);
    let batched_fits = fits(&batched);
    assert!(batched_fits.iter().all_equal());
    assert!(!per_sample_fits.iter().all_equal());
    assert!(per_sample_fits[0].dye.red > per_sample_fits[2].dye.red);

    let betas_a = per_sample.matrices.matrix(Stage::Beta).unwrap();
    let betas_b = batched.matrices.matrix(Stage::Beta).unwrap();
    assert_ne!(betas_a, betas_b);
}

#[rstest]
fn dye_bias_only_batch_scope(builder: DemoArrayBuilder) {
    let source = builder.source(2);
    let config = PipelineConfig::default()
        .with_export(false)
        .with_dye_bias_scope(FitScope::Batch);
    let (report, _) = run(config, &source);
    let a = report.containers[0].noob_fit().unwrap();
    let b = report.containers[1].noob_fit().unwrap();
    assert_eq!(a.dye, b.dye);
    assert_ne!(a.red, b.red);
}

#[rstest]
#[case::single(Some(1))]
#[case::pairs(Some(2))]
#[case::uneven(Some(3))]
#[case::whole(Some(4))]
fn batch_size_does_not_change_results(
    builder: DemoArrayBuilder,
    #[case] batch_size: Option<usize>,
) {
    let source = builder.source(4);
    let (reference, _) = run(PipelineConfig::default(), &source);
    let (batched, _) = run(
        PipelineConfig::default().with_batch_size(batch_size),
        &source,
    );

    assert!(batched.containers.is_empty());
    for stage in [Stage::NoobMethylated, Stage::Beta, Stage::MValue] {
        assert_eq!(
            reference.matrices.matrix(stage),
            batched.matrices.matrix(stage)
        );
    }
}

#[rstest]
fn parallel_matches_sequential(builder: DemoArrayBuilder) {
    let source = builder.source(4);
    let (sequential, seq_export) = run(PipelineConfig::default(), &source);
    let (parallel, par_export) = run(PipelineConfig::default().with_parallel(true), &source);

    for stage in [Stage::NoobMethylated, Stage::Beta, Stage::MValue] {
        assert_eq!(
            sequential.matrices.matrix(stage),
            parallel.matrices.matrix(stage)
        );
    }
    let order = |e: &MemoryExporter| {
        e.views
            .iter()
            .map(|v| v.sample.sample_id())
            .collect_vec()
    };
    assert_eq!(order(&seq_export), order(&par_export));
}

#[rstest]
fn sample_name_selection(builder: DemoArrayBuilder) {
    let source = builder.source(4);
    let config = PipelineConfig::default().with_sample_name(Some(vec![
        "Sample3".to_string(),
        builder.sample(0).sample_id(),
    ]));
    let (report, exporter) = run(config, &source);
    assert_eq!(report.n_processed(), 2);
    let names = exporter
        .views
        .iter()
        .map(|v| v.sample.sample_name.clone())
        .collect_vec();
    assert_eq!(names, vec!["Sample1", "Sample3"]);

    let pipeline = Pipeline::from_manifest(
        PipelineConfig::default().with_sample_name(Some(vec!["Nope".to_string()])),
        &source,
    )
    .unwrap();
    let err = pipeline
        .run(&source.sheet, &source, &mut MemoryExporter::default())
        .unwrap_err();
    assert!(matches!(
        err,
        ProcessingError::Contract(ContractError::UnknownSamples(_))
    ));
}

#[rstest]
fn unresolved_address_aborts_run(builder: DemoArrayBuilder) {
    let mut source = builder.source(2);
    let sample_id = builder.sample(1).sample_id();
    source
        .intensities
        .get_mut(&sample_id)
        .unwrap()
        .push((7, ChannelIntensity::new(1.0, 1.0)));

    let pipeline = Pipeline::from_manifest(PipelineConfig::default(), &source).unwrap();
    let err = pipeline
        .run(&source.sheet, &source, &mut MemoryExporter::default())
        .unwrap_err();
    assert!(matches!(
        err,
        ProcessingError::Contract(ContractError::UnresolvedAddress { address: 7, .. })
    ));
    assert!(!err.is_sample_scoped());
}

#[rstest]
fn invalid_intensity_aborts_run(builder: DemoArrayBuilder) {
    let mut source = builder.source(1);
    let sample_id = builder.sample(0).sample_id();
    source.intensities.get_mut(&sample_id).unwrap()[0].1.red = f64::NAN;

    let pipeline = Pipeline::from_manifest(PipelineConfig::default(), &source).unwrap();
    let err = pipeline
        .run(&source.sheet, &source, &mut MemoryExporter::default())
        .unwrap_err();
    assert!(matches!(
        err,
        ProcessingError::Contract(ContractError::InvalidIntensity { .. })
    ));
}

#[rstest]
fn normalization_control_reference(builder: DemoArrayBuilder) {
    let source = builder.source(1);
    let config = PipelineConfig::default()
        .with_export(false)
        .with_dye_bias_reference(DyeBiasReference::NormalizationControls);
    let (report, _) = run(config, &source);
    let container = &report.containers[0];
    assert!(container
        .warnings()
        .iter()
        .all(|w| *w != SampleWarning::DyeBiasFallback));
    let fit = container.noob_fit().unwrap();
    // Red dye efficiency of the first sample is 0.7.
    assert!(fit.dye.red > fit.dye.green);
}

#[rstest]
fn csv_export_sheet_with_sample_id_column(builder: DemoArrayBuilder) {
    let dir = tempfile::tempdir().unwrap();
    let source = builder.source(2);
    let mut text = String::from("[Data]\nSample_ID,Sample_Name,Sentrix_ID,Sentrix_Position\n");
    for (idx, sample) in source.sheet.samples().iter().enumerate() {
        text.push_str(&format!(
            "lab-{},{},{},{}\n",
            idx, sample.sample_name, sample.sentrix_id, sample.sentrix_position
        ));
    }
    let sheet = CsvSampleSheet::read_from(text.as_bytes()).unwrap();

    let pipeline = Pipeline::from_manifest(PipelineConfig::default(), &source).unwrap();
    let mut exporter = CsvExporter::try_new(dir.path()).unwrap();
    let report = pipeline
        .run(&sheet, &source, &mut exporter)
        .unwrap();
    assert_eq!(report.n_processed(), 2);

    let meta = std::fs::read_to_string(dir.path().join("sample_sheet_meta_data.csv")).unwrap();
    let mut lines = meta.lines();
    assert_eq!(
        lines.next(),
        Some("Sample_ID,Sample_Name,Sentrix_ID,Sentrix_Position,meta_Sample_ID")
    );
    let first = lines.next().unwrap();
    assert!(first.starts_with(&builder.sample(0).sample_id()));
    assert!(first.ends_with("lab-0"));
}
