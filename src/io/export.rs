use std::fs::{
    create_dir_all,
    File,
};
use std::path::{
    Path,
    PathBuf,
};

use anyhow::Context;
use log::{
    debug,
    info,
};
use polars::prelude::*;

use super::SampleExporter;
use crate::data_structs::container::ExportView;
use crate::data_structs::sample_sheet::Sample;
use crate::tools::pipeline::report::{
    matrix_name,
    RunMatrices,
};

/// Writes export views as CSV files under an output directory:
///
/// - `<out>/<sentrix_id>/<sample_id>_processed.csv`, with the uncorrected
///   signal appended when exported;
/// - `<out>/<sentrix_id>/<sample_id>_control.csv` and `..._snp.csv`;
/// - run matrices `<out>/beta_values.csv`, `m_values.csv`, ...,
///   `control_probes.csv` and `sample_sheet_meta_data.csv`.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    out_dir: PathBuf,
}

impl CsvExporter {
    pub fn try_new<P: AsRef<Path>>(out_dir: P) -> anyhow::Result<Self> {
        let out_dir = out_dir.as_ref().to_path_buf();
        create_dir_all(&out_dir)
            .with_context(|| format!("creating output directory {}", out_dir.display()))?;
        Ok(Self { out_dir })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn sample_dir(
        &self,
        sample: &Sample,
    ) -> PathBuf {
        self.out_dir.join(&sample.sentrix_id)
    }

    pub fn processed_path(
        &self,
        sample: &Sample,
    ) -> PathBuf {
        self.sample_dir(sample)
            .join(format!("{}_processed.csv", sample.sample_id()))
    }

    fn write_csv(
        path: &Path,
        df: &mut DataFrame,
    ) -> anyhow::Result<()> {
        let mut file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .finish(df)
            .with_context(|| format!("writing {}", path.display()))?;
        debug!("Wrote {} rows to {}", df.height(), path.display());
        Ok(())
    }
}

impl SampleExporter for CsvExporter {
    fn export_sample(
        &mut self,
        view: &ExportView,
    ) -> anyhow::Result<()> {
        let dir = self.sample_dir(&view.sample);
        create_dir_all(&dir)?;

        let mut processed = match &view.uncorrected {
            Some(uncorrected) => {
                let raw_columns = uncorrected
                    .get_columns()
                    .iter()
                    .skip(1)
                    .filter(|column| {
                        view.processed
                            .get_column_index(column.name().as_str())
                            .is_none()
                    })
                    .cloned()
                    .collect::<Vec<_>>();
                view.processed.hstack(&raw_columns)?
            },
            None => view.processed.clone(),
        };
        Self::write_csv(&self.processed_path(&view.sample), &mut processed)?;

        let sample_id = view.sample.sample_id();
        if let Some(control) = &view.control {
            let path = dir.join(format!("{}_control.csv", sample_id));
            Self::write_csv(&path, &mut control.clone())?;
        }
        if let Some(snp) = &view.snp {
            let path = dir.join(format!("{}_snp.csv", sample_id));
            Self::write_csv(&path, &mut snp.clone())?;
        }
        info!("Exported sample {} to {}", sample_id, dir.display());
        Ok(())
    }

    fn export_run(
        &mut self,
        matrices: &RunMatrices,
    ) -> anyhow::Result<()> {
        for (stage, matrix) in matrices.matrices() {
            let path = self
                .out_dir
                .join(format!("{}.csv", matrix_name(*stage)));
            Self::write_csv(&path, &mut matrix.to_data_frame()?)?;
        }
        if let Some(mut controls) = matrices.control_data_frame()? {
            Self::write_csv(&self.out_dir.join("control_probes.csv"), &mut controls)?;
        }
        let mut meta = matrices.sample_sheet().to_data_frame()?;
        Self::write_csv(
            &self.out_dir.join("sample_sheet_meta_data.csv"),
            &mut meta,
        )?;
        info!(
            "Exported run matrices of {} samples to {}",
            matrices.n_samples(),
            self.out_dir.display()
        );
        Ok(())
    }
}
