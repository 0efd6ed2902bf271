use std::fs::File;
use std::io::{
    BufRead,
    BufReader,
    Read,
};
use std::path::{
    Path,
    PathBuf,
};

use anyhow::{
    anyhow,
    Context,
};
use itertools::Itertools;
use log::{
    debug,
    info,
};
use serde::Deserialize;

use super::{
    IntensitySource,
    ManifestSource,
    SampleSheetSource,
};
use crate::data_structs::layout::ProbeRecord;
use crate::data_structs::sample_sheet::{
    Sample,
    SampleSheet,
};
use crate::data_structs::signal::ChannelIntensity;
use crate::data_structs::typedef::{
    IntensityType,
    ProbeAddress,
    ProbeId,
};
use crate::data_structs::{
    Allele,
    Channel,
    Chemistry,
};

#[derive(Debug, Deserialize)]
struct ManifestRow {
    #[serde(rename = "AddressID")]
    address:       ProbeAddress,
    #[serde(rename = "IlmnID")]
    probe_id:      String,
    #[serde(rename = "Chemistry")]
    chemistry:     Chemistry,
    #[serde(rename = "Channel", default)]
    channel:       Option<Channel>,
    #[serde(rename = "Allele", default)]
    allele:        Option<Allele>,
    #[serde(rename = "Control_Type", default)]
    control_group: Option<String>,
    #[serde(rename = "SNP", default)]
    snp:           Option<bool>,
}

impl From<ManifestRow> for ProbeRecord {
    fn from(row: ManifestRow) -> Self {
        ProbeRecord {
            address:       row.address,
            probe_id:      ProbeId::from(row.probe_id),
            chemistry:     row.chemistry,
            channel:       row
                .channel
                .unwrap_or_else(|| row.chemistry.expected_channel()),
            allele:        row.allele.unwrap_or(Allele::Both),
            control_group: row.control_group.filter(|g| !g.is_empty()),
            snp:           row.snp.unwrap_or(false),
        }
    }
}

/// Manifest stored as CSV with the columns `AddressID`, `IlmnID`,
/// `Chemistry`, `Channel`, `Allele`, `Control_Type` and `SNP`. Only the
/// first three are required.
#[derive(Debug, Clone)]
pub struct CsvManifest {
    path: PathBuf,
}

impl CsvManifest {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn read_from<R: Read>(reader: R) -> anyhow::Result<Vec<ProbeRecord>> {
        let mut reader = csv::Reader::from_reader(reader);
        reader
            .deserialize::<ManifestRow>()
            .enumerate()
            .map(|(line, row)| {
                row.map(ProbeRecord::from)
                    .with_context(|| format!("manifest row {}", line + 1))
            })
            .collect()
    }
}

impl ManifestSource for CsvManifest {
    fn probe_records(&self) -> anyhow::Result<Vec<ProbeRecord>> {
        let file = File::open(&self.path)
            .with_context(|| format!("opening manifest {}", self.path.display()))?;
        let records = Self::read_from(BufReader::new(file))?;
        info!(
            "Read {} manifest records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
struct IntensityRow {
    #[serde(rename = "AddressID")]
    address: ProbeAddress,
    #[serde(rename = "Grn")]
    green:   IntensityType,
    #[serde(rename = "Red")]
    red:     IntensityType,
}

/// Decoded intensities stored as `<dir>/<sample_id>.csv` with the columns
/// `AddressID`, `Grn` and `Red`.
#[derive(Debug, Clone)]
pub struct CsvIntensities {
    dir: PathBuf,
}

impl CsvIntensities {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn sample_path(
        &self,
        sample: &Sample,
    ) -> PathBuf {
        self.dir
            .join(format!("{}.csv", sample.sample_id()))
    }

    pub fn read_from<R: Read>(
        reader: R
    ) -> anyhow::Result<Vec<(ProbeAddress, ChannelIntensity)>> {
        let mut reader = csv::Reader::from_reader(reader);
        reader
            .deserialize::<IntensityRow>()
            .map(|row| {
                row.map(|r| (r.address, ChannelIntensity::new(r.green, r.red)))
                    .map_err(anyhow::Error::from)
            })
            .collect()
    }
}

impl IntensitySource for CsvIntensities {
    fn channel_intensities(
        &self,
        sample: &Sample,
    ) -> anyhow::Result<Vec<(ProbeAddress, ChannelIntensity)>> {
        let path = self.sample_path(sample);
        let file = File::open(&path)
            .with_context(|| format!("opening intensities {}", path.display()))?;
        let rows = Self::read_from(BufReader::new(file))
            .with_context(|| format!("reading intensities {}", path.display()))?;
        debug!("Read {} addresses from {}", rows.len(), path.display());
        Ok(rows)
    }
}

/// Illumina-style sample sheet. Lines up to and including a `[Data]`
/// section marker are skipped. `Sentrix_ID` and `Sentrix_Position` are
/// required, `Sample_Name` is optional and every other column becomes
/// sample metadata.
#[derive(Debug, Clone)]
pub struct CsvSampleSheet {
    path: PathBuf,
}

impl CsvSampleSheet {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn read_from<R: BufRead>(reader: R) -> anyhow::Result<SampleSheet> {
        let lines = reader.lines().collect::<Result<Vec<_>, _>>()?;
        let data_start = lines
            .iter()
            .position(|l| l.trim_start().starts_with("[Data]"))
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let body = lines[data_start..].join("\n");

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(body.as_bytes());
        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| anyhow!("sample sheet has no '{}' column", name))
        };
        let id_col = column("Sentrix_ID")?;
        let pos_col = column("Sentrix_Position")?;
        let name_col = column("Sample_Name").ok();

        let mut samples = Vec::new();
        for record in reader.records() {
            let record = record?;
            let field = |idx: usize| record.get(idx).unwrap_or_default();
            if field(id_col).is_empty() {
                continue;
            }
            let mut sample = Sample::new(field(id_col), field(pos_col));
            if let Some(name) = name_col.map(field).filter(|n| !n.is_empty()) {
                sample = sample.with_name(name);
            }
            for (idx, key) in headers.iter().enumerate() {
                if [Some(id_col), Some(pos_col), name_col].contains(&Some(idx))
                    || key.is_empty()
                {
                    continue;
                }
                let value = field(idx);
                if !value.is_empty() {
                    sample = sample.with_meta(key, value);
                }
            }
            samples.push(sample);
        }
        let duplicated = samples
            .iter()
            .map(Sample::sample_id)
            .duplicates()
            .collect_vec();
        if !duplicated.is_empty() {
            return Err(anyhow!("duplicated samples in sheet: {:?}", duplicated));
        }
        Ok(SampleSheet::new(samples))
    }
}

impl SampleSheetSource for CsvSampleSheet {
    fn samples(&self) -> anyhow::Result<SampleSheet> {
        let file = File::open(&self.path)
            .with_context(|| format!("opening sample sheet {}", self.path.display()))?;
        let sheet = Self::read_from(BufReader::new(file))?;
        info!("Read {} samples from {}", sheet.len(), self.path.display());
        Ok(sheet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structs::layout::ProbeLayoutIndex;

    #[test]
    fn test_manifest_csv() {
        let data = "\
AddressID,IlmnID,Chemistry,Channel,Allele,Control_Type,SNP
10,cg01,II,,,,
20,cg02,IR,Red,U,,
21,cg02,IR,Red,M,,
30,rs01,II,,,,true
50,NORM_A.1,Control,,,NORM_A,
";
        let records = CsvManifest::read_from(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[0].channel, Channel::Both);
        assert_eq!(records[2].allele, Allele::Methylated);
        assert!(records[3].snp);
        assert_eq!(records[4].control_group.as_deref(), Some("NORM_A"));

        let layout = ProbeLayoutIndex::try_from_records(records).unwrap();
        assert_eq!(layout.cpg().len(), 2);
    }

    #[test]
    fn test_intensities_csv() {
        let data = "AddressID,Grn,Red\n10,2712,4479.96501260212\n20,0,65535\n";
        let rows = CsvIntensities::read_from(data.as_bytes()).unwrap();
        assert_eq!(rows[0], (10, ChannelIntensity::new(2712.0, 4479.96501260212)));
        assert!(rows[1].1.is_saturated());
    }

    #[test]
    fn test_sample_sheet_with_header_section() {
        let data = "\
[Header]
Investigator Name,someone
[Data]
Sample_Name,Sample_Group,Sentrix_ID,Sentrix_Position
AdultLiver1,adult,9247377085,R04C02
,fetal,9247377093,R02C01
";
        let sheet = CsvSampleSheet::read_from(data.as_bytes()).unwrap();
        assert_eq!(sheet.len(), 2);
        let first = &sheet.samples()[0];
        assert_eq!(first.sample_name, "AdultLiver1");
        assert_eq!(first.metadata.get("Sample_Group").map(String::as_str), Some("adult"));
        assert_eq!(sheet.samples()[1].sample_name, "9247377093_R02C01");
    }

    #[test]
    fn test_sample_sheet_with_sample_id_column() {
        let data = "\
[Data]
Sample_ID,Sample_Name,Sentrix_ID,Sentrix_Position
liver-1,AdultLiver1,9247377085,R04C02
liver-2,FetalLiver1,9247377093,R02C01
";
        let sheet = CsvSampleSheet::read_from(data.as_bytes()).unwrap();
        let first = &sheet.samples()[0];
        assert_eq!(first.sample_id(), "9247377085_R04C02");
        assert_eq!(first.metadata.get("Sample_ID").map(String::as_str), Some("liver-1"));

        let df = sheet.to_data_frame().unwrap();
        assert_eq!(df.width(), 5);
        assert!(df.column("meta_Sample_ID").is_ok());
    }

    #[test]
    fn test_sample_sheet_requires_sentrix_columns() {
        let data = "Sample_Name,Sentrix_ID\nA,1\n";
        assert!(CsvSampleSheet::read_from(data.as_bytes()).is_err());
    }
}
