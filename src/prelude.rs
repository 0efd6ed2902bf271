pub use crate::data_structs::container::{
    ExportRequest,
    ExportView,
    SampleDataContainer,
    SampleWarning,
};
pub use crate::data_structs::control::{
    ControlRow,
    ControlTable,
};
pub use crate::data_structs::layout::{
    ProbeDesign,
    ProbeLayoutIndex,
    ProbeRecord,
};
pub use crate::data_structs::probe_table::{
    ProbeIndex,
    ProbeTable,
};
pub use crate::data_structs::sample_sheet::{
    Sample,
    SampleSheet,
};
pub use crate::data_structs::signal::{
    ChannelIntensity,
    RawSignalTable,
};
pub use crate::data_structs::typedef::{
    MaybeValue,
    ProbeAddress,
    ProbeId,
};
pub use crate::data_structs::{
    Allele,
    Channel,
    Chemistry,
    SampleState,
    Stage,
};
pub use crate::errors::{
    ContractError,
    IncompleteStageError,
    InsufficientControlDataError,
    ManifestIntegrityError,
    ProcessingError,
    ProcessingResult,
};
pub use crate::io::export::CsvExporter;
pub use crate::io::memory::{
    MemoryExporter,
    MemorySource,
};
pub use crate::io::readers::{
    CsvIntensities,
    CsvManifest,
    CsvSampleSheet,
};
pub use crate::io::{
    IntensitySource,
    ManifestSource,
    SampleExporter,
    SampleSheetSource,
};
pub use crate::tools::noob::{
    DyeBiasReference,
    FitScope,
    NoobCorrector,
    NoobFit,
    NoobParams,
};
pub use crate::tools::pipeline::{
    Pipeline,
    PipelineConfig,
    RunMatrices,
    RunReport,
    SampleFailure,
    StageMatrix,
};
