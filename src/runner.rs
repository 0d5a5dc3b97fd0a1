use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{ModelId, RankingEntry, SourceKind};
use crate::error::AlphaPickleError;
use crate::export::{write_pae_csv, write_plddt_attributes, write_plddt_csv};
use crate::loaders::{ContainerLoader, MetadataLoader, PaeJsonLoader, StructureLoader, loader_for};
use crate::manifest::RankingManifest;
use crate::plot::{PlotOptions, write_pae_plot, write_plddt_plot};
use crate::record::{Artifact, MetadataRecord};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunOptions {
    pub plot: PlotOptions,
    /// Worker threads for batch runs; 1 processes ranks sequentially.
    pub jobs: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            plot: PlotOptions::default(),
            jobs: 1,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<(), AlphaPickleError> {
        self.plot.validate().map_err(AlphaPickleError::InvalidOption)?;
        if self.jobs == 0 {
            return Err(AlphaPickleError::InvalidOption(
                "jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

/// Receives progress messages; shared by all batch workers.
pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactFile {
    pub artifact: Artifact,
    pub path: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub source: PathBuf,
    pub kind: SourceKind,
    pub output_basename: String,
    pub residues: usize,
    pub has_plddt: bool,
    pub has_pae: bool,
    pub artifacts: Vec<ArtifactFile>,
}

/// Outcome of one manifest entry; failures stay attached to their rank.
#[derive(Debug)]
pub struct RankOutcome {
    pub entry: RankingEntry,
    pub source: PathBuf,
    pub outcome: Result<ProcessResult, AlphaPickleError>,
}

#[derive(Debug)]
pub struct BatchResult {
    pub directory: PathBuf,
    pub jobs: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Sorted by rank.
    pub ranks: Vec<RankOutcome>,
}

impl BatchResult {
    pub fn failed(&self) -> usize {
        self.ranks.iter().filter(|rank| rank.outcome.is_err()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.ranks.len() - self.failed()
    }

    pub fn ensure_success(&self) -> Result<(), AlphaPickleError> {
        match self.failed() {
            0 => Ok(()),
            failed => Err(AlphaPickleError::BatchFailed {
                failed,
                total: self.ranks.len(),
            }),
        }
    }

    pub fn report(&self) -> BatchReport {
        BatchReport {
            directory: self.directory.clone(),
            jobs: self.jobs,
            started_at: self.started_at,
            finished_at: self.finished_at,
            succeeded: self.succeeded(),
            failed: self.failed(),
            ranks: self
                .ranks
                .iter()
                .map(|rank| {
                    let (result, error) = match &rank.outcome {
                        Ok(result) => (Some(result.clone()), None),
                        Err(err) => (None, Some(err.to_string())),
                    };
                    RankReport {
                        rank: rank.entry.rank,
                        model_id: rank.entry.model_id.clone(),
                        score: rank.entry.score,
                        source: rank.source.clone(),
                        result,
                        error,
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub directory: PathBuf,
    pub jobs: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: usize,
    pub failed: usize,
    pub ranks: Vec<RankReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankReport {
    pub rank: u32,
    pub model_id: ModelId,
    pub score: Option<f64>,
    pub source: PathBuf,
    pub result: Option<ProcessResult>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Runner {
    options: RunOptions,
}

impl Runner {
    pub fn new(options: RunOptions) -> Result<Self, AlphaPickleError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Results container: pLDDT CSV, attribute file and plot, plus PAE CSV and plot when present.
    pub fn process_container(
        &self,
        path: &Path,
        rank: Option<u32>,
        sink: &dyn ProgressSink,
    ) -> Result<ProcessResult, AlphaPickleError> {
        self.process_with(&ContainerLoader, path, rank, sink)
    }

    pub fn process_structure(
        &self,
        path: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<ProcessResult, AlphaPickleError> {
        self.process_with(&StructureLoader, path, None, sink)
    }

    pub fn process_pae_json(
        &self,
        path: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<ProcessResult, AlphaPickleError> {
        self.process_with(&PaeJsonLoader, path, None, sink)
    }

    pub fn process_file(
        &self,
        kind: SourceKind,
        path: &Path,
        rank: Option<u32>,
        sink: &dyn ProgressSink,
    ) -> Result<ProcessResult, AlphaPickleError> {
        self.process_with(loader_for(kind).as_ref(), path, rank, sink)
    }

    /// Processes `result_<model>.pkl` for every ranked model listed in the
    /// directory's `ranking_debug.json`.
    pub fn process_directory(
        &self,
        directory: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<BatchResult, AlphaPickleError> {
        let started_at = Utc::now();
        let entries = RankingManifest::read(directory)?.into_entries();
        let jobs = self.options.jobs.max(1);
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; {} ranked models, {jobs} worker(s)", entries.len()),
            elapsed: None,
        });

        let task = |entry: &RankingEntry| self.process_rank(directory, entry, sink);
        let mut ranks: Vec<RankOutcome> = if jobs == 1 {
            entries.iter().map(task).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .thread_name(|index| format!("alphapickle-worker-{index}"))
                .build()
                .map_err(|err| AlphaPickleError::WorkerPool(err.to_string()))?;
            pool.install(|| entries.par_iter().map(task).collect())
        };
        ranks.sort_by_key(|rank| rank.entry.rank);

        let result = BatchResult {
            directory: directory.to_path_buf(),
            jobs,
            started_at,
            finished_at: Utc::now(),
            ranks,
        };
        info!(
            directory = %directory.display(),
            succeeded = result.succeeded(),
            failed = result.failed(),
            "batch finished"
        );
        Ok(result)
    }

    fn process_rank(
        &self,
        directory: &Path,
        entry: &RankingEntry,
        sink: &dyn ProgressSink,
    ) -> RankOutcome {
        let source = directory.join(entry.model_id.result_file_name());
        let outcome = self.process_container(&source, Some(entry.rank), sink);
        if let Err(err) = &outcome {
            warn!(rank = entry.rank, model = %entry.model_id, error = %err, "ranked model failed");
            sink.event(ProgressEvent {
                message: format!("phase=Failed; rank {} ({}): {err}", entry.rank, entry.model_id),
                elapsed: None,
            });
        }
        RankOutcome {
            entry: entry.clone(),
            source,
            outcome,
        }
    }

    fn process_with(
        &self,
        loader: &dyn MetadataLoader,
        path: &Path,
        rank: Option<u32>,
        sink: &dyn ProgressSink,
    ) -> Result<ProcessResult, AlphaPickleError> {
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Load; {} {}", loader.kind(), path.display()),
            elapsed: None,
        });
        let record = loader.load(path, rank)?;

        sink.event(ProgressEvent {
            message: format!("phase=Export; {}", record.output_basename()),
            elapsed: None,
        });
        let artifacts = self.export(&record)?;

        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; {} ({} artifacts)",
                record.output_basename(),
                artifacts.len()
            ),
            elapsed: Some(start.elapsed()),
        });
        info!(
            source = %path.display(),
            basename = record.output_basename(),
            residues = record.residue_count(),
            "processed"
        );
        Ok(ProcessResult {
            source: path.to_path_buf(),
            kind: loader.kind(),
            output_basename: record.output_basename().to_string(),
            residues: record.residue_count(),
            has_plddt: record.residue_confidence().is_some(),
            has_pae: record.pairwise_error().is_some(),
            artifacts,
        })
    }

    fn export(&self, record: &MetadataRecord) -> Result<Vec<ArtifactFile>, AlphaPickleError> {
        let plot = &self.options.plot;
        let mut artifacts = Vec::new();
        if record.residue_confidence().is_some() {
            artifacts.push(ArtifactFile {
                artifact: Artifact::PlddtCsv,
                path: write_plddt_csv(record)?,
            });
            artifacts.push(ArtifactFile {
                artifact: Artifact::PlddtAttributes,
                path: write_plddt_attributes(record)?,
            });
            artifacts.push(ArtifactFile {
                artifact: Artifact::PlddtPlot,
                path: write_plddt_plot(record, plot)?,
            });
        }
        if record.pairwise_error().is_some() {
            artifacts.push(ArtifactFile {
                artifact: Artifact::PaeCsv,
                path: write_pae_csv(record)?,
            });
            artifacts.push(ArtifactFile {
                artifact: Artifact::PaePlot,
                path: write_pae_plot(record, plot)?,
            });
        }
        Ok(artifacts)
    }
}
