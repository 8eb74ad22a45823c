use crate::analyzer::JoinReport;
use crate::models::{EnrollmentRecord, StateSummary, UpdateRecord};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Everything the presentation side consumes, produced by one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub summary: Vec<StateSummary>,
    pub enrollment: Vec<EnrollmentRecord>,
    pub updates: Vec<UpdateRecord>,
    pub join_report: JoinReport,
}

/// Identity of the source files: per-file length and modification time.
/// Two fingerprints compare equal iff no source changed in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFingerprint(Vec<(PathBuf, u64, SystemTime)>);

impl SourceFingerprint {
    pub fn of<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let metadata = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat source file: {}", path.display()))?;
            let modified = metadata
                .modified()
                .with_context(|| format!("No modification time for: {}", path.display()))?;
            entries.push((path.to_path_buf(), metadata.len(), modified));
        }
        Ok(Self(entries))
    }
}

/// Session-lifetime cache for the pipeline result, keyed by source identity.
/// Replaces first-call memoization: a changed source file invalidates the
/// entry instead of going silently stale. Recomputation is idempotent, so a
/// lost race in a hypothetical multi-user setting would waste work, not
/// corrupt anything.
#[derive(Default)]
pub struct PipelineCache {
    entry: Option<(SourceFingerprint, Arc<PipelineResult>)>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(
        &mut self,
        fingerprint: SourceFingerprint,
        compute: F,
    ) -> Result<Arc<PipelineResult>>
    where
        F: FnOnce() -> Result<PipelineResult>,
    {
        if let Some((cached_fingerprint, result)) = &self.entry {
            if *cached_fingerprint == fingerprint {
                debug!("pipeline cache hit");
                return Ok(Arc::clone(result));
            }
            info!("source files changed, recomputing pipeline");
        }

        let result = Arc::new(compute()?);
        self.entry = Some((fingerprint, Arc::clone(&result)));
        Ok(result)
    }
}
