use crate::models::{canonicalize_state, EnrollmentRecord, UpdateRecord};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

/// Loads the flat-file record sources and the geographic boundary asset,
/// applying state-name canonicalization to every record as it comes in.
pub struct RecordLoader {
    client: reqwest::Client,
}

impl RecordLoader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Read one enrollment CSV. Missing file or missing/non-numeric declared
    /// columns fail the load; there is no partial recovery.
    pub fn load_enrollment(&self, path: &Path) -> Result<Vec<EnrollmentRecord>> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open enrollment file: {}", path.display()))?;

        let mut records = Vec::new();
        for row in reader.deserialize() {
            let mut record: EnrollmentRecord =
                row.with_context(|| format!("Malformed enrollment row in {}", path.display()))?;
            record.state = canonicalize_state(&record.state);
            records.push(record);
        }

        info!(file = %path.display(), rows = records.len(), "loaded enrollment records");
        Ok(records)
    }

    /// Read the update CSV parts and concatenate them in order. Each record
    /// gets its derived `total_updates` computed here.
    pub fn load_updates<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<UpdateRecord>> {
        let mut records = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let mut reader = csv::Reader::from_path(path)
                .with_context(|| format!("Failed to open update file: {}", path.display()))?;

            let before = records.len();
            for row in reader.deserialize() {
                let mut record: UpdateRecord =
                    row.with_context(|| format!("Malformed update row in {}", path.display()))?;
                record.state = canonicalize_state(&record.state);
                record.compute_total_updates();
                records.push(record);
            }
            info!(file = %path.display(), rows = records.len() - before, "loaded update records");
        }

        Ok(records)
    }

    /// Read the boundary asset from a local GeoJSON file.
    pub fn load_boundaries_file(&self, path: &Path) -> Result<StateBoundaries> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read boundary file: {}", path.display()))?;
        parse_boundaries(&content)
            .with_context(|| format!("Failed to parse boundary file: {}", path.display()))
    }

    /// Fetch the boundary asset over HTTP.
    pub async fn fetch_boundaries(&self, url: &str) -> Result<StateBoundaries> {
        info!(url, "fetching boundary asset");

        let response = self
            .client
            .get(url)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .with_context(|| format!("Failed to fetch boundary asset: {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Boundary asset request failed with status: {}",
                response.status()
            ));
        }

        let content = response
            .text()
            .await
            .with_context(|| format!("Failed to read boundary asset body from: {}", url))?;

        parse_boundaries(&content).with_context(|| format!("Failed to parse boundary asset: {}", url))
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: FeatureProperties,
}

#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    #[serde(rename = "NAME_1")]
    name_1: Option<String>,
}

/// The set of named polygon features in the boundary asset. Only the feature
/// names matter here; geometry is the map renderer's business.
#[derive(Debug, Clone)]
pub struct StateBoundaries {
    names: BTreeSet<String>,
}

impl StateBoundaries {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Canonical state names with no matching boundary feature. These render
    /// as blank map areas but their numbers are still correct.
    pub fn missing<'a>(&self, states: impl Iterator<Item = &'a str>) -> Vec<String> {
        states
            .filter(|state| !self.contains(state))
            .map(|state| state.to_string())
            .collect()
    }
}

pub fn parse_boundaries(content: &str) -> Result<StateBoundaries> {
    let collection: FeatureCollection =
        serde_json::from_str(content).context("Boundary asset is not a GeoJSON feature collection")?;

    let names = collection
        .features
        .into_iter()
        .filter_map(|feature| feature.properties.name_1)
        .collect();

    Ok(StateBoundaries { names })
}
