use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub drilldown_state: Option<String>,
    // Data source configuration
    pub data_directory: Option<String>,
    pub enrollment_file: String,
    pub update_files: Vec<String>,
    pub boundary_mode: BoundarySourceMode,
    pub boundary_file: Option<String>,
    pub boundary_url: Option<String>,
    pub output_directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BoundarySourceMode {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "internet")]
    Internet,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            drilldown_state: Some("NCT of Delhi".to_string()),
            data_directory: Some("data-source".to_string()),
            enrollment_file: "final_cleaned_polars_state_corrected.csv".to_string(),
            update_files: vec![
                "aadhar_data_part1_state_corrected.csv".to_string(),
                "aadhar_data_part2_state_corrected.csv".to_string(),
            ],
            boundary_mode: BoundarySourceMode::Internet,
            boundary_file: Some("india_state.geojson".to_string()),
            boundary_url: Some(
                "https://raw.githubusercontent.com/geohacker/india/master/state/india_state.geojson"
                    .to_string(),
            ),
            output_directory: Some("output".to_string()),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }
}

/// One row of the enrollment source table, per district.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub state: String,
    pub district: String,
    pub total_enrollment: u64,
    pub age_0_5: u64,
    pub age_18_greater: u64,
}

/// One row of the update source tables, per district. `total_updates` is
/// derived at load time from the two age-band counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub state: String,
    pub district: String,
    pub demo_age_5_17: u64,
    #[serde(rename = "demo_age_17_")]
    pub demo_age_17_plus: u64,
    #[serde(default)]
    pub total_updates: u64,
}

/// One row of the joined per-state summary table, keyed by canonical state name.
#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    pub state: String,
    pub total_enrollment: u64,
    pub age_0_5: u64,
    pub age_18_greater: u64,
    pub total_updates: u64,
    pub demo_age_17_plus: u64,
    pub ratio: f64,
    pub anomalous: bool,
}

/// Alias table for known historical/alternate state names. Keys are the
/// spelling as it comes out of the textual normalization (ampersand rewrite,
/// trim, title case), values are the canonical spelling used as the join key
/// and expected by the boundary asset's feature names.
const STATE_ALIASES: [(&str, &str); 5] = [
    ("Andaman And Nicobar Islands", "Andaman and Nicobar Islands"),
    ("Delhi", "NCT of Delhi"),
    ("Jammu And Kashmir", "Jammu and Kashmir"),
    ("Pondicherry", "Puducherry"),
    ("Dadra And Nagar Haveli", "Dadra and Nagar Haveli"),
];

/// Map a raw state name to its canonical spelling: rewrite `&` to `and`,
/// trim, title-case, then resolve through the alias table. Total and
/// idempotent; unknown names pass through title-cased.
pub fn canonicalize_state(raw: &str) -> String {
    let cleaned = raw.replace('&', "and");
    let titled = title_case(cleaned.trim());
    for (alias, canonical) in &STATE_ALIASES {
        if titled == *alias || titled.eq_ignore_ascii_case(canonical) {
            return (*canonical).to_string();
        }
    }
    titled
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl UpdateRecord {
    pub fn compute_total_updates(&mut self) {
        self.total_updates = self.demo_age_5_17 + self.demo_age_17_plus;
    }
}
