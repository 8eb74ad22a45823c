mod analyzer;
mod cache;
mod loader;
mod models;
mod outlier;

use analyzer::{NationalKpis, StateAggregator, StressLevel};
use anyhow::{Context, Result};
use cache::{PipelineCache, PipelineResult, SourceFingerprint};
use clap::{Arg, Command};
use loader::{RecordLoader, StateBoundaries};
use models::{BoundarySourceMode, Config};
use outlier::{annotate_summary, RobustDistanceDetector};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Display cap for the anomaly audit listing.
const AUDIT_DISPLAY_LIMIT: usize = 3;
const PRIORITY_STATE_LIMIT: usize = 10;
const DRILLDOWN_DISTRICT_LIMIT: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env).init();

    let matches = Command::new("uidai-analyzer")
        .version("1.0")
        .about("Analyzes UIDAI enrollment and update load by state")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("state")
                .short('s')
                .long("state")
                .value_name("NAME")
                .help("State for the drilldown view (overrides the config)"),
        )
        .get_matches();

    let config_file = matches.get_one::<String>("config").unwrap();

    // Load or create configuration
    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        let default_config = Config::default();
        default_config.save_to_file(config_file)?;
        println!(
            "⚠️  Please review {} and point it at your data files, then run the program again.",
            config_file
        );
        return Ok(());
    };

    let data_dir = config.data_directory.as_deref().unwrap_or("data-source");
    let output_dir = config.output_directory.as_deref().unwrap_or("output");

    fs::create_dir_all(output_dir)?;
    clean_output_directory(output_dir)?;

    let enrollment_path = Path::new(data_dir).join(&config.enrollment_file);
    let update_paths: Vec<PathBuf> = config
        .update_files
        .iter()
        .map(|name| Path::new(data_dir).join(name))
        .collect();

    println!("📂 Reading source tables from: {}", data_dir);
    println!("📄 Output directory: {} (cleaned)", output_dir);

    let loader = RecordLoader::new();

    // Boundary asset is only needed for the coverage report; numeric results
    // do not depend on it.
    let boundaries = load_boundaries(&loader, &config).await?;
    println!("🗺️  Boundary asset: {} named features", boundaries.len());

    let mut source_paths: Vec<PathBuf> = vec![enrollment_path.clone()];
    source_paths.extend(update_paths.iter().cloned());
    let fingerprint = SourceFingerprint::of(&source_paths)?;

    let mut pipeline_cache = PipelineCache::new();
    let result = pipeline_cache.get_or_compute(fingerprint, || {
        run_pipeline(&loader, &enrollment_path, &update_paths)
    })?;

    if result.summary.is_empty() {
        println!("❌ The enrollment/update join produced no rows.");
        println!("   Check that both sources cover the same states.");
        return Ok(());
    }

    let aggregator = StateAggregator;
    let kpis = aggregator.national_kpis(&result.summary)?;

    let drilldown_state = matches
        .get_one::<String>("state")
        .cloned()
        .or_else(|| config.drilldown_state.clone())
        .map(|name| models::canonicalize_state(&name));

    print_summary(&result, &kpis, &aggregator, drilldown_state.as_deref());
    print_boundary_coverage(&result, &boundaries);

    generate_summary_csv(&result, &aggregator, output_dir)?;
    generate_priority_report(&result, &aggregator, output_dir)?;
    generate_boundary_report(&result, &boundaries, output_dir)?;
    if let Some(state) = drilldown_state.as_deref() {
        generate_drilldown_csv(&result, &aggregator, state, output_dir)?;
    }

    println!("\n✅ Analysis complete!");
    println!("📂 Reports written to: {}", output_dir);
    Ok(())
}

async fn load_boundaries(loader: &RecordLoader, config: &Config) -> Result<StateBoundaries> {
    match config.boundary_mode {
        BoundarySourceMode::Local => {
            let path = config
                .boundary_file
                .as_deref()
                .context("boundary_mode is \"local\" but boundary_file is not set")?;
            loader.load_boundaries_file(Path::new(path))
        }
        BoundarySourceMode::Internet => {
            let url = config
                .boundary_url
                .as_deref()
                .context("boundary_mode is \"internet\" but boundary_url is not set")?;
            loader.fetch_boundaries(url).await
        }
    }
}

fn run_pipeline(
    loader: &RecordLoader,
    enrollment_path: &Path,
    update_paths: &[PathBuf],
) -> Result<PipelineResult> {
    let enrollment = loader.load_enrollment(enrollment_path)?;
    let updates = loader.load_updates(update_paths)?;

    let (mut summary, join_report) = StateAggregator.build_summary(&enrollment, &updates);
    annotate_summary(&RobustDistanceDetector::default(), &mut summary);

    Ok(PipelineResult {
        summary,
        enrollment,
        updates,
        join_report,
    })
}

fn print_summary(
    result: &PipelineResult,
    kpis: &NationalKpis,
    aggregator: &StateAggregator,
    drilldown_state: Option<&str>,
) {
    println!("\n📊 NATIONAL SUMMARY");
    println!("===================\n");
    println!(
        "   Source rows:      {} enrollment, {} update",
        result.enrollment.len(),
        result.updates.len()
    );
    println!("   Enrollments:      {}", kpis.total_enrollment);
    println!("   Updates:          {}", kpis.total_updates);
    println!("   Top burden state: {}", kpis.top_burden_state);
    println!("   Infants (0-5):    {}", kpis.infant_count);
    println!("   % age 0-5:        {:.1}%", kpis.infant_share_pct);
    println!("   Saturation:       {:.1}% (adult share)", kpis.adult_saturation_pct);

    if !result.join_report.enrollment_only.is_empty() || !result.join_report.updates_only.is_empty()
    {
        println!(
            "\n⚠️  Join dropped {} state(s) only in enrollment, {} only in updates:",
            result.join_report.enrollment_only.len(),
            result.join_report.updates_only.len()
        );
        for state in &result.join_report.enrollment_only {
            println!("   - {} (enrollment only)", state);
        }
        for state in &result.join_report.updates_only {
            println!("   - {} (updates only)", state);
        }
    }

    println!("\n📈 Top priority states (by maintenance ratio):");
    for (i, row) in aggregator
        .priority_states(&result.summary, PRIORITY_STATE_LIMIT)
        .iter()
        .enumerate()
    {
        println!(
            "   {}. {} - ratio {:.4} ({} updates)",
            i + 1,
            row.state,
            row.ratio,
            row.total_updates
        );
    }

    println!("\n🔍 Anomaly audit:");
    let flagged: Vec<&str> = result
        .summary
        .iter()
        .filter(|s| s.anomalous)
        .map(|s| s.state.as_str())
        .take(AUDIT_DISPLAY_LIMIT)
        .collect();
    if flagged.is_empty() {
        println!("   No states flagged");
    } else {
        for state in flagged {
            println!("   AUDIT REQ: {}", state);
        }
    }

    if let Some(state) = drilldown_state {
        println!("\n🔎 Drilldown: {}", state);
        let districts = aggregator.top_districts(&result.enrollment, state, DRILLDOWN_DISTRICT_LIMIT);
        if districts.is_empty() {
            println!("   No enrollment records for this state");
        } else {
            for (district, total) in &districts {
                println!("   {} - {}", district, total);
            }
        }

        match aggregator.stress_level(&result.summary, state) {
            Some(StressLevel::Stress(ratio)) => {
                println!("   🚨 STRESS: ratio {:.4} above the national mean", ratio)
            }
            Some(StressLevel::Stable(ratio)) => {
                println!("   ✅ STABLE: ratio {:.4} at or below the national mean", ratio)
            }
            None => println!("   ❓ State not present in the summary table"),
        }
    }
}

fn print_boundary_coverage(result: &PipelineResult, boundaries: &StateBoundaries) {
    let missing = boundaries.missing(result.summary.iter().map(|s| s.state.as_str()));
    if missing.is_empty() {
        println!("\n🗺️  All summary states have a boundary feature");
    } else {
        println!(
            "\n🗺️  {} state(s) have no boundary feature (blank map areas):",
            missing.len()
        );
        for state in &missing {
            println!("   - {}", state);
        }
    }
}

fn generate_summary_csv(
    result: &PipelineResult,
    aggregator: &StateAggregator,
    output_dir: &str,
) -> Result<()> {
    use csv::Writer;

    let quadrants: std::collections::HashMap<String, analyzer::Quadrant> =
        aggregator.quadrants(&result.summary).into_iter().collect();

    let csv_path = Path::new(output_dir).join("state_summary.csv");
    let mut writer = Writer::from_path(csv_path)?;

    writer.write_record([
        "State",
        "Total_Enrollment",
        "Age_0_5",
        "Age_18_Greater",
        "Total_Updates",
        "Demo_Age_17_Plus",
        "Ratio",
        "Quadrant",
        "Anomalous",
    ])?;

    for row in &result.summary {
        let quadrant = quadrants.get(&row.state).map(|q| q.label()).unwrap_or("");
        writer.write_record(&[
            row.state.clone(),
            row.total_enrollment.to_string(),
            row.age_0_5.to_string(),
            row.age_18_greater.to_string(),
            row.total_updates.to_string(),
            row.demo_age_17_plus.to_string(),
            format!("{:.6}", row.ratio),
            quadrant.to_string(),
            if row.anomalous { "yes" } else { "no" }.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn generate_priority_report(
    result: &PipelineResult,
    aggregator: &StateAggregator,
    output_dir: &str,
) -> Result<()> {
    let mut content = String::new();
    content.push_str("Top Priority States by Maintenance Ratio\n");
    content.push_str("=========================================\n\n");

    for (i, row) in aggregator
        .priority_states(&result.summary, PRIORITY_STATE_LIMIT)
        .iter()
        .enumerate()
    {
        content.push_str(&format!(
            "{}. {}\n\
             Ratio: {:.6}\n\
             Total updates: {}\n\
             Total enrollment: {}\n\n",
            i + 1,
            row.state,
            row.ratio,
            row.total_updates,
            row.total_enrollment
        ));
    }

    fs::write(Path::new(output_dir).join("priority_states.txt"), content)?;
    Ok(())
}

fn generate_boundary_report(
    result: &PipelineResult,
    boundaries: &StateBoundaries,
    output_dir: &str,
) -> Result<()> {
    let missing = boundaries.missing(result.summary.iter().map(|s| s.state.as_str()));

    let mut content = String::new();
    content.push_str("Boundary Coverage Report\n");
    content.push_str("========================\n\n");
    content.push_str(&format!("Boundary features: {}\n", boundaries.len()));
    content.push_str(&format!("Summary states:    {}\n\n", result.summary.len()));

    if missing.is_empty() {
        content.push_str("Every summary state matches a boundary feature.\n");
    } else {
        content.push_str("States with no matching boundary feature:\n");
        for state in &missing {
            content.push_str(&format!("   - {}\n", state));
        }
    }

    fs::write(Path::new(output_dir).join("boundary_coverage.txt"), content)?;
    Ok(())
}

fn generate_drilldown_csv(
    result: &PipelineResult,
    aggregator: &StateAggregator,
    state: &str,
    output_dir: &str,
) -> Result<()> {
    use csv::Writer;

    let safe_name = state.replace('/', "_").replace(' ', "_");
    let csv_path = Path::new(output_dir).join(format!("{}_districts.csv", safe_name));
    let mut writer = Writer::from_path(csv_path)?;

    writer.write_record(["District", "Total_Enrollment"])?;
    for (district, total) in aggregator.top_districts(&result.enrollment, state, DRILLDOWN_DISTRICT_LIMIT)
    {
        writer.write_record(&[district, total.to_string()])?;
    }

    writer.flush()?;
    Ok(())
}

// Clean up previous results from output directory
fn clean_output_directory(output_dir: &str) -> Result<()> {
    let output_path = Path::new(output_dir);

    if !output_path.exists() {
        return Ok(());
    }

    let items_to_clean = [
        "state_summary.csv",
        "priority_states.txt",
        "boundary_coverage.txt",
    ];

    for item in &items_to_clean {
        let item_path = output_path.join(item);
        if item_path.exists() {
            fs::remove_file(&item_path)?;
        }
    }

    // stale drilldown files from earlier runs, whatever state they were for
    for entry in fs::read_dir(output_path)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if name.ends_with("_districts.csv") {
                fs::remove_file(entry.path())?;
            }
        }
    }

    Ok(())
}
