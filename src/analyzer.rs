use crate::models::{EnrollmentRecord, StateSummary, UpdateRecord};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct JoinReport {
    /// Canonical states present only in the enrollment source.
    pub enrollment_only: Vec<String>,
    /// Canonical states present only in the update source.
    pub updates_only: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NationalKpis {
    pub total_enrollment: u64,
    pub total_updates: u64,
    pub top_burden_state: String,
    pub infant_count: u64,
    pub infant_share_pct: f64,
    pub adult_saturation_pct: f64,
}

/// Quadrant of a state against the national medians of enrollment and
/// update volume, for the policy scatter view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    HighEnrollmentHighUpdates,
    HighEnrollmentLowUpdates,
    LowEnrollmentHighUpdates,
    LowEnrollmentLowUpdates,
}

impl Quadrant {
    pub fn label(&self) -> &'static str {
        match self {
            Quadrant::HighEnrollmentHighUpdates => "high-enrollment/high-updates",
            Quadrant::HighEnrollmentLowUpdates => "high-enrollment/low-updates",
            Quadrant::LowEnrollmentHighUpdates => "low-enrollment/high-updates",
            Quadrant::LowEnrollmentLowUpdates => "low-enrollment/low-updates",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum StressLevel {
    /// State ratio above the mean ratio across states.
    Stress(f64),
    Stable(f64),
}

pub struct StateAggregator;

#[derive(Default)]
struct EnrollmentTotals {
    total_enrollment: u64,
    age_0_5: u64,
    age_18_greater: u64,
}

#[derive(Default)]
struct UpdateTotals {
    total_updates: u64,
    demo_age_17_plus: u64,
}

impl StateAggregator {
    /// Group both record sets by canonical state, inner-join the aggregates
    /// and compute the per-state maintenance ratio. States present on only
    /// one side are dropped from the summary but reported back to the caller.
    ///
    /// The result is sorted by canonical state name.
    pub fn build_summary(
        &self,
        enrollment: &[EnrollmentRecord],
        updates: &[UpdateRecord],
    ) -> (Vec<StateSummary>, JoinReport) {
        let mut enrollment_by_state: BTreeMap<String, EnrollmentTotals> = BTreeMap::new();
        for record in enrollment {
            let totals = enrollment_by_state.entry(record.state.clone()).or_default();
            totals.total_enrollment += record.total_enrollment;
            totals.age_0_5 += record.age_0_5;
            totals.age_18_greater += record.age_18_greater;
        }

        let mut updates_by_state: BTreeMap<String, UpdateTotals> = BTreeMap::new();
        for record in updates {
            let totals = updates_by_state.entry(record.state.clone()).or_default();
            totals.total_updates += record.total_updates;
            totals.demo_age_17_plus += record.demo_age_17_plus;
        }

        let mut report = JoinReport::default();
        let mut summaries = Vec::new();

        for (state, e) in &enrollment_by_state {
            match updates_by_state.get(state) {
                Some(u) => {
                    // +1 keeps the ratio finite when a state has zero enrollment
                    let ratio = u.total_updates as f64 / (e.total_enrollment as f64 + 1.0);
                    summaries.push(StateSummary {
                        state: state.clone(),
                        total_enrollment: e.total_enrollment,
                        age_0_5: e.age_0_5,
                        age_18_greater: e.age_18_greater,
                        total_updates: u.total_updates,
                        demo_age_17_plus: u.demo_age_17_plus,
                        ratio,
                        anomalous: false,
                    });
                }
                None => report.enrollment_only.push(state.clone()),
            }
        }

        for state in updates_by_state.keys() {
            if !enrollment_by_state.contains_key(state) {
                report.updates_only.push(state.clone());
            }
        }

        if !report.enrollment_only.is_empty() || !report.updates_only.is_empty() {
            warn!(
                enrollment_only = report.enrollment_only.len(),
                updates_only = report.updates_only.len(),
                "join dropped states present in only one source"
            );
        }

        (summaries, report)
    }

    /// National headline figures. Saturation is the adult share of total
    /// enrollment, computed from the data rather than quoted.
    pub fn national_kpis(&self, summary: &[StateSummary]) -> Result<NationalKpis> {
        let top_burden = summary
            .iter()
            .max_by(|a, b| {
                a.ratio
                    .partial_cmp(&b.ratio)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .ok_or_else(|| anyhow!("Summary table is empty, no KPIs to compute"))?;

        let total_enrollment: u64 = summary.iter().map(|s| s.total_enrollment).sum();
        let total_updates: u64 = summary.iter().map(|s| s.total_updates).sum();
        let infant_count: u64 = summary.iter().map(|s| s.age_0_5).sum();
        let adult_count: u64 = summary.iter().map(|s| s.age_18_greater).sum();

        let (infant_share_pct, adult_saturation_pct) = if total_enrollment == 0 {
            (0.0, 0.0)
        } else {
            (
                infant_count as f64 / total_enrollment as f64 * 100.0,
                adult_count as f64 / total_enrollment as f64 * 100.0,
            )
        };

        Ok(NationalKpis {
            total_enrollment,
            total_updates,
            top_burden_state: top_burden.state.clone(),
            infant_count,
            infant_share_pct,
            adult_saturation_pct,
        })
    }

    /// Top `limit` states by maintenance ratio, descending.
    pub fn priority_states<'a>(
        &self,
        summary: &'a [StateSummary],
        limit: usize,
    ) -> Vec<&'a StateSummary> {
        let mut ranked: Vec<&StateSummary> = summary.iter().collect();
        ranked.sort_by(|a, b| {
            b.ratio
                .partial_cmp(&a.ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.state.cmp(&b.state))
        });
        ranked.truncate(limit);
        ranked
    }

    /// Classify each state against the median enrollment and update volume.
    pub fn quadrants(&self, summary: &[StateSummary]) -> Vec<(String, Quadrant)> {
        let enrollment_median = median(summary.iter().map(|s| s.total_enrollment as f64));
        let updates_median = median(summary.iter().map(|s| s.total_updates as f64));

        summary
            .iter()
            .map(|s| {
                let high_e = s.total_enrollment as f64 > enrollment_median;
                let high_u = s.total_updates as f64 > updates_median;
                let quadrant = match (high_e, high_u) {
                    (true, true) => Quadrant::HighEnrollmentHighUpdates,
                    (true, false) => Quadrant::HighEnrollmentLowUpdates,
                    (false, true) => Quadrant::LowEnrollmentHighUpdates,
                    (false, false) => Quadrant::LowEnrollmentLowUpdates,
                };
                (s.state.clone(), quadrant)
            })
            .collect()
    }

    /// Top `limit` districts of one canonical state by summed enrollment.
    pub fn top_districts(
        &self,
        enrollment: &[EnrollmentRecord],
        state: &str,
        limit: usize,
    ) -> Vec<(String, u64)> {
        let mut by_district: HashMap<String, u64> = HashMap::new();
        for record in enrollment.iter().filter(|r| r.state == state) {
            *by_district.entry(record.district.clone()).or_default() += record.total_enrollment;
        }

        let mut ranked: Vec<(String, u64)> = by_district.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    /// Compare one state's ratio against the mean ratio across all states.
    pub fn stress_level(&self, summary: &[StateSummary], state: &str) -> Option<StressLevel> {
        let row = summary.iter().find(|s| s.state == state)?;
        let mean = summary.iter().map(|s| s.ratio).sum::<f64>() / summary.len() as f64;
        if row.ratio > mean {
            Some(StressLevel::Stress(row.ratio))
        } else {
            Some(StressLevel::Stable(row.ratio))
        }
    }
}

fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::canonicalize_state;

    fn enrollment(state: &str, district: &str, total: u64, infant: u64, adult: u64) -> EnrollmentRecord {
        EnrollmentRecord {
            state: canonicalize_state(state),
            district: district.to_string(),
            total_enrollment: total,
            age_0_5: infant,
            age_18_greater: adult,
        }
    }

    fn update(state: &str, district: &str, young: u64, adult: u64) -> UpdateRecord {
        let mut record = UpdateRecord {
            state: canonicalize_state(state),
            district: district.to_string(),
            demo_age_5_17: young,
            demo_age_17_plus: adult,
            total_updates: 0,
        };
        record.compute_total_updates();
        record
    }

    #[test]
    fn delhi_alias_rows_aggregate_into_one_summary_row() {
        let enrollment_records = vec![
            enrollment("Delhi", "A", 100, 10, 80),
            enrollment("Delhi", "B", 200, 20, 150),
        ];
        let update_records = vec![update("Delhi", "A", 30, 20), update("Delhi", "B", 10, 5)];

        let (summary, report) =
            StateAggregator.build_summary(&enrollment_records, &update_records);

        assert_eq!(summary.len(), 1);
        let row = &summary[0];
        assert_eq!(row.state, "NCT of Delhi");
        assert_eq!(row.total_enrollment, 300);
        assert_eq!(row.age_0_5, 30);
        assert_eq!(row.age_18_greater, 230);
        assert_eq!(row.total_updates, 65);
        assert!((row.ratio - 65.0 / 301.0).abs() < 1e-12);
        assert!(report.enrollment_only.is_empty());
        assert!(report.updates_only.is_empty());
    }

    #[test]
    fn join_drops_one_sided_states_and_reports_them() {
        let enrollment_records = vec![
            enrollment("Kerala", "Kollam", 10, 1, 8),
            enrollment("Goa", "North Goa", 20, 2, 15),
        ];
        let update_records = vec![update("Kerala", "Kollam", 3, 2), update("Sikkim", "East", 1, 1)];

        let (summary, report) =
            StateAggregator.build_summary(&enrollment_records, &update_records);

        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].state, "Kerala");
        assert_eq!(report.enrollment_only, vec!["Goa".to_string()]);
        assert_eq!(report.updates_only, vec!["Sikkim".to_string()]);
    }

    #[test]
    fn summary_rows_bounded_by_smaller_side() {
        let enrollment_records = vec![
            enrollment("Kerala", "Kollam", 10, 1, 8),
            enrollment("Goa", "North Goa", 20, 2, 15),
            enrollment("Sikkim", "East", 5, 1, 3),
        ];
        let update_records = vec![update("Kerala", "Kollam", 3, 2)];

        let (summary, _) = StateAggregator.build_summary(&enrollment_records, &update_records);
        assert!(summary.len() <= 1);
    }

    #[test]
    fn ratio_is_finite_for_zero_enrollment() {
        let enrollment_records = vec![enrollment("Ladakh", "Leh", 0, 0, 0)];
        let update_records = vec![update("Ladakh", "Leh", 4, 3)];

        let (summary, _) = StateAggregator.build_summary(&enrollment_records, &update_records);
        assert_eq!(summary.len(), 1);
        assert!(summary[0].ratio.is_finite());
        assert!(summary[0].ratio >= 0.0);
        assert!((summary[0].ratio - 7.0).abs() < 1e-12);
    }

    #[test]
    fn summary_is_sorted_by_state_name() {
        let enrollment_records = vec![
            enrollment("West Bengal", "Howrah", 10, 1, 8),
            enrollment("Assam", "Kamrup", 20, 2, 15),
        ];
        let update_records = vec![
            update("West Bengal", "Howrah", 3, 2),
            update("Assam", "Kamrup", 1, 1),
        ];

        let (summary, _) = StateAggregator.build_summary(&enrollment_records, &update_records);
        let names: Vec<&str> = summary.iter().map(|s| s.state.as_str()).collect();
        assert_eq!(names, vec!["Assam", "West Bengal"]);
    }

    #[test]
    fn kpis_compute_saturation_from_data() {
        let enrollment_records = vec![
            enrollment("Kerala", "Kollam", 100, 10, 80),
            enrollment("Goa", "North Goa", 100, 30, 50),
        ];
        let update_records = vec![
            update("Kerala", "Kollam", 30, 20),
            update("Goa", "North Goa", 5, 5),
        ];

        let (summary, _) = StateAggregator.build_summary(&enrollment_records, &update_records);
        let kpis = StateAggregator.national_kpis(&summary).unwrap();

        assert_eq!(kpis.total_enrollment, 200);
        assert_eq!(kpis.total_updates, 60);
        assert_eq!(kpis.infant_count, 40);
        assert!((kpis.infant_share_pct - 20.0).abs() < 1e-9);
        assert!((kpis.adult_saturation_pct - 65.0).abs() < 1e-9);
        assert_eq!(kpis.top_burden_state, "Kerala");
    }

    #[test]
    fn kpis_fail_on_empty_summary() {
        assert!(StateAggregator.national_kpis(&[]).is_err());
    }

    #[test]
    fn priority_states_rank_by_ratio_descending() {
        let enrollment_records = vec![
            enrollment("Kerala", "Kollam", 100, 10, 80),
            enrollment("Goa", "North Goa", 100, 10, 80),
            enrollment("Assam", "Kamrup", 100, 10, 80),
        ];
        let update_records = vec![
            update("Kerala", "Kollam", 50, 0),
            update("Goa", "North Goa", 10, 0),
            update("Assam", "Kamrup", 30, 0),
        ];

        let (summary, _) = StateAggregator.build_summary(&enrollment_records, &update_records);
        let ranked = StateAggregator.priority_states(&summary, 2);
        let names: Vec<&str> = ranked.iter().map(|s| s.state.as_str()).collect();
        assert_eq!(names, vec!["Kerala", "Assam"]);
    }

    #[test]
    fn quadrants_split_around_medians() {
        let enrollment_records = vec![
            enrollment("Kerala", "Kollam", 1000, 10, 80),
            enrollment("Goa", "North Goa", 10, 1, 8),
            enrollment("Assam", "Kamrup", 500, 5, 40),
        ];
        let update_records = vec![
            update("Kerala", "Kollam", 500, 0),
            update("Goa", "North Goa", 1, 0),
            update("Assam", "Kamrup", 100, 0),
        ];

        let (summary, _) = StateAggregator.build_summary(&enrollment_records, &update_records);
        let quadrants = StateAggregator.quadrants(&summary);
        let lookup: HashMap<_, _> = quadrants.into_iter().collect();

        assert_eq!(
            lookup["Kerala"],
            Quadrant::HighEnrollmentHighUpdates
        );
        assert_eq!(lookup["Goa"], Quadrant::LowEnrollmentLowUpdates);
    }

    #[test]
    fn drilldown_ranks_districts_within_state() {
        let enrollment_records = vec![
            enrollment("Kerala", "Kollam", 100, 10, 80),
            enrollment("Kerala", "Kochi", 300, 30, 240),
            enrollment("Kerala", "Kollam", 50, 5, 40),
            enrollment("Goa", "North Goa", 999, 9, 900),
        ];

        let top = StateAggregator.top_districts(&enrollment_records, "Kerala", 5);
        assert_eq!(top, vec![("Kochi".to_string(), 300), ("Kollam".to_string(), 150)]);
    }

    #[test]
    fn stress_level_compares_against_mean_ratio() {
        let enrollment_records = vec![
            enrollment("Kerala", "Kollam", 100, 10, 80),
            enrollment("Goa", "North Goa", 100, 10, 80),
        ];
        let update_records = vec![
            update("Kerala", "Kollam", 90, 0),
            update("Goa", "North Goa", 10, 0),
        ];

        let (summary, _) = StateAggregator.build_summary(&enrollment_records, &update_records);

        match StateAggregator.stress_level(&summary, "Kerala") {
            Some(StressLevel::Stress(_)) => {}
            other => panic!("expected stress for Kerala, got {:?}", other),
        }
        match StateAggregator.stress_level(&summary, "Goa") {
            Some(StressLevel::Stable(_)) => {}
            other => panic!("expected stable for Goa, got {:?}", other),
        }
        assert!(StateAggregator.stress_level(&summary, "Sikkim").is_none());
    }
}
