use crate::models::StateSummary;

/// Expected fraction of rows flagged anomalous.
pub const CONTAMINATION: f64 = 0.04;

/// Flags anomalous rows given (enrollment, updates) points. Kept behind a
/// trait so the detection algorithm can be swapped without touching the
/// pipeline; callers may only rely on aggregate properties of the output,
/// not on which exact rows get flagged.
pub trait OutlierDetector {
    fn flag(&self, points: &[[f64; 2]]) -> Vec<bool>;
}

/// Distance-based detector: scores each point by its distance from the
/// per-dimension median, scaled by the interquartile range, and flags the
/// top `ceil(contamination * n)` scores. Deterministic, and never flags
/// every row.
pub struct RobustDistanceDetector {
    pub contamination: f64,
}

impl Default for RobustDistanceDetector {
    fn default() -> Self {
        Self {
            contamination: CONTAMINATION,
        }
    }
}

impl OutlierDetector for RobustDistanceDetector {
    fn flag(&self, points: &[[f64; 2]]) -> Vec<bool> {
        let n = points.len();
        if n == 0 {
            return Vec::new();
        }

        let center = [
            quantile(points.iter().map(|p| p[0]), 0.5),
            quantile(points.iter().map(|p| p[1]), 0.5),
        ];
        let scale = [
            iqr_scale(points.iter().map(|p| p[0])),
            iqr_scale(points.iter().map(|p| p[1])),
        ];

        let scores: Vec<f64> = points
            .iter()
            .map(|p| {
                let dx = (p[0] - center[0]) / scale[0];
                let dy = (p[1] - center[1]) / scale[1];
                (dx * dx + dy * dy).sqrt()
            })
            .collect();

        let flag_count = ((self.contamination * n as f64).ceil() as usize).min(n - 1);

        let mut ranked: Vec<usize> = (0..n).collect();
        ranked.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut flags = vec![false; n];
        for &index in ranked.iter().take(flag_count) {
            flags[index] = true;
        }
        flags
    }
}

/// Annotate the summary table in place with the detector's verdicts.
pub fn annotate_summary(detector: &dyn OutlierDetector, summary: &mut [StateSummary]) {
    let points: Vec<[f64; 2]> = summary
        .iter()
        .map(|s| [s.total_enrollment as f64, s.total_updates as f64])
        .collect();

    for (row, flagged) in summary.iter_mut().zip(detector.flag(&points)) {
        row.anomalous = flagged;
    }
}

fn quantile(values: impl Iterator<Item = f64>, q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let position = q * (sorted.len() - 1) as f64;
    let low = position.floor() as usize;
    let high = position.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        sorted[low] + (sorted[high] - sorted[low]) * (position - low as f64)
    }
}

fn iqr_scale(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let iqr = quantile(values.clone(), 0.75) - quantile(values, 0.25);
    // degenerate spread, fall back to unit scale
    if iqr > 0.0 {
        iqr
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_points(n: usize) -> Vec<[f64; 2]> {
        // a tight cluster with a couple of far-out rows mixed in
        (0..n)
            .map(|i| {
                if i % 17 == 0 {
                    [1_000_000.0 + i as f64, 500_000.0]
                } else {
                    [100.0 + (i % 7) as f64, 50.0 + (i % 5) as f64]
                }
            })
            .collect()
    }

    #[test]
    fn flag_count_tracks_contamination_rate() {
        for n in [10, 36, 100, 250] {
            let points = clustered_points(n);
            let flags = RobustDistanceDetector::default().flag(&points);
            let flagged = flags.iter().filter(|&&f| f).count();

            let expected = (CONTAMINATION * n as f64).ceil() as usize;
            assert_eq!(flagged, expected.min(n - 1), "n = {n}");
            assert!(flagged < n);
        }
    }

    #[test]
    fn empty_input_yields_no_flags() {
        let flags = RobustDistanceDetector::default().flag(&[]);
        assert!(flags.is_empty());
    }

    #[test]
    fn single_row_is_never_flagged() {
        let flags = RobustDistanceDetector::default().flag(&[[42.0, 7.0]]);
        assert_eq!(flags, vec![false]);
    }

    #[test]
    fn farthest_points_get_flagged_first() {
        let mut points = vec![[100.0, 50.0]; 49];
        points.push([1_000_000.0, 900_000.0]);

        let flags = RobustDistanceDetector::default().flag(&points);
        assert!(flags[49], "the far-out row should be flagged");
        assert_eq!(flags.iter().filter(|&&f| f).count(), 2);
    }

    #[test]
    fn identical_points_still_flag_fewer_than_all() {
        let points = vec![[5.0, 5.0]; 20];
        let flags = RobustDistanceDetector::default().flag(&points);
        let flagged = flags.iter().filter(|&&f| f).count();
        assert!(flagged < points.len());
    }
}
