//! Stability subtest (spec §4.4.5): derives a subscore from a proxy's
//! bounded rolling history rather than from a live probe. Entries older
//! than an hour are the caller's responsibility to prune before calling in
//! (the store prunes on read, spec §9's "window queries over the results
//! table" resolution).

use serde_json::json;

use crate::validator::{HistoryEntry, SubtestOutcome};

/// Neutral prior for a proxy with no history yet (spec §4.4.5).
const EMPTY_HISTORY_SCORE: f64 = 70.0;

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn stdev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Runs the stability subtest. `full` selects between the "partial"
/// standard-level computation (success rate only) and the comprehensive
/// three-component formula (spec §4.4's table: "Stability | | partial | ✓").
pub fn run(history: &[HistoryEntry], full: bool) -> SubtestOutcome {
    if history.is_empty() {
        return SubtestOutcome {
            ok: true,
            subscore: EMPTY_HISTORY_SCORE,
            details: json!({ "history_len": 0, "note": "neutral prior, no history" }),
            error: None,
        };
    }

    let successes = history.iter().filter(|h| h.success).count();
    let success_rate = successes as f64 / history.len() as f64;
    let success_rate_pct = success_rate * 100.0;

    if !full {
        return SubtestOutcome {
            ok: true,
            subscore: success_rate_pct,
            details: json!({ "history_len": history.len(), "success_rate": success_rate }),
            error: None,
        };
    }

    let rtts: Vec<f64> = history.iter().filter(|h| h.success).filter_map(|h| h.rtt_ms).map(|v| v as f64).collect();
    let rtt_stability = if rtts.len() >= 2 {
        let m = mean(&rtts);
        if m > 0.0 {
            let cv = stdev(&rtts, m) / m;
            (100.0 * (1.0 - cv.min(1.0))).max(0.0)
        } else {
            100.0
        }
    } else {
        100.0
    };

    let scores: Vec<f64> = history.iter().map(|h| h.composite_score).collect();
    let consistency = if scores.len() >= 2 {
        let m = mean(&scores);
        let sd = stdev(&scores, m);
        // A 0..50 point spread in composite score maps linearly onto the
        // consistency penalty; beyond that it's fully inconsistent.
        (100.0 * (1.0 - (sd / 50.0).min(1.0))).max(0.0)
    } else {
        100.0
    };

    let subscore = 0.4 * success_rate_pct + 0.3 * rtt_stability + 0.3 * consistency;

    SubtestOutcome {
        ok: true,
        subscore,
        details: json!({
            "history_len": history.len(),
            "success_rate": success_rate,
            "rtt_stability": rtt_stability,
            "score_consistency": consistency,
        }),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(success: bool, rtt_ms: Option<u64>, composite_score: f64) -> HistoryEntry {
        HistoryEntry {
            timestamp: Utc::now(),
            success,
            rtt_ms,
            composite_score,
        }
    }

    #[test]
    fn empty_history_returns_neutral_prior() {
        let outcome = run(&[], true);
        assert_eq!(outcome.subscore, 70.0);
    }

    #[test]
    fn partial_mode_uses_success_rate_only() {
        let history = vec![entry(true, Some(100), 80.0), entry(false, None, 0.0)];
        let outcome = run(&history, false);
        assert_eq!(outcome.subscore, 50.0);
    }

    #[test]
    fn consistent_history_scores_higher_than_volatile_history() {
        let stable = vec![
            entry(true, Some(100), 80.0),
            entry(true, Some(110), 82.0),
            entry(true, Some(95), 79.0),
        ];
        let volatile = vec![
            entry(true, Some(100), 20.0),
            entry(true, Some(2000), 95.0),
            entry(false, None, 5.0),
        ];
        assert!(run(&stable, true).subscore > run(&volatile, true).subscore);
    }
}
