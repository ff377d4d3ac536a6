use chrono::{DateTime, Utc};

use crate::config::EstimatorConfig;

/// Output of a single rate-estimation pass: the next instant to poll
/// the feed, and the smoothed publish rate to persist as the new
/// prior (unchanged from the input when there isn't enough data to
/// form a new observation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub next_fetch_at: DateTime<Utc>,
    pub publish_rate_per_hour: Option<f64>,
}

/// Models feed publication as a Poisson process and derives the next
/// poll instant from it. Pure and deterministic: the same
/// `(timestamps, prior_rate, now, cfg)` always yields the same
/// `Estimate`, which is what makes this testable without mocking a
/// clock.
pub fn estimate(
    timestamps: &[DateTime<Utc>],
    prior_rate: Option<f64>,
    now: DateTime<Utc>,
    cfg: &EstimatorConfig,
) -> Estimate {
    let mut ts: Vec<DateTime<Utc>> = timestamps.to_vec();
    ts.sort();

    if ts.len() < 2 {
        return fallback(prior_rate, now, cfg);
    }

    let window_start = ts.len().saturating_sub(cfg.sample_size);
    let window = &ts[window_start..];

    let gaps: Vec<f64> = window
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64 / 3_600_000.0)
        .filter(|gap| *gap > 0.0)
        .collect();

    if gaps.is_empty() {
        return fallback(prior_rate, now, cfg);
    }

    let gap_sum: f64 = gaps.iter().sum();
    let lambda_obs = gaps.len() as f64 / gap_sum;

    let lambda = match prior_rate {
        Some(prior) => cfg.alpha * lambda_obs + (1.0 - cfg.alpha) * prior,
        None => lambda_obs,
    };

    let expected_inter_arrival_hours = 1.0 / lambda;
    let poll_interval_hours = (cfg.lead_factor * expected_inter_arrival_hours)
        .clamp(cfg.min_interval_hours, cfg.max_interval_hours);

    Estimate {
        next_fetch_at: now + to_duration(poll_interval_hours),
        publish_rate_per_hour: Some(lambda),
    }
}

fn fallback(prior_rate: Option<f64>, now: DateTime<Utc>, cfg: &EstimatorConfig) -> Estimate {
    Estimate {
        next_fetch_at: now + to_duration(cfg.default_interval_hours),
        publish_rate_per_hour: prior_rate,
    }
}

fn to_duration(hours: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}
