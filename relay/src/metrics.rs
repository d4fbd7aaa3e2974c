//! Prometheus metrics for the relay.
//!
//! [`RelayMetrics`] owns a dedicated [`Registry`]; [`RelayMetrics::encode`]
//! renders it in the text exposition format for whatever endpoint the
//! HTTP collaborator exposes.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

use crate::RelayError;

pub struct RelayMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Sponsored transactions handed to the ledger.
    pub submissions: IntCounter,
    /// Submissions included with a successful receipt.
    pub confirmed: IntCounter,
    /// Submissions included but reverted by the contract.
    pub rejected: IntCounter,
    /// Submissions not included within the confirmation timeout.
    pub timed_out: IntCounter,
    /// Voter-nonce mismatches, at pre-check or at the ledger.
    pub replay_rejections: IntCounter,
    pub validation_rejections: IntCounter,
    /// Confirmed votes the mirror failed to record.
    pub consistency_alarms: IntCounter,
    /// Votes written to the mirror by the reconciler.
    pub repairs_applied: IntCounter,
    /// Polls whose mirror tallies exceed the ledger's.
    pub mirror_ahead_alarms: IntCounter,
    /// `→ Ended` transitions actually written.
    pub polls_ended: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Callers queued for the submission lane.
    pub lane_waiters: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time from submission to observed inclusion, in milliseconds.
    pub inclusion_latency_ms: Histogram,
}

impl RelayMetrics {
    pub fn new() -> Result<Self, RelayError> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| {
            register_int_counter_with_registry!(Opts::new(name, help), registry)
        };

        let submissions = counter(
            "ballot_relay_submissions_total",
            "Sponsored transactions submitted to the ledger",
        )?;
        let confirmed = counter(
            "ballot_relay_confirmed_total",
            "Submissions included successfully",
        )?;
        let rejected = counter(
            "ballot_relay_rejected_total",
            "Submissions reverted by the contract",
        )?;
        let timed_out = counter(
            "ballot_relay_timed_out_total",
            "Submissions not included before the confirmation timeout",
        )?;
        let replay_rejections = counter(
            "ballot_relay_replay_rejections_total",
            "Intents rejected for a voter nonce mismatch",
        )?;
        let validation_rejections = counter(
            "ballot_relay_validation_rejections_total",
            "Intents rejected before touching the ledger",
        )?;
        let consistency_alarms = counter(
            "ballot_relay_consistency_alarms_total",
            "Confirmed votes the mirror failed to record",
        )?;
        let repairs_applied = counter(
            "ballot_relay_repairs_applied_total",
            "Votes written to the mirror by the reconciler",
        )?;
        let mirror_ahead_alarms = counter(
            "ballot_relay_mirror_ahead_alarms_total",
            "Audits that found mirror tallies above the ledger",
        )?;
        let polls_ended = counter(
            "ballot_relay_polls_ended_total",
            "Poll end transitions written",
        )?;

        let lane_waiters = register_int_gauge_with_registry!(
            Opts::new(
                "ballot_relay_lane_waiters",
                "Callers waiting for the submission lane"
            ),
            registry
        )?;

        // 1 ms → ~65 s.
        let inclusion_latency_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "ballot_relay_inclusion_latency_ms",
                "Submission to inclusion latency in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 17)?),
            registry
        )?;

        Ok(Self {
            registry,
            submissions,
            confirmed,
            rejected,
            timed_out,
            replay_rejections,
            validation_rejections,
            consistency_alarms,
            repairs_applied,
            mirror_ahead_alarms,
            polls_ended,
            lane_waiters,
            inclusion_latency_ms,
        })
    }

    /// Render every metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, RelayError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| RelayError::Config(format!("metrics not UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_output_lists_counters() {
        let metrics = RelayMetrics::new().unwrap();
        metrics.submissions.inc();
        metrics.consistency_alarms.inc_by(2);
        let text = metrics.encode().unwrap();
        assert!(text.contains("ballot_relay_submissions_total 1"));
        assert!(text.contains("ballot_relay_consistency_alarms_total 2"));
    }

    #[test]
    fn separate_instances_do_not_collide() {
        let a = RelayMetrics::new().unwrap();
        let b = RelayMetrics::new().unwrap();
        a.confirmed.inc();
        assert_eq!(b.confirmed.get(), 0);
    }
}
