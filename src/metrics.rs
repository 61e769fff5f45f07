//! Prometheus metrics collection for chatstitch
//!
//! This module provides metrics instrumentation for tracking:
//! - Stream frames by kind
//! - How streams terminate
//! - Out-of-order fragments (buffered and duplicated)
//! - Kill requests
//! - Stream duration
//!
//! [`Metrics::gather`] renders everything in Prometheus text format.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Frame kind label
///
/// A closed enum keeps label cardinality bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Fragment,
    ToolCall,
    Meta,
    Finish,
    Ignored,
}

impl FrameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameKind::Text => "text",
            FrameKind::Fragment => "fragment",
            FrameKind::ToolCall => "tool_call",
            FrameKind::Meta => "meta",
            FrameKind::Finish => "finish",
            FrameKind::Ignored => "ignored",
        }
    }
}

/// How a stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Aborted,
    ParseError,
    Interrupted,
    HttpError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Aborted => "aborted",
            Outcome::ParseError => "parse_error",
            Outcome::Interrupted => "interrupted",
            Outcome::HttpError => "http_error",
        }
    }
}

/// Metrics collector for chatstitch
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    frames_total: IntCounterVec,
    terminations_total: IntCounterVec,
    fragments_buffered: IntCounter,
    duplicate_fragments: IntCounter,
    kill_requests_total: IntCounterVec,
    stream_duration: HistogramVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 6 kinds
        let frames_total = IntCounterVec::new(
            Opts::new(
                "chatstitch_stream_frames_total",
                "Total number of classified stream frames by kind",
            ),
            &["kind"],
        )?;

        // Cardinality: 5 outcomes
        let terminations_total = IntCounterVec::new(
            Opts::new(
                "chatstitch_stream_terminations_total",
                "Total number of chat streams by how they ended",
            ),
            &["outcome"],
        )?;

        let fragments_buffered = IntCounter::with_opts(Opts::new(
            "chatstitch_fragments_buffered_total",
            "Total number of out-of-order fragments recorded for reassembly",
        ))?;

        let duplicate_fragments = IntCounter::with_opts(Opts::new(
            "chatstitch_duplicate_fragments_total",
            "Total number of out-of-order fragments dropped because their sequence was already filled",
        ))?;

        let kill_requests_total = IntCounterVec::new(
            Opts::new(
                "chatstitch_kill_requests_total",
                "Total number of out-of-band kill requests by result",
            ),
            &["result"],
        )?;

        let stream_duration = HistogramVec::new(
            HistogramOpts::new(
                "chatstitch_stream_duration_ms",
                "Wall time from request send to stream end in milliseconds",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0,
            ]),
            &["outcome"],
        )?;

        registry.register(Box::new(frames_total.clone()))?;
        registry.register(Box::new(terminations_total.clone()))?;
        registry.register(Box::new(fragments_buffered.clone()))?;
        registry.register(Box::new(duplicate_fragments.clone()))?;
        registry.register(Box::new(kill_requests_total.clone()))?;
        registry.register(Box::new(stream_duration.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            frames_total,
            terminations_total,
            fragments_buffered,
            duplicate_fragments,
            kill_requests_total,
            stream_duration,
        })
    }

    pub fn record_frame(&self, kind: FrameKind) {
        self.frames_total.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn record_fragment(&self, duplicate: bool) {
        if duplicate {
            self.duplicate_fragments.inc();
        } else {
            self.fragments_buffered.inc();
        }
    }

    /// Record how a stream ended and how long it took
    ///
    /// # Errors
    ///
    /// Returns an error if `duration_ms` is NaN, infinite, or negative. Such
    /// values would corrupt histogram percentiles.
    pub fn record_termination(
        &self,
        outcome: Outcome,
        duration_ms: f64,
    ) -> Result<(), prometheus::Error> {
        self.terminations_total
            .with_label_values(&[outcome.as_str()])
            .inc();

        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite and non-negative, got: {}",
                duration_ms
            )));
        }

        self.stream_duration
            .get_metric_with_label_values(&[outcome.as_str()])?
            .observe(duration_ms);
        Ok(())
    }

    pub fn record_kill_request(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.kill_requests_total.with_label_values(&[result]).inc();
    }

    /// Count of streams that ended with `outcome`
    pub fn terminations(&self, outcome: Outcome) -> u64 {
        self.terminations_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Count of fragments rejected because their sequence was already filled
    pub fn duplicate_fragments(&self) -> u64 {
        self.duplicate_fragments.get()
    }

    /// Count of frames classified as `kind`
    pub fn frames(&self, kind: FrameKind) -> u64 {
        self.frames_total.with_label_values(&[kind.as_str()]).get()
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();

        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            tracing::error!(
                error = %e,
                metric_family_count = metric_count,
                "Prometheus text encoder failed"
            );
            prometheus::Error::Msg(format!(
                "Failed to encode {} metric families: {}",
                metric_count, e
            ))
        })?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}: {}",
                e.utf8_error().valid_up_to(),
                e
            ))
        })
    }
}
