use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family},
};

/// Terminal outcome of a segment.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Status {
    Success,
    Failure,
    Cancelled,
}

/// Label for segment outcome metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct Outcome {
    pub status: Status,
}

/// Metrics for the [Engine](super::Engine)
#[derive(Default)]
pub struct Metrics {
    /// Number of segments that computed their check blocks
    pub encoded: Counter,
    /// Number of segments with a key for every block
    pub has_keys: Counter,
    /// Number of finished segments by outcome
    pub finished: Family<Outcome, Counter>,
    /// Number of block insertions completed
    pub blocks: Counter,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Metrics::default();
        context.register(
            "segments_encoded",
            "Number of segments that computed their check blocks",
            metrics.encoded.clone(),
        );
        context.register(
            "segments_with_keys",
            "Number of segments with a key for every block",
            metrics.has_keys.clone(),
        );
        context.register(
            "segments_finished",
            "Number of finished segments by outcome",
            metrics.finished.clone(),
        );
        context.register(
            "blocks_completed",
            "Number of block insertions completed",
            metrics.blocks.clone(),
        );
        metrics
    }

    /// Record the terminal outcome of a segment.
    pub fn finished(&self, status: Status) {
        self.finished.get_or_create(&Outcome { status }).inc();
    }
}
