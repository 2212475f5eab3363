use tracing::{debug, info, warn};

/// Event sink for pipeline diagnostics. Injected into the word validator
/// and the document pipeline instead of ad hoc printing; implementations
/// decide where events go. All hooks default to no-ops so tests can
/// implement only what they observe.
pub trait PipelineEvents {
    fn invalid_word(&self, word: &str) {
        let _ = word;
    }

    fn document_scored(&self, source_id: &str, pass: &str, score: f64) {
        let _ = (source_id, pass, score);
    }

    fn fallback_started(&self, source_id: &str) {
        let _ = source_id;
    }

    fn document_accepted(&self, source_id: &str, score: f64) {
        let _ = (source_id, score);
    }

    fn document_rejected(&self, source_id: &str, score: f64, reason: &str) {
        let _ = (source_id, score, reason);
    }
}

/// Production sink: structured tracing on stderr.
pub struct TracingEvents;

impl PipelineEvents for TracingEvents {
    fn invalid_word(&self, word: &str) {
        debug!(word = %word, "invalid word");
    }

    fn document_scored(&self, source_id: &str, pass: &str, score: f64) {
        info!(source_id = %source_id, pass = %pass, score, "scored document");
    }

    fn fallback_started(&self, source_id: &str) {
        info!(source_id = %source_id, "starting ocr fallback");
    }

    fn document_accepted(&self, source_id: &str, score: f64) {
        info!(source_id = %source_id, score, "accepted document");
    }

    fn document_rejected(&self, source_id: &str, score: f64, reason: &str) {
        warn!(source_id = %source_id, score, reason = %reason, "rejected document");
    }
}

/// Sink that drops every event.
#[cfg(test)]
pub struct NullEvents;

#[cfg(test)]
impl PipelineEvents for NullEvents {}
