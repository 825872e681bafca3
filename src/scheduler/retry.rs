//! Transient-error detection and the bounded retry policy.

use crate::config::RetryConfig;

/// Classifies diagnostic lines as transient stale-session failures.
///
/// The marker vocabulary comes from configuration rather than being
/// hard-coded: substring heuristics can both over- and under-trigger, so
/// the classifier stays swappable without a code change.
#[derive(Debug, Clone)]
pub struct TransientErrorClassifier {
    markers: Vec<String>,
}

impl TransientErrorClassifier {
    /// Build a classifier from the marker vocabulary. Markers are matched
    /// case-insensitively; empty markers are discarded.
    #[must_use]
    pub fn new(markers: &[String]) -> Self {
        Self {
            markers: markers
                .iter()
                .filter(|marker| !marker.trim().is_empty())
                .map(|marker| marker.to_lowercase())
                .collect(),
        }
    }

    /// Whether one diagnostic line signals a transient session failure.
    #[must_use]
    pub fn is_transient(&self, line: &str) -> bool {
        let line = line.to_lowercase();
        self.markers.iter().any(|marker| line.contains(marker))
    }
}

/// Authorizes a bounded number of re-dispatches under a fresh session.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    /// Diagnostic-line classifier consulted during each attempt.
    pub classifier: TransientErrorClassifier,
}

impl RetryPolicy {
    /// Build the policy from configuration.
    #[must_use]
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            classifier: TransientErrorClassifier::new(&config.transient_markers),
        }
    }

    /// Whether a job may be re-dispatched after `attempts` completed
    /// attempts during which a transient signal was (or was not) observed.
    #[must_use]
    pub fn should_retry(&self, transient_seen: bool, attempts: u32) -> bool {
        transient_seen && attempts <= self.max_retries
    }
}
