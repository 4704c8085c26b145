//! Per-record outcomes and pass summaries.

use std::fmt;

use crate::error::{EnrichError, ErrorClass};
use crate::traits::renderer::ImageSource;
use crate::types::record::ImageRef;

/// Pipeline stage, reported in logs when a record fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    PageFetch,
    ImageFetch,
    Normalize,
    Render,
    Store,
    Commit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PageFetch => "page_fetch",
            Stage::ImageFetch => "image_fetch",
            Stage::Normalize => "normalize",
            Stage::Render => "render",
            Stage::Store => "store",
            Stage::Commit => "commit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure tagged with the stage that produced it.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: EnrichError,
}

impl StageFailure {
    pub fn new(stage: Stage, error: impl Into<EnrichError>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.error.class()
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichOutcome {
    /// Completed from plain HTTP: page metadata plus its `og:image`
    Lightweight { image: ImageRef },

    /// Completed from the rendered page
    Fallback { image: ImageRef, source: ImageSource },

    /// Both paths failed; the record stays pending for a later run
    Pending {
        stage: Stage,
        class: ErrorClass,
        error: String,
    },

    /// The whole-record deadline elapsed; the record stays pending
    TimedOut,

    /// Already processed, nothing done
    Skipped,
}

impl EnrichOutcome {
    pub(crate) fn pending(failure: &StageFailure) -> Self {
        EnrichOutcome::Pending {
            stage: failure.stage,
            class: failure.class(),
            error: failure.error.to_string(),
        }
    }

    /// Whether the record now has `processed_at` set by this run.
    pub fn is_committed(&self) -> bool {
        matches!(
            self,
            EnrichOutcome::Lightweight { .. } | EnrichOutcome::Fallback { .. }
        )
    }

    pub fn image(&self) -> Option<&ImageRef> {
        match self {
            EnrichOutcome::Lightweight { image } | EnrichOutcome::Fallback { image, .. } => {
                Some(image)
            }
            _ => None,
        }
    }
}

/// Counts for one or more enrichment passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub claimed: usize,
    pub lightweight: usize,
    pub fallback: usize,
    pub pending: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &EnrichOutcome) {
        match outcome {
            EnrichOutcome::Lightweight { .. } => self.lightweight += 1,
            EnrichOutcome::Fallback { .. } => self.fallback += 1,
            EnrichOutcome::Pending { .. } | EnrichOutcome::TimedOut => self.pending += 1,
            EnrichOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.claimed += other.claimed;
        self.lightweight += other.lightweight;
        self.fallback += other.fallback;
        self.pending += other.pending;
        self.skipped += other.skipped;
    }

    pub fn completed(&self) -> usize {
        self.lightweight + self.fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    #[test]
    fn test_summary_counts_outcomes() {
        let mut summary = RunSummary {
            claimed: 5,
            ..Default::default()
        };
        let image = ImageRef("link_previews/preview_1.jpg".into());

        summary.record(&EnrichOutcome::Lightweight { image: image.clone() });
        summary.record(&EnrichOutcome::Fallback {
            image,
            source: ImageSource::Screenshot,
        });
        summary.record(&EnrichOutcome::TimedOut);
        summary.record(&EnrichOutcome::Skipped);

        let failure = StageFailure::new(
            Stage::PageFetch,
            FetchError::HttpStatus {
                url: "https://example.com".into(),
                status: 500,
            },
        );
        let pending = EnrichOutcome::pending(&failure);
        assert!(!pending.is_committed());
        summary.record(&pending);

        assert_eq!(summary.completed(), 2);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.skipped, 1);

        let mut total = RunSummary::default();
        total.merge(&summary);
        total.merge(&summary);
        assert_eq!(total.claimed, 10);
    }

    #[test]
    fn test_stage_failure_display() {
        let failure = StageFailure::new(
            Stage::ImageFetch,
            FetchError::HttpStatus {
                url: "https://example.com/img.jpg".into(),
                status: 404,
            },
        );
        assert_eq!(failure.class(), ErrorClass::HttpStatus);
        assert_eq!(
            failure.to_string(),
            "image_fetch failed: HTTP 404 for https://example.com/img.jpg"
        );
    }
}
