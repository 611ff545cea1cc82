//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn AnnotationProgress>`] via
//! [`crate::config::AnnotatorConfigBuilder::progress`] to observe a run as it
//! resolves each annotation. The pipeline itself is synchronous; a GUI that
//! runs it on a worker thread can forward these events to its UI thread.
//!
//! # Example
//!
//! ```rust
//! use kindle_pdf_annotator::{AnnotationProgress, AnnotatorConfig, MatchSource};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl AnnotationProgress for Counter {
//!     fn on_annotation_resolved(&self, _page: usize, source: MatchSource) {
//!         if source == MatchSource::TextMatched {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let config = AnnotatorConfig::builder()
//!     .progress(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::MatchMiss;
use crate::output::{MatchSource, RunStats};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DecodeStore,
    ParseClippings,
    Reconcile,
    BuildGeometry,
    Deduplicate,
    Render,
}

/// Called by the pipeline as it works. Every method defaults to a no-op.
pub trait AnnotationProgress: Send + Sync {
    /// A stage is about to start.
    ///
    /// `items` is the number of records the stage will look at.
    fn on_stage_start(&self, stage: Stage, items: usize) {
        let _ = (stage, items);
    }

    /// A store annotation was placed, either from text or from geometry alone.
    ///
    /// `page` is 0-based.
    fn on_annotation_resolved(&self, page: usize, source: MatchSource) {
        let _ = (page, source);
    }

    /// Every search strategy failed for a clipping.
    fn on_match_miss(&self, miss: &MatchMiss) {
        let _ = miss;
    }

    /// The run finished.
    fn on_complete(&self, stats: &RunStats) {
        let _ = stats;
    }
}

/// A callback that ignores every event.
pub struct NoopProgress;

impl AnnotationProgress for NoopProgress {}
