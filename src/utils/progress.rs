// file: src/utils/progress.rs
// description: progress bar and counters for directory indexing runs
// reference: https://docs.rs/indicatif

use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexingStats {
    pub documents_indexed: usize,
    pub documents_failed: usize,
    pub chunks_indexed: usize,
    pub duration_secs: f64,
}

impl IndexingStats {
    pub fn documents_per_second(&self) -> f64 {
        if self.duration_secs <= 0.0 {
            return 0.0;
        }
        self.documents_indexed as f64 / self.duration_secs
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.documents_indexed + self.documents_failed;
        if total == 0 {
            return 0.0;
        }
        (self.documents_indexed as f64 / total as f64) * 100.0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} documents indexed, {} failed, {} entries written in {:.1}s ({:.1}% success, {:.2} docs/s)",
            self.documents_indexed.to_string().green(),
            self.documents_failed.to_string().red(),
            self.chunks_indexed,
            self.duration_secs,
            self.success_rate(),
            self.documents_per_second()
        )
    }
}

pub struct ProgressTracker {
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
    documents_indexed: AtomicUsize,
    documents_failed: AtomicUsize,
    chunks_indexed: AtomicUsize,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total_documents: usize, visible: bool) -> Self {
        let multi_progress = MultiProgress::new();
        let (main_bar, detail_bar) = if visible {
            (
                multi_progress.add(ProgressBar::new(total_documents as u64)),
                multi_progress.add(ProgressBar::new(0)),
            )
        } else {
            (ProgressBar::hidden(), ProgressBar::hidden())
        };

        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            main_bar.set_style(style.progress_chars("█▓▒░"));
        }
        if let Ok(style) = ProgressStyle::default_bar().template("{msg}") {
            detail_bar.set_style(style);
        }

        Self {
            main_bar,
            detail_bar,
            documents_indexed: AtomicUsize::new(0),
            documents_failed: AtomicUsize::new(0),
            chunks_indexed: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_success(&self, entries: usize) {
        self.documents_indexed.fetch_add(1, Ordering::SeqCst);
        self.chunks_indexed.fetch_add(entries, Ordering::SeqCst);
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::SeqCst);
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn set_message(&self, message: String) {
        self.main_bar.set_message(message);
    }

    pub fn finish(&self) {
        self.main_bar.finish_with_message("Indexing complete");
        self.detail_bar.finish_and_clear();
    }

    pub fn stats(&self) -> IndexingStats {
        IndexingStats {
            documents_indexed: self.documents_indexed.load(Ordering::SeqCst),
            documents_failed: self.documents_failed.load(Ordering::SeqCst),
            chunks_indexed: self.chunks_indexed.load(Ordering::SeqCst),
            duration_secs: self.start_time.elapsed().as_secs_f64(),
        }
    }

    fn update_detail_bar(&self) {
        self.detail_bar.set_message(format!(
            "Entries: {} | Failed documents: {}",
            self.chunks_indexed.load(Ordering::SeqCst),
            self.documents_failed.load(Ordering::SeqCst)
        ));
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        if !self.main_bar.is_finished() {
            self.finish();
        }
    }
}
