// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Directory-watch acquisition.
//
// For devices whose protocol transfer is unreliable: snapshot the candidate
// directories, trigger a scan out of band, poll until a file that was not in
// the snapshot appears, then wait until that directory holds a new file with
// content. Files present at snapshot time are never selected, whatever
// happens to their timestamps.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use scanport_core::config::FallbackSettings;
use scanport_core::error::{Result, ScanportError};
use scanport_core::types::{OcrOutcome, ScanResult};
use scanport_document::TextRecognizer;
use tracing::{debug, info, instrument, warn};

use crate::poll::{RetryConfig, RetryDecision, WatchWindow};
use crate::sink::ResultSink;
use crate::trigger::{AcquisitionTrigger, ExternalUtilityTrigger, NoTrigger};

/// Files that existed in each watched directory before triggering.
#[derive(Debug, Clone, Default)]
pub struct WatchState {
    directories: Vec<(PathBuf, HashSet<PathBuf>)>,
}

impl WatchState {
    /// Watched directories in priority order.
    pub fn directories(&self) -> impl Iterator<Item = &Path> {
        self.directories.iter().map(|(dir, _)| dir.as_path())
    }

    pub fn is_known(&self, directory: &Path, file: &Path) -> bool {
        self.known(directory).is_some_and(|files| files.contains(file))
    }

    fn known(&self, directory: &Path) -> Option<&HashSet<PathBuf>> {
        self.directories
            .iter()
            .find(|(dir, _)| dir == directory)
            .map(|(_, files)| files)
    }
}

/// A new file found in a watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub directory: PathBuf,
    pub file: PathBuf,
}

#[derive(Debug, Clone)]
struct CandidateFile {
    path: PathBuf,
    created: SystemTime,
    len: u64,
}

/// Watches candidate directories for a newly scanned file.
pub struct FallbackAcquisitionMonitor {
    settings: FallbackSettings,
    candidates: Vec<PathBuf>,
    trigger: Arc<dyn AcquisitionTrigger>,
    recognizer: Option<(Arc<dyn TextRecognizer>, String)>,
}

impl FallbackAcquisitionMonitor {
    /// Watch `output_dir`, the configured extra directories, and the
    /// platform's usual scan locations, in that order.
    pub fn new(settings: FallbackSettings, output_dir: &Path) -> Self {
        let candidates = candidate_directories(output_dir, &settings.extra_candidate_dirs);
        let trigger: Arc<dyn AcquisitionTrigger> = match &settings.trigger_program {
            Some(program) => Arc::new(ExternalUtilityTrigger::new(
                program.clone(),
                settings.trigger_args.clone(),
            )),
            None => Arc::new(NoTrigger),
        };
        Self {
            settings,
            candidates,
            trigger,
            recognizer: None,
        }
    }

    /// Replace the watched directories.
    pub fn with_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_trigger(mut self, trigger: Arc<dyn AcquisitionTrigger>) -> Self {
        self.trigger = trigger;
        self
    }

    /// Run `recognizer` on the acquired file with `language_hint`.
    pub fn with_recognizer(
        mut self,
        recognizer: Arc<dyn TextRecognizer>,
        language_hint: impl Into<String>,
    ) -> Self {
        self.recognizer = Some((recognizer, language_hint.into()));
        self
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    fn qualifies(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.settings.extensions.iter().any(|allowed| *allowed == ext))
    }

    /// Snapshot qualifying files in every candidate directory that exists.
    pub async fn baseline(&self) -> WatchState {
        let mut state = WatchState::default();
        for dir in &self.candidates {
            if !tokio::fs::metadata(dir).await.is_ok_and(|meta| meta.is_dir()) {
                continue;
            }
            match self.list_files(dir).await {
                Ok(files) => {
                    debug!(dir = %dir.display(), existing = files.len(), "Baseline captured");
                    let known = files.into_iter().map(|file| file.path).collect();
                    state.directories.push((dir.clone(), known));
                }
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "Skipping unreadable directory");
                }
            }
        }
        state
    }

    async fn list_files(&self, dir: &Path) -> Result<Vec<CandidateFile>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !self.qualifies(&path) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let created = meta
                .created()
                .or_else(|_| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push(CandidateFile {
                path,
                created,
                len: meta.len(),
            });
        }
        Ok(files)
    }

    /// Qualifying files in `dir` that are not in the baseline.
    async fn new_files(&self, dir: &Path, baseline: &WatchState) -> Vec<CandidateFile> {
        let Some(known) = baseline.known(dir) else {
            return Vec::new();
        };
        match self.list_files(dir).await {
            Ok(files) => files
                .into_iter()
                .filter(|file| !known.contains(&file.path))
                .collect(),
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "Directory poll failed");
                Vec::new()
            }
        }
    }

    /// Poll until a directory gains a file; the most recently created new
    /// file in the first such directory is reported.
    #[instrument(skip_all)]
    pub async fn detect(&self, baseline: &WatchState) -> Result<Detection> {
        let window = WatchWindow::start(self.settings.watch_timeout());
        loop {
            for dir in baseline.directories() {
                if let Some(newest) = newest(self.new_files(dir, baseline).await) {
                    info!(
                        dir = %dir.display(),
                        file = %newest.path.display(),
                        "New scan file detected"
                    );
                    return Ok(Detection {
                        directory: dir.to_path_buf(),
                        file: newest.path,
                    });
                }
            }
            if window.expired() {
                return Err(ScanportError::DetectionTimeout {
                    waited_secs: window.length_secs(),
                });
            }
            tokio::time::sleep(window.next_pause(self.settings.poll_interval())).await;
        }
    }

    /// Wait until `directory` holds a new file with content; the most
    /// recently created one wins.
    #[instrument(skip(self, baseline), fields(dir = %directory.display()))]
    pub async fn await_valid_file(&self, directory: &Path, baseline: &WatchState) -> Result<PathBuf> {
        let retry = RetryConfig {
            max_attempts: self.settings.validity_retries,
            interval: self.settings.validity_retry_interval(),
        };
        let mut attempt = 0;
        loop {
            attempt += 1;
            let complete = self
                .new_files(directory, baseline)
                .await
                .into_iter()
                .filter(|file| file.len > 0);
            if let Some(file) = newest(complete) {
                info!(file = %file.path.display(), bytes = file.len, attempt, "Scan file ready");
                return Ok(file.path);
            }
            match retry.after_attempt(attempt) {
                RetryDecision::RetryAfter(pause) => tokio::time::sleep(pause).await,
                RetryDecision::Exhausted => {
                    return Err(ScanportError::NoValidFile {
                        directory: directory.to_path_buf(),
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// Baseline, trigger, detect, and wait for a complete file.
    pub async fn acquire(&self) -> Result<PathBuf> {
        let baseline = self.baseline().await;
        if let Err(err) = self.trigger.fire() {
            warn!(error = %err, "Scan trigger failed, still watching for a file");
        }
        let detection = self.detect(&baseline).await?;
        self.await_valid_file(&detection.directory, &baseline).await
    }

    /// Acquire a file and annotate it with recognised text. Recognition
    /// failures only degrade the text part of the result.
    #[instrument(skip(self))]
    pub async fn run(&self) -> ScanResult {
        let path = match self.acquire().await {
            Ok(path) => path,
            Err(err) => return ResultSink::failed(&err),
        };
        let result = ResultSink::acquired(path.clone(), Vec::new());

        let Some((recognizer, language)) = &self.recognizer else {
            return result;
        };
        let recognizer = Arc::clone(recognizer);
        let language = language.clone();
        let outcome =
            tokio::task::spawn_blocking(move || recognizer.recognize(&path, &language))
                .await
                .unwrap_or_else(|err| OcrOutcome::failed(format!("OCR task failed: {err}")));
        if let Some(error) = &outcome.error {
            warn!(error = %error, "Text recognition failed, keeping the acquired file");
        }
        ResultSink::annotate(result, outcome)
    }
}

fn newest(files: impl IntoIterator<Item = CandidateFile>) -> Option<CandidateFile> {
    files
        .into_iter()
        .max_by(|a, b| a.created.cmp(&b.created).then_with(|| a.path.cmp(&b.path)))
}

/// `output_dir`, then `extra`, then the usual vendor/OS scan folders,
/// without duplicates. Only dedicated scan subfolders are watched, never the
/// Documents or Pictures roots, where unrelated files appear.
pub fn candidate_directories(output_dir: &Path, extra: &[PathBuf]) -> Vec<PathBuf> {
    let platform = [
        dirs::document_dir().map(|dir| dir.join("Scanned Documents")),
        dirs::document_dir().map(|dir| dir.join("Scans")),
        dirs::picture_dir().map(|dir| dir.join("Scans")),
    ];
    let mut out: Vec<PathBuf> = Vec::new();
    let all = std::iter::once(output_dir.to_path_buf())
        .chain(extra.iter().cloned())
        .chain(platform.into_iter().flatten());
    for dir in all {
        if !out.contains(&dir) {
            out.push(dir);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_settings() -> FallbackSettings {
        FallbackSettings {
            poll_interval_ms: 10,
            watch_timeout_ms: 400,
            validity_retries: 5,
            validity_retry_interval_ms: 20,
            ..FallbackSettings::default()
        }
    }

    fn monitor(dirs: &[&Path]) -> FallbackAcquisitionMonitor {
        FallbackAcquisitionMonitor::new(fast_settings(), dirs[0])
            .with_candidates(dirs.iter().map(|d| d.to_path_buf()).collect())
    }

    struct FixedRecognizer(OcrOutcome);

    impl TextRecognizer for FixedRecognizer {
        fn recognize(&self, _image_path: &Path, _language_hint: &str) -> OcrOutcome {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn baseline_files_are_never_selected() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old.jpg");
        std::fs::write(&old, b"old").unwrap();

        let monitor = monitor(&[dir.path()]);
        let baseline = monitor.baseline().await;

        // Touching the old file must not make it "new".
        std::fs::write(&old, b"old but rewritten").unwrap();
        let fresh = dir.path().join("fresh.jpg");
        std::fs::write(&fresh, b"new page").unwrap();

        let detection = monitor.detect(&baseline).await.unwrap();
        assert_eq!(detection.file, fresh);
        assert!(baseline.is_known(dir.path(), &old));
    }

    #[tokio::test]
    async fn newest_new_file_is_selected() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(&[dir.path()]);
        let baseline = monitor.baseline().await;

        std::fs::write(dir.path().join("a.jpg"), b"first").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(dir.path().join("b.jpg"), b"second").unwrap();

        let file = monitor.await_valid_file(dir.path(), &baseline).await.unwrap();
        assert_eq!(file, dir.path().join("b.jpg"));
    }

    #[tokio::test]
    async fn file_created_during_watch_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(&[dir.path()]);
        let target = dir.path().join("scan.png");
        let writer = {
            let target = target.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                tokio::fs::write(&target, b"png bytes").await.unwrap();
            })
        };

        let path = monitor.acquire().await.unwrap();
        writer.await.unwrap();
        assert_eq!(path, target);
    }

    #[tokio::test]
    async fn later_directories_are_watched_too() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let monitor = monitor(&[first.path(), second.path()]);
        let baseline = monitor.baseline().await;

        std::fs::write(second.path().join("vendor.tif"), b"tiff").unwrap();
        let detection = monitor.detect(&baseline).await.unwrap();
        assert_eq!(detection.directory, second.path());
    }

    #[tokio::test]
    async fn other_extensions_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = FallbackAcquisitionMonitor::new(
            FallbackSettings {
                watch_timeout_ms: 80,
                ..fast_settings()
            },
            dir.path(),
        )
        .with_candidates(vec![dir.path().to_path_buf()]);
        let baseline = monitor.baseline().await;

        std::fs::write(dir.path().join("notes.txt"), b"text").unwrap();
        let err = monitor.detect(&baseline).await.unwrap_err();
        assert!(matches!(err, ScanportError::DetectionTimeout { .. }));
    }

    #[tokio::test]
    async fn empty_file_is_accepted_once_written() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(&[dir.path()]);
        let baseline = monitor.baseline().await;

        let target = dir.path().join("page.jpg");
        std::fs::write(&target, b"").unwrap();
        let writer = {
            let target = target.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(45)).await;
                tokio::fs::write(&target, b"jpeg data").await.unwrap();
            })
        };

        let detection = monitor.detect(&baseline).await.unwrap();
        let path = monitor
            .await_valid_file(&detection.directory, &baseline)
            .await
            .unwrap();
        writer.await.unwrap();
        assert_eq!(path, target);
    }

    #[tokio::test]
    async fn file_that_stays_empty_is_not_valid() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(&[dir.path()]);
        let baseline = monitor.baseline().await;
        std::fs::write(dir.path().join("page.jpg"), b"").unwrap();

        let detection = monitor.detect(&baseline).await.unwrap();
        let err = monitor
            .await_valid_file(&detection.directory, &baseline)
            .await
            .unwrap_err();
        match err {
            ScanportError::NoValidFile { directory, attempts } => {
                assert_eq!(directory, dir.path());
                assert_eq!(attempts, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn trigger_failure_does_not_stop_the_watch() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(&[dir.path()]).with_trigger(Arc::new(ExternalUtilityTrigger::new(
            "/no/such/vendor-tool",
            vec!["/auto".into()],
        )));
        let target = dir.path().join("button.jpg");
        let writer = {
            let target = target.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                tokio::fs::write(&target, b"data").await.unwrap();
            })
        };
        assert_eq!(monitor.acquire().await.unwrap(), target);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn ocr_failure_keeps_the_scan_successful() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(&[dir.path()]).with_recognizer(
            Arc::new(FixedRecognizer(OcrOutcome::failed("no language data for 'urd'"))),
            "eng+urd",
        );
        let writer = {
            let target = dir.path().join("page.jpg");
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                tokio::fs::write(&target, b"data").await.unwrap();
            })
        };

        let result = monitor.run().await;
        writer.await.unwrap();
        assert!(result.success);
        assert_eq!(result.file_name.as_deref(), Some("page.jpg"));
        let ocr = result.recognized_text.unwrap();
        assert!(!ocr.success);
        assert!(ocr.error.unwrap().contains("urd"));
    }

    #[tokio::test]
    async fn recognised_text_is_attached() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(&[dir.path()]).with_recognizer(
            Arc::new(FixedRecognizer(OcrOutcome::recognized("INVOICE 42".into(), None))),
            "eng",
        );
        let writer = {
            let target = dir.path().join("page.jpg");
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                tokio::fs::write(&target, b"data").await.unwrap();
            })
        };

        let result = monitor.run().await;
        writer.await.unwrap();
        assert_eq!(
            result.recognized_text.unwrap().text.as_deref(),
            Some("INVOICE 42")
        );
    }

    #[tokio::test]
    async fn nothing_new_is_a_detection_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = FallbackAcquisitionMonitor::new(
            FallbackSettings {
                watch_timeout_ms: 60,
                ..fast_settings()
            },
            dir.path(),
        )
        .with_candidates(vec![dir.path().to_path_buf()]);

        let result = monitor.run().await;
        assert!(!result.success);
        assert!(result.error_message.unwrap().contains("no new scan file"));
    }

    #[test]
    fn candidates_start_with_output_dir_and_skip_duplicates() {
        let out = PathBuf::from("/tmp/scans-out");
        let dirs = candidate_directories(&out, &[out.clone(), PathBuf::from("/srv/inbox")]);
        assert_eq!(dirs[0], out);
        assert_eq!(dirs[1], PathBuf::from("/srv/inbox"));
        assert_eq!(dirs.iter().filter(|d| **d == out).count(), 1);
    }

    #[test]
    fn user_folder_roots_are_never_watched() {
        let watched = candidate_directories(Path::new("/tmp/scans-out"), &[]);
        for root in [dirs::picture_dir(), dirs::document_dir()].into_iter().flatten() {
            assert!(!watched.contains(&root), "{} is watched", root.display());
        }
        if let Some(pictures) = dirs::picture_dir() {
            assert!(watched.contains(&pictures.join("Scans")));
        }
    }
}
