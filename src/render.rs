//! HTML → PNG rendering.
//!
//! The [`RenderEngine`] trait is the seam between the pipeline and whatever
//! actually rasterizes a page. Implementations:
//!
//! | Engine | Use |
//! |---|---|
//! | [`ChromeRenderer`] | Production: headless Chrome screenshot of the page |
//! | [`TimedRenderer`] | Wraps any engine with a hard wait bound |
//! | `MockRenderer` (tests) | Records jobs, writes real PNGs, fails on demand |
//!
//! ## Bounded waits
//!
//! A browser can hang on a bad page. [`TimedRenderer`] runs the wrapped
//! engine on a worker thread and gives up after the configured timeout.
//! The job's [`CancelToken`] is tripped on timeout. Engines write through
//! [`write_artifact`], which commits the output while holding the token, so
//! a job ends up either written or cancelled, never both. When the write
//! wins the race against the timeout, the caller gets the write's result
//! instead of [`RenderError::Timeout`].
//!
//! ## Atomic output
//!
//! [`write_artifact`] writes to a temporary file next to the target and
//! renames it into place, so an artifact on disk is always a complete image.

use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Render timed out after {0:?}")]
    Timeout(Duration),
    #[error("Render cancelled before output was written")]
    Cancelled,
    #[error("Render engine failed: {0}")]
    Engine(String),
}

fn engine_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Engine(e.to_string())
}

/// Output size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum JobState {
    #[default]
    Pending,
    Cancelled,
    Committed,
}

/// Shared state telling an engine to abandon a job.
///
/// Cancelling and committing the output exclude each other: whichever
/// happens first wins, and the other is refused.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<Mutex<JobState>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel the job. Returns `false` if its output was already committed.
    pub fn cancel(&self) -> bool {
        let mut state = self.state();
        if *state == JobState::Committed {
            return false;
        }
        *state = JobState::Cancelled;
        true
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state() == JobState::Cancelled
    }

    /// Run `commit` unless the job is cancelled. A concurrent
    /// [`cancel`](Self::cancel) waits until `commit` has returned.
    pub fn commit<T>(
        &self,
        commit: impl FnOnce() -> Result<T, RenderError>,
    ) -> Result<T, RenderError> {
        let mut state = self.state();
        if *state == JobState::Cancelled {
            return Err(RenderError::Cancelled);
        }
        let value = commit()?;
        *state = JobState::Committed;
        Ok(value)
    }
}

/// Everything an engine needs to produce one artifact.
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Fully substituted HTML document.
    pub html: String,
    /// Absolute path the PNG must end up at.
    pub output: PathBuf,
    pub viewport: Viewport,
    pub cancel: CancelToken,
}

impl RenderJob {
    pub fn new(html: String, output: PathBuf, viewport: Viewport) -> Self {
        Self {
            html,
            output,
            viewport,
            cancel: CancelToken::new(),
        }
    }
}

/// Turns a substituted HTML document into an image file.
pub trait RenderEngine: Send + Sync {
    /// Render `job.html` and write the image to `job.output`.
    fn render(&self, job: &RenderJob) -> Result<(), RenderError>;
}

/// Write rendered bytes to the job's output path, atomically.
///
/// Fails with [`RenderError::Cancelled`] if the job was cancelled, without
/// touching the output path.
pub fn write_artifact(job: &RenderJob, bytes: &[u8]) -> Result<(), RenderError> {
    if job.cancel.is_cancelled() {
        return Err(RenderError::Cancelled);
    }
    let dir = match job.output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut staged = tempfile::NamedTempFile::new_in(&dir)?;
    staged.write_all(bytes)?;
    staged.flush()?;
    job.cancel.commit(|| {
        staged.persist(&job.output).map_err(|e| e.error)?;
        Ok(())
    })
}

// =============================================================================
// TimedRenderer
// =============================================================================

/// Bounds every render of the wrapped engine to `timeout`.
pub struct TimedRenderer<R> {
    engine: Arc<R>,
    timeout: Duration,
}

impl<R: RenderEngine + 'static> TimedRenderer<R> {
    pub fn new(engine: R, timeout: Duration) -> Self {
        Self {
            engine: Arc::new(engine),
            timeout,
        }
    }
}

impl<R: RenderEngine + 'static> RenderEngine for TimedRenderer<R> {
    fn render(&self, job: &RenderJob) -> Result<(), RenderError> {
        let (tx, rx) = mpsc::channel();
        let engine = Arc::clone(&self.engine);
        let worker_job = job.clone();
        thread::Builder::new()
            .name("thumbforge-render".into())
            .spawn(move || {
                // receiver may be gone after a timeout
                let _ = tx.send(engine.render(&worker_job));
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                if !job.cancel.cancel() {
                    // output landed as the wait expired; the worker is about to report
                    return rx.recv().unwrap_or_else(|_| {
                        Err(RenderError::Engine(
                            "render worker exited without a result".into(),
                        ))
                    });
                }
                tracing::warn!(
                    output = %job.output.display(),
                    timeout = ?self.timeout,
                    "render timed out; job cancelled"
                );
                Err(RenderError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(RenderError::Engine(
                "render worker exited without a result".into(),
            )),
        }
    }
}

// =============================================================================
// ChromeRenderer
// =============================================================================

/// Screenshots the page with a fresh headless Chrome per job.
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    /// Chrome/Chromium binary; `None` lets headless_chrome find one.
    pub chrome_path: Option<PathBuf>,
    /// Per-step timeout inside the browser (navigation, screenshot).
    pub page_timeout: Duration,
}

impl ChromeRenderer {
    pub fn new(chrome_path: Option<PathBuf>, page_timeout: Duration) -> Self {
        Self {
            chrome_path,
            page_timeout,
        }
    }
}

impl RenderEngine for ChromeRenderer {
    fn render(&self, job: &RenderJob) -> Result<(), RenderError> {
        let Viewport { width, height } = job.viewport;

        let scratch = tempfile::Builder::new()
            .prefix("thumbforge-")
            .suffix(".html")
            .tempfile()?;
        std::fs::write(scratch.path(), &job.html)?;

        let browser = Browser::new(LaunchOptions {
            headless: true,
            window_size: Some((width, height)),
            path: self.chrome_path.clone(),
            idle_browser_timeout: self.page_timeout,
            ..Default::default()
        })
        .map_err(engine_error)?;

        let tab = browser.new_tab().map_err(engine_error)?;
        tab.set_default_timeout(self.page_timeout);
        tab.navigate_to(&format!("file://{}", scratch.path().display()))
            .map_err(engine_error)?
            .wait_until_navigated()
            .map_err(engine_error)?;

        let clip = Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: f64::from(width),
            height: f64::from(height),
            scale: 1.0,
        };
        let png = tab
            .capture_screenshot(
                Page::CaptureScreenshotFormatOption::Png,
                None,
                Some(clip),
                true,
            )
            .map_err(engine_error)?;

        tracing::debug!(output = %job.output.display(), bytes = png.len(), "screenshot captured");
        write_artifact(job, &png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    struct SlowEngine(Duration);

    impl RenderEngine for SlowEngine {
        fn render(&self, job: &RenderJob) -> Result<(), RenderError> {
            thread::sleep(self.0);
            write_artifact(job, b"late")
        }
    }

    struct PanicEngine;

    impl RenderEngine for PanicEngine {
        fn render(&self, _job: &RenderJob) -> Result<(), RenderError> {
            panic!("engine crashed");
        }
    }

    struct FailEngine;

    impl RenderEngine for FailEngine {
        fn render(&self, _job: &RenderJob) -> Result<(), RenderError> {
            Err(RenderError::Engine("bad html".into()))
        }
    }

    fn job(tmp: &TempDir, name: &str) -> RenderJob {
        RenderJob::new("<p>x</p>".into(), tmp.path().join(name), Viewport::default())
    }

    #[test]
    fn viewport_default_is_720p() {
        assert_eq!(
            Viewport::default(),
            Viewport {
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn cancel_token_shared_between_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        assert!(a.cancel());
        assert!(b.is_cancelled());
    }

    #[test]
    fn cancel_after_commit_is_refused() {
        let token = CancelToken::new();
        token.commit(|| Ok(())).unwrap();
        assert!(!token.cancel());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn commit_after_cancel_is_refused() {
        let token = CancelToken::new();
        assert!(token.cancel());
        let mut ran = false;
        let result = token.commit(|| {
            ran = true;
            Ok(())
        });
        assert!(matches!(result, Err(RenderError::Cancelled)));
        assert!(!ran);
    }

    #[test]
    fn cancel_waits_for_commit_in_progress() {
        let token = CancelToken::new();
        let worker = token.clone();
        let (entered_tx, entered_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            worker.commit(|| {
                entered_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(100));
                Ok(())
            })
        });

        entered_rx.recv().unwrap();
        assert!(!token.cancel());
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn write_artifact_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let j = job(&tmp, "nested/dir/out.png");
        write_artifact(&j, b"png").unwrap();
        assert_eq!(std::fs::read(tmp.path().join("nested/dir/out.png")).unwrap(), b"png");
    }

    #[test]
    fn write_artifact_refuses_after_cancel() {
        let tmp = TempDir::new().unwrap();
        let j = job(&tmp, "out.png");
        j.cancel.cancel();
        assert!(matches!(write_artifact(&j, b"png"), Err(RenderError::Cancelled)));
        assert!(!j.output.exists());
    }

    #[test]
    fn timed_passes_through_success() {
        let tmp = TempDir::new().unwrap();
        let r = TimedRenderer::new(SlowEngine(Duration::ZERO), Duration::from_secs(5));
        let j = job(&tmp, "ok.png");
        r.render(&j).unwrap();
        assert!(j.output.exists());
    }

    #[test]
    fn timed_passes_through_failure() {
        let tmp = TempDir::new().unwrap();
        let r = TimedRenderer::new(FailEngine, Duration::from_secs(5));
        let err = r.render(&job(&tmp, "x.png")).unwrap_err();
        assert!(matches!(err, RenderError::Engine(m) if m == "bad html"));
    }

    #[test]
    fn timed_out_render_is_cancelled_and_never_written() {
        let tmp = TempDir::new().unwrap();
        let r = TimedRenderer::new(SlowEngine(Duration::from_millis(300)), Duration::from_millis(20));
        let j = job(&tmp, "late.png");

        let started = Instant::now();
        let err = r.render(&j).unwrap_err();
        assert!(matches!(err, RenderError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(j.cancel.is_cancelled());

        // Let the worker finish; it must not write after cancellation.
        thread::sleep(Duration::from_millis(500));
        assert!(!j.output.exists());
    }

    #[test]
    fn timed_reports_crashed_worker() {
        let tmp = TempDir::new().unwrap();
        let r = TimedRenderer::new(PanicEngine, Duration::from_secs(5));
        let err = r.render(&job(&tmp, "x.png")).unwrap_err();
        assert!(matches!(err, RenderError::Engine(_)));
    }
}
