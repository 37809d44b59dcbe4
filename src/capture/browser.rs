use super::locate::{parse_candidates, select_target, CANDIDATES_SCRIPT};
use super::warmup::{run_warmup, WarmupStep, DEFAULT_STEPS};
use crate::error::CaptureError;
use crate::lifecycle::SessionDriver;
use headless_chrome::protocol::cdp::Page::{CaptureScreenshotFormatOption, Viewport};
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const CHROME_ARGS: [&str; 4] = [
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-plugins",
];

const READY_POLL: Duration = Duration::from_millis(500);

/// Evaluates JavaScript in the page and hands back the result value.
pub trait ScriptRunner {
    fn run_script(&self, script: &str) -> Result<Value, CaptureError>;
}

impl ScriptRunner for Tab {
    fn run_script(&self, script: &str) -> Result<Value, CaptureError> {
        let result = self
            .evaluate(script, false)
            .map_err(|e| CaptureError::CaptureFailed(format!("script evaluation failed: {e:#}")))?;
        Ok(result.value.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Clone)]
pub struct PageOptions {
    /// Output scale applied to the captured element
    pub zoom: f64,
    /// Time to let the embedded player start after the page loads
    pub settle: Duration,
    /// Upper bound for navigation and the document to become ready
    pub load_timeout: Duration,
    pub window: (u32, u32),
    pub warmup: Vec<WarmupStep>,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            settle: Duration::from_secs(15),
            load_timeout: Duration::from_secs(30),
            window: (1920, 1080),
            warmup: DEFAULT_STEPS.to_vec(),
        }
    }
}

/// A headless Chrome instance with one tab showing the webcam page.
pub struct PageSession {
    browser: Browser,
    tab: Arc<Tab>,
}

/// Screenshots the dominant media element of a webcam page.
pub struct BrowserDriver {
    url: String,
    options: PageOptions,
}

impl BrowserDriver {
    pub fn new(url: impl Into<String>, options: PageOptions) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }

    fn launch(&self) -> Result<Browser, CaptureError> {
        let args: Vec<&OsStr> = CHROME_ARGS.iter().map(OsStr::new).collect();
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some(self.options.window))
            .idle_browser_timeout(Duration::from_secs(24 * 60 * 60))
            .args(args)
            .build()
            .map_err(|e| CaptureError::AcquisitionFailed(format!("invalid launch options: {e}")))?;

        Browser::new(launch_options)
            .map_err(|e| CaptureError::AcquisitionFailed(format!("failed to launch Chrome: {e:#}")))
    }

    /// Wait for `document.readyState == "complete"`. A page that never gets
    /// there is still used.
    fn wait_for_ready(&self, tab: &Tab) {
        let deadline = Instant::now() + self.options.load_timeout;
        loop {
            match tab.run_script("document.readyState") {
                Ok(Value::String(state)) if state == "complete" => {
                    tracing::debug!(url = %self.url, "Page ready");
                    return;
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(url = %self.url, "readyState check failed: {}", e),
            }
            if Instant::now() >= deadline {
                tracing::warn!(url = %self.url, "Page load timed out; proceeding anyway");
                return;
            }
            std::thread::sleep(READY_POLL);
        }
    }
}

impl SessionDriver for BrowserDriver {
    type Session = PageSession;

    fn acquire(&mut self) -> Result<PageSession, CaptureError> {
        tracing::info!(url = %self.url, "Loading webcam page");

        let browser = self.launch()?;
        let tab = browser
            .new_tab()
            .map_err(|e| CaptureError::AcquisitionFailed(format!("failed to open tab: {e:#}")))?;
        tab.set_default_timeout(self.options.load_timeout);

        tab.navigate_to(&self.url)
            .map_err(|e| CaptureError::AcquisitionFailed(format!("navigation failed: {e:#}")))?;
        if let Err(e) = tab.wait_until_navigated() {
            tracing::warn!(url = %self.url, "Navigation did not settle: {:#}", e);
        }

        self.wait_for_ready(&tab);

        if !self.options.settle.is_zero() {
            tracing::debug!(
                url = %self.url,
                "Waiting {:.0}s for the stream to start",
                self.options.settle.as_secs_f64()
            );
            std::thread::sleep(self.options.settle);
        }

        let acted = run_warmup(&*tab, &self.options.warmup, &self.url);
        tracing::debug!(url = %self.url, acted, "Warm-up finished");

        Ok(PageSession { browser, tab })
    }

    fn capture(&mut self, session: &mut PageSession) -> Result<Vec<u8>, CaptureError> {
        let tab = &session.tab;

        // A tab that cannot answer a trivial script is dead.
        tab.evaluate("document.readyState", false)
            .map_err(|e| CaptureError::SessionDead(format!("{e:#}")))?;

        let report = match tab.run_script(CANDIDATES_SCRIPT)? {
            Value::String(json) => json,
            other => {
                return Err(CaptureError::CaptureFailed(format!(
                    "unexpected element report: {other}"
                )))
            }
        };
        let candidates = parse_candidates(&report)?;
        let target = select_target(&candidates).ok_or(CaptureError::ElementNotFound)?;

        tracing::debug!(
            url = %self.url,
            tag = %target.tag,
            depth = target.depth,
            "Capturing {:.0}x{:.0} element",
            target.width,
            target.height
        );

        let clip = Viewport {
            x: target.x,
            y: target.y,
            width: target.width,
            height: target.height,
            scale: self.options.zoom,
        };
        tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, Some(clip), true)
            .map_err(|e| CaptureError::CaptureFailed(format!("screenshot failed: {e:#}")))
    }

    fn release(&mut self, session: PageSession) -> Result<(), CaptureError> {
        let PageSession { browser, tab } = session;
        let closed = tab.close(false);
        // Dropping the browser terminates the Chrome process.
        drop(browser);
        closed
            .map(|_| ())
            .map_err(|e| CaptureError::SessionDead(format!("failed to close tab: {e:#}")))
    }
}
