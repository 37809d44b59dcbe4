//! Best-effort interactions that coax embedded players into showing video.
//!
//! Each step runs once per session acquisition, in order. A step that throws
//! or finds nothing to do is logged and skipped; none of them is required for
//! a capture to succeed.

use super::browser::ScriptRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupStep {
    /// Click consent/close buttons and hide full-page overlays
    DismissOverlays,
    /// Start muted playback and press any visible play button
    ClickPlay,
    /// Ask the largest video to go fullscreen
    RequestFullscreen,
}

pub const DEFAULT_STEPS: [WarmupStep; 3] = [
    WarmupStep::DismissOverlays,
    WarmupStep::ClickPlay,
    WarmupStep::RequestFullscreen,
];

impl WarmupStep {
    pub fn name(self) -> &'static str {
        match self {
            Self::DismissOverlays => "dismiss-overlays",
            Self::ClickPlay => "click-play",
            Self::RequestFullscreen => "request-fullscreen",
        }
    }

    /// Each script evaluates to `true` when it changed something.
    fn script(self) -> &'static str {
        match self {
            Self::DismissOverlays => {
                r#"(() => {
  let acted = false;
  const words = /^(accept|agree|ok|got it|close|dismiss|continue|i understand|x|×)$/i;
  for (const el of document.querySelectorAll('button, [role="button"], a')) {
    const text = (el.innerText || el.getAttribute('aria-label') || '').trim();
    if (words.test(text)) { el.click(); acted = true; }
  }
  for (const el of document.querySelectorAll('body *')) {
    const style = getComputedStyle(el);
    if (style.position !== 'fixed' || parseInt(style.zIndex || '0', 10) < 1000) continue;
    if (el.querySelector('video, canvas, iframe')) continue;
    const r = el.getBoundingClientRect();
    if (r.width >= innerWidth * 0.5 && r.height >= innerHeight * 0.5) {
      el.style.display = 'none';
      acted = true;
    }
  }
  return acted;
})()"#
            }
            Self::ClickPlay => {
                r#"(() => {
  let acted = false;
  for (const v of document.querySelectorAll('video')) {
    v.muted = true;
    if (v.paused) { const p = v.play(); if (p && p.catch) p.catch(() => {}); acted = true; }
  }
  const selectors = [
    '.vjs-big-play-button', '.ytp-large-play-button', '.jw-icon-display',
    '[aria-label*="play" i]', 'button[title*="play" i]', '.play-button', '.play',
  ];
  for (const sel of selectors) {
    const el = document.querySelector(sel);
    if (el) { el.click(); acted = true; break; }
  }
  return acted;
})()"#
            }
            Self::RequestFullscreen => {
                r#"(() => {
  let best = null, area = 0;
  for (const v of document.querySelectorAll('video')) {
    const r = v.getBoundingClientRect();
    if (r.width * r.height > area) { best = v; area = r.width * r.height; }
  }
  if (!best || !best.requestFullscreen) return false;
  const p = best.requestFullscreen();
  if (p && p.catch) p.catch(() => {});
  return true;
})()"#
            }
        }
    }
}

/// Run `steps` in order, ignoring failures. Returns how many steps reported
/// that they did something.
pub fn run_warmup<R: ScriptRunner + ?Sized>(runner: &R, steps: &[WarmupStep], label: &str) -> usize {
    let mut acted = 0;
    for step in steps {
        match runner.run_script(step.script()) {
            Ok(serde_json::Value::Bool(true)) => {
                tracing::debug!(source = %label, step = step.name(), "Warm-up step applied");
                acted += 1;
            }
            Ok(_) => {
                tracing::debug!(source = %label, step = step.name(), "Warm-up step had nothing to do");
            }
            Err(e) => {
                tracing::warn!(source = %label, step = step.name(), "Warm-up step failed: {}", e);
            }
        }
    }
    acted
}
