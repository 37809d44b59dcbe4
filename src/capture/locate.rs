//! Finding the element that actually shows the camera picture.
//!
//! The page reports every video, canvas and image element it can see,
//! walking into same-origin frames. Cross-origin frames cannot be inspected
//! and are reported as a single candidate covering the frame.

use crate::error::CaptureError;
use serde::Deserialize;

/// Elements smaller than this on either side are never the player.
pub const MIN_SIDE: f64 = 32.0;

/// Returns a JSON string with every candidate in page coordinates.
pub const CANDIDATES_SCRIPT: &str = r#"(() => {
  const out = [];
  const isShown = (el, rect, view) => {
    if (rect.width <= 0 || rect.height <= 0) return false;
    const style = view ? view.getComputedStyle(el) : null;
    if (!style) return true;
    return style.visibility !== 'hidden'
      && style.display !== 'none'
      && parseFloat(style.opacity || '1') > 0;
  };
  const walk = (doc, ox, oy, depth) => {
    const view = doc.defaultView;
    for (const el of doc.querySelectorAll('video, canvas, img')) {
      const r = el.getBoundingClientRect();
      out.push({
        tag: el.tagName.toLowerCase(), depth,
        x: r.left + ox, y: r.top + oy, width: r.width, height: r.height,
        visible: isShown(el, r, view),
      });
    }
    for (const frame of doc.querySelectorAll('iframe, frame')) {
      const r = frame.getBoundingClientRect();
      let inner = null;
      try { inner = frame.contentDocument; } catch (e) { inner = null; }
      if (inner && inner.documentElement) {
        walk(inner, ox + r.left + frame.clientLeft, oy + r.top + frame.clientTop, depth + 1);
      } else {
        out.push({
          tag: 'iframe', depth: depth + 1,
          x: r.left + ox, y: r.top + oy, width: r.width, height: r.height,
          visible: isShown(frame, r, view),
        });
      }
    }
  };
  walk(document, window.scrollX, window.scrollY, 0);
  return JSON.stringify(out);
})()"#;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Candidate {
    pub tag: String,
    /// Frame nesting level, 0 for the top-level document
    pub depth: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub visible: bool,
}

impl Candidate {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    fn qualifies(&self) -> bool {
        self.visible && self.width >= MIN_SIDE && self.height >= MIN_SIDE
    }
}

pub fn parse_candidates(json: &str) -> Result<Vec<Candidate>, CaptureError> {
    serde_json::from_str(json)
        .map_err(|e| CaptureError::CaptureFailed(format!("unreadable element list: {e}")))
}

/// Pick the largest qualifying element at the shallowest frame depth that
/// has one. Ties keep document order.
pub fn select_target(candidates: &[Candidate]) -> Option<&Candidate> {
    let depth = candidates
        .iter()
        .filter(|c| c.qualifies())
        .map(|c| c.depth)
        .min()?;

    candidates
        .iter()
        .filter(|c| c.qualifies() && c.depth == depth)
        .fold(None, |best: Option<&Candidate>, c| match best {
            Some(b) if b.area() >= c.area() => Some(b),
            _ => Some(c),
        })
}
