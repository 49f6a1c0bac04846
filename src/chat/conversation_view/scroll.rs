//! Scroll classification and the jump-to-latest affordance.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Geometry of the scrollable message pane, in pixels, as reported by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn new(scroll_top: f64, scroll_height: f64, client_height: f64) -> Self {
        Self {
            scroll_top,
            scroll_height,
            client_height,
        }
    }

    pub fn distance_from_bottom(&self) -> f64 {
        self.scroll_height - self.scroll_top - self.client_height
    }

    pub fn is_at_bottom(&self, threshold_px: f64) -> bool {
        self.distance_from_bottom() < threshold_px
    }
}

/// Tracks whether the viewer sits at the bottom and whether the
/// jump-to-latest button is showing.
#[derive(Debug, Clone)]
pub(crate) struct ScrollTracker {
    threshold_px: f64,
    hide_after: Duration,
    at_bottom: bool,
    show_jump_to_latest: bool,
    hide_deadline: Option<Instant>,
}

impl ScrollTracker {
    pub(crate) fn new(threshold_px: f64, hide_after: Duration) -> Self {
        Self {
            threshold_px,
            hide_after,
            at_bottom: true,
            show_jump_to_latest: false,
            hide_deadline: None,
        }
    }

    pub(crate) fn at_bottom(&self) -> bool {
        self.at_bottom
    }

    pub(crate) fn show_jump_to_latest(&self) -> bool {
        self.show_jump_to_latest
    }

    pub(crate) fn hide_deadline(&self) -> Option<Instant> {
        self.hide_deadline
    }

    /// Classifies a scroll event. Every event away from the bottom shows the
    /// button and restarts its hide timer; reaching the bottom hides it.
    pub(crate) fn on_scroll(&mut self, metrics: &ScrollMetrics, now: Instant) {
        self.at_bottom = metrics.is_at_bottom(self.threshold_px);
        if self.at_bottom {
            self.dismiss();
        } else {
            self.show_jump_to_latest = true;
            self.hide_deadline = Some(now + self.hide_after);
        }
    }

    /// Hides the button if its timer has run out. Returns true when it did.
    pub(crate) fn expire(&mut self, now: Instant) -> bool {
        match self.hide_deadline {
            Some(deadline) if deadline <= now => {
                self.show_jump_to_latest = false;
                self.hide_deadline = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn dismiss(&mut self) {
        self.show_jump_to_latest = false;
        self.hide_deadline = None;
    }
}
