//! Bouncing activity indicator: `Updating [   =    ]`.
//!
//! svn reports no progress, so this only shows that something is running.

use std::time::Duration;

/// Time between frames.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Number of positions the marker moves across.
const WIDTH: usize = 8;

#[derive(Debug, Clone)]
pub struct Progress {
    message: String,
    success_message: String,
    position: usize,
    forward: bool,
}

impl Progress {
    pub fn new(message: impl Into<String>, success_message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success_message: success_message.into(),
            position: 0,
            forward: true,
        }
    }

    /// Current frame without advancing.
    pub fn frame(&self) -> String {
        let before = self.position;
        let after = WIDTH - 1 - before;
        format!(
            "{} [{}={}]",
            self.message,
            " ".repeat(before),
            " ".repeat(after)
        )
    }

    /// Return the current frame and move the marker one step, bouncing at the edges.
    pub fn tick(&mut self) -> String {
        let frame = self.frame();
        if self.position == WIDTH - 1 {
            self.forward = false;
        } else if self.position == 0 {
            self.forward = true;
        }
        if self.forward {
            self.position += 1;
        } else {
            self.position -= 1;
        }
        frame
    }

    /// Final status line: the success message, or nothing after a failure.
    pub fn finish(&self, succeeded: bool) -> &str {
        if succeeded { &self.success_message } else { "" }
    }
}
