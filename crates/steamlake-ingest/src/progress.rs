//! Progress bar utilities for the ingestion stages
//!
//! Stages take a `&ProgressBar` and never decide on visibility themselves;
//! callers that want silence pass [`hidden`].

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const DOWNLOAD_TEMPLATE: &str =
    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})";
const COUNT_TEMPLATE: &str =
    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Byte-counting bar; the length is filled in once Content-Length is known
pub fn download_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(bar_style(DOWNLOAD_TEMPLATE));
    pb.set_message(message.to_string());
    pb
}

/// Item-counting bar (archive members, files uploaded)
pub fn count_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(bar_style(COUNT_TEMPLATE));
    pb.set_message(message.to_string());
    pb
}

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// A bar that draws nothing but still counts
pub fn hidden() -> ProgressBar {
    ProgressBar::hidden()
}

/// Hands out bars, or hidden ones when progress output is disabled
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    visible: bool,
}

impl Progress {
    pub fn new(visible: bool) -> Self {
        Self { visible }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn download(&self, message: &str) -> ProgressBar {
        if self.visible {
            download_bar(message)
        } else {
            hidden()
        }
    }

    pub fn count(&self, total: u64, message: &str) -> ProgressBar {
        if self.visible {
            count_bar(total, message)
        } else {
            let pb = hidden();
            pb.set_length(total);
            pb
        }
    }

    pub fn spinner(&self, message: &str) -> ProgressBar {
        if self.visible {
            spinner(message)
        } else {
            hidden()
        }
    }
}

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
