//! Download progress rendering.

use std::sync::Mutex;

use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use tundra_fetch::FetchProgress;

use crate::output::OutputMode;

/// Progress sink for interactive runs: one [`indicatif`] bar per
/// transfer, silent in JSON mode so stdout stays machine-readable.
pub struct TextProgress {
    bar: Mutex<Option<ProgressBar>>,
    enabled: bool,
}

impl TextProgress {
    /// A sink fitting the output mode.
    pub fn for_mode(mode: OutputMode) -> Self {
        Self {
            bar: Mutex::new(None),
            enabled: mode == OutputMode::Text,
        }
    }

    fn bar_for(&self, url: &str, total: Option<u64>) -> ProgressBar {
        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = guard.as_ref() {
            return bar.clone();
        }
        let bar = match total {
            Some(total) => ProgressBar::new(total).with_style(
                ProgressStyle::with_template(
                    "{msg:.bold} {bar:30} {bytes}/{total_bytes} ({bytes_per_sec})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            ),
            None => ProgressBar::new_spinner(),
        };
        bar.set_message(short_name(url));
        *guard = Some(bar.clone());
        bar
    }
}

impl FetchProgress for TextProgress {
    fn on_progress(&self, url: &str, downloaded: u64, total: Option<u64>) {
        if !self.enabled {
            return;
        }
        let bar = self.bar_for(url, total);
        bar.set_position(downloaded);
    }

    fn on_done(&self, url: &str, downloaded: u64) {
        if !self.enabled {
            return;
        }
        let mut guard = self.bar.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bar) = guard.take() {
            bar.finish_and_clear();
        }
        eprintln!("{} {}", short_name(url), format_size(downloaded, BINARY));
    }
}

fn short_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names() {
        assert_eq!(
            short_name("https://h/repo/rpms/foo-1.0-1.x86_64.rpm"),
            "foo-1.0-1.x86_64.rpm"
        );
        assert_eq!(short_name("plain"), "plain");
    }

    #[test]
    fn json_mode_stays_silent() {
        let progress = TextProgress::for_mode(OutputMode::Json);
        progress.on_progress("url", 10, Some(100));
        progress.on_done("url", 100);
        assert!(progress.bar.lock().unwrap().is_none());
    }
}
