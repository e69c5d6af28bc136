use crate::deploy::DeployReporter;
use crate::progress::ProgressSink;
use crate::ui::icons::{CHECK, CROSS, INFO, PACKAGE, ROCKET};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Terminal UI for a deploy, rendered via `indicatif`.
///
/// Two widgets are used, one at a time:
/// - Compression spinner — runs while the bundle is written
/// - Upload bar — fixed-length bar driven by [`ProgressSink`] updates
///
/// Status lines and widgets go to stdout, errors to stderr. When stdout is
/// not a terminal `indicatif` hides the widgets and only the status lines
/// remain.
pub struct DeployUI {
    spinner: Mutex<Option<ProgressBar>>,
    verbose: bool,
}

impl DeployUI {
    pub fn new(verbose: bool) -> Self {
        Self {
            spinner: Mutex::new(None),
            verbose,
        }
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        println!("{}", msg.as_ref());
    }
}

/// A widget drawn on stdout, alongside the status lines.
fn stdout_widget(len: Option<u64>) -> ProgressBar {
    ProgressBar::with_draw_target(len, ProgressDrawTarget::stdout())
}

impl DeployReporter for DeployUI {
    fn info(&self, msg: &str) {
        self.print_line(format!("{}{}", INFO, style(msg).cyan()));
    }

    fn success(&self, msg: &str) {
        self.print_line(format!("{}{}", CHECK, style(msg).green().bold()));
    }

    fn error(&self, msg: &str) {
        eprintln!("{}{}", CROSS, style(msg).red().bold());
    }

    fn detail(&self, msg: &str) {
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(msg).dim()));
        }
    }

    fn start_compression(&self) {
        let spinner = stdout_widget(None);
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .expect("progress bar template is a valid static string"),
        );
        spinner.set_message(format!("{}Compressing", PACKAGE));
        spinner.enable_steady_tick(Duration::from_millis(100));
        if let Ok(mut slot) = self.spinner.lock() {
            *slot = Some(spinner);
        }
    }

    fn finish_compression(&self) {
        if let Ok(mut slot) = self.spinner.lock()
            && let Some(spinner) = slot.take()
        {
            spinner.finish_and_clear();
        }
    }

    fn upload_sink(&self, steps: u64) -> Arc<dyn ProgressSink> {
        let bar = stdout_widget(Some(steps));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:20.cyan/blue}] {pos}/{len}")
                .expect("progress bar template is a valid static string")
                .progress_chars("▣▣□"),
        );
        bar.set_prefix(format!("{}    Uploading", ROCKET));
        Arc::new(UploadBar { bar })
    }
}

/// Upload bar fed by the transport's progress notifications.
struct UploadBar {
    bar: ProgressBar,
}

impl ProgressSink for UploadBar {
    fn set_step(&self, step: u64) {
        self.bar.set_position(step);
    }

    fn finish(&self) {
        self.bar.finish();
    }
}
