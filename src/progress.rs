use std::sync::{Arc, Mutex};
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Controls how step output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Spinners and checkmarks.
    Normal,
    /// Like Normal, with debug tracing on stderr.
    Verbose,
    /// Only the final result lines.
    Quiet,
    /// No ANSI, plain println output (for piped/non-TTY).
    Plain,
    /// Nothing at all (tests).
    Silent,
}

impl OutputMode {
    /// Whether byte-level download bars should be drawn.
    pub fn shows_bars(self) -> bool {
        matches!(self, Self::Normal | Self::Verbose)
    }
}

/// Narrates numbered steps with spinners and checkmarks.
pub struct StepProgress {
    multi: MultiProgress,
    total_steps: usize,
    current_step: usize,
    mode: OutputMode,
}

/// Handle passed into a step closure.
#[derive(Clone)]
pub struct Step {
    done_label: Arc<Mutex<Option<String>>>,
}

impl Step {
    /// Override the completion label shown with the checkmark.
    pub fn set_done_label(&self, label: impl Into<String>) {
        if let Ok(mut slot) = self.done_label.lock() {
            *slot = Some(label.into());
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn done_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] \u{2713} {msg:.green}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn failed_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] \u{2717} {msg:.red}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl StepProgress {
    pub fn new(total_steps: usize, mode: OutputMode) -> Self {
        let multi = if mode.shows_bars() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        Self {
            multi,
            total_steps,
            current_step: 0,
            mode,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Change the step count once the real amount of work is known.
    pub fn set_total(&mut self, total_steps: usize) {
        self.total_steps = total_steps;
    }

    fn next_prefix(&mut self) -> String {
        self.current_step += 1;
        let total = self.total_steps.max(self.current_step);
        format!("{}/{total}", self.current_step)
    }

    /// Run a fallible async task as a numbered step.
    ///
    /// Shows a spinner while running, then a checkmark or a cross depending
    /// on the result. The closure receives a [`Step`] handle.
    pub async fn run<F, Fut, T, E>(&mut self, label: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(Step) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let prefix = self.next_prefix();
        tracing::info!(step = %prefix, "{label}");

        if self.mode == OutputMode::Plain {
            println!("[{prefix}] {label}");
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style());
        bar.set_prefix(prefix.clone());
        bar.set_message(label.to_string());
        if self.mode.shows_bars() {
            bar.enable_steady_tick(Duration::from_millis(80));
        }

        let step = Step {
            done_label: Arc::new(Mutex::new(None)),
        };
        let done_label = step.done_label.clone();

        let result = f(step).await;

        let done_label = done_label
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .unwrap_or_else(|| label.to_string());

        match &result {
            Ok(_) => {
                if self.mode == OutputMode::Plain {
                    println!("[{prefix}] \u{2713} {done_label}");
                }
                bar.set_style(done_style());
                bar.finish_with_message(done_label);
            }
            Err(_) => {
                if self.mode == OutputMode::Plain {
                    println!("[{prefix}] \u{2717} {label}");
                }
                bar.set_style(failed_style());
                bar.finish_with_message(label.to_string());
            }
        }

        result
    }

    /// Instant completion for steps with nothing to run.
    pub fn skip(&mut self, label: &str) {
        let prefix = self.next_prefix();
        tracing::info!(step = %prefix, "{label}");

        if self.mode == OutputMode::Plain {
            println!("[{prefix}] \u{2713} {label}");
            return;
        }

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(done_style());
        bar.set_prefix(prefix);
        bar.set_message(label.to_string());
        bar.finish();
    }

    /// Print an info line under the current step.
    pub fn info(&self, text: &str) {
        match self.mode {
            OutputMode::Plain => println!("      \u{2192} {text}"),
            OutputMode::Normal | OutputMode::Verbose => {
                self.multi
                    .println(format!("      {} {text}", style("\u{2192}").dim()))
                    .ok();
            }
            OutputMode::Quiet | OutputMode::Silent => {}
        }
    }

    /// Print a final result line; shown in every mode except Silent.
    pub fn println(&self, text: &str) {
        match self.mode {
            OutputMode::Silent => {}
            OutputMode::Normal | OutputMode::Verbose => {
                self.multi.println(text).ok();
            }
            OutputMode::Plain | OutputMode::Quiet => println!("{text}"),
        }
    }

    /// Access MultiProgress for adding child bars (e.g., download progress).
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_returns_closure_result() {
        let mut progress = StepProgress::new(2, OutputMode::Silent);
        let ok: Result<u32, String> = progress.run("first", |_| async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
        let err: Result<u32, String> = progress
            .run("second", |_| async { Err("boom".to_string()) })
            .await;
        assert_eq!(err.unwrap_err(), "boom");
        assert_eq!(progress.current_step, 2);
    }

    #[tokio::test]
    async fn total_grows_when_exceeded() {
        let mut progress = StepProgress::new(1, OutputMode::Silent);
        progress.skip("one");
        assert_eq!(progress.next_prefix(), "2/2");
    }

    #[tokio::test]
    async fn done_label_override_is_taken() {
        let mut progress = StepProgress::new(1, OutputMode::Silent);
        let result: Result<(), ()> = progress
            .run("Fetching", |step| async move {
                step.set_done_label("Fetched");
                Ok(())
            })
            .await;
        assert!(result.is_ok());
    }
}
