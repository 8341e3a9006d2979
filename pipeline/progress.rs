use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use std::io::IsTerminal;
use std::time::Duration;

/// Stages reported while the pipeline runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    ChiSquareScreen,
    InteractionExpansion,
    StabilitySelection,
    ModelFitting,
    ResultAssembly,
    Output,
}

impl PipelineStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::ChiSquareScreen => "chi-square screen",
            Self::InteractionExpansion => "interaction expansion",
            Self::StabilitySelection => "stability selection",
            Self::ModelFitting => "L1 logistic model fitting",
            Self::ResultAssembly => "result assembly",
            Self::Output => "writing outputs",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting progress through the stages of a run.
pub trait ProgressObserver {
    fn on_stage_start(&mut self, stage: PipelineStage, features: usize) {
        let _ = (stage, features);
    }
    fn on_stage_finish(&mut self, stage: PipelineStage, features: usize) {
        let _ = (stage, features);
    }
}

#[derive(Default)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {}

/// Spinner on stderr, drawn only when stderr is a terminal.
#[derive(Default)]
pub struct ConsoleProgress {
    spinner: Option<ProgressBar>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressObserver for ConsoleProgress {
    fn on_stage_start(&mut self, stage: PipelineStage, features: usize) {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let spinner = ProgressBar::with_draw_target(None, draw_target);
        spinner.set_style(
            ProgressStyle::with_template("> [{elapsed_precise}] {spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("{stage} ({features} features)"));
        spinner.enable_steady_tick(Duration::from_millis(100));
        if let Some(previous) = self.spinner.replace(spinner) {
            previous.finish_and_clear();
        }
    }

    fn on_stage_finish(&mut self, stage: PipelineStage, features: usize) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        log::info!("Finished {stage}: {features} features remain");
    }
}
