use polars::prelude::DataFrame;

use crate::error::Result;

type StageFn<'a> = Box<dyn Fn(DataFrame) -> Result<DataFrame> + 'a>;
type ObserverFn<'a> = Box<dyn Fn(&'static str, &DataFrame) + 'a>;

struct Stage<'a> {
    name: &'static str,
    run: StageFn<'a>,
}

/// An ordered list of named transformation steps, each taking and returning
/// a frame. Execution stops at the first failing stage.
///
/// The plan does no logging of its own; the owning pipeline registers an
/// observer so stage events are emitted under that pipeline's target.
#[derive(Default)]
pub struct StagePlan<'a> {
    stages: Vec<Stage<'a>>,
    observer: Option<ObserverFn<'a>>,
}

impl<'a> StagePlan<'a> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            observer: None,
        }
    }

    pub fn then<F>(mut self, name: &'static str, run: F) -> Self
    where
        F: Fn(DataFrame) -> Result<DataFrame> + 'a,
    {
        self.stages.push(Stage {
            name,
            run: Box::new(run),
        });
        self
    }

    /// Called with the stage name and its output after each successful stage.
    pub fn inspect<F>(mut self, observer: F) -> Self
    where
        F: Fn(&'static str, &DataFrame) + 'a,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name).collect()
    }

    pub fn run(&self, mut df: DataFrame) -> Result<DataFrame> {
        for stage in &self.stages {
            df = (stage.run)(df)?;
            if let Some(observer) = &self.observer {
                observer(stage.name, &df);
            }
        }
        Ok(df)
    }
}

impl std::fmt::Debug for StagePlan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePlan")
            .field("stages", &self.names())
            .finish()
    }
}
