//! Scenario step progression.

use std::sync::Arc;

use rehearse_types::ScenarioStep;

/// Emitted by [`ScenarioEngine`] as the cursor moves.
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioNotice {
    StepChanged { index: usize, step: ScenarioStep },
    /// `advance` was called while on the last step.
    Completed,
}

type NoticeSink = Box<dyn Fn(ScenarioNotice) + Send + Sync>;

/// Walks a scenario's ordered steps.
///
/// Every operation other than [`Self::start`] is a no-op until the engine
/// has been started, and again after [`Self::stop`].
pub struct ScenarioEngine {
    steps: Arc<[ScenarioStep]>,
    index: Option<usize>,
    started: bool,
    sink: NoticeSink,
}

impl std::fmt::Debug for ScenarioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioEngine")
            .field("steps", &self.steps.len())
            .field("index", &self.index)
            .field("started", &self.started)
            .finish()
    }
}

impl ScenarioEngine {
    pub fn new<F>(steps: impl Into<Arc<[ScenarioStep]>>, sink: F) -> Self
    where
        F: Fn(ScenarioNotice) + Send + Sync + 'static,
    {
        Self {
            steps: steps.into(),
            index: None,
            started: false,
            sink: Box::new(sink),
        }
    }

    /// Moves to the first step. No-op if already started.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.advance();
    }

    /// Returns to "before the first step" and stops responding.
    pub fn stop(&mut self) {
        self.started = false;
        self.index = None;
    }

    /// Moves forward one step, or reports completion on the last one.
    pub fn advance(&mut self) {
        if !self.started {
            return;
        }
        let next = self.index.map_or(0, |i| i + 1);
        if next < self.steps.len() {
            self.index = Some(next);
            self.notify_step();
        } else {
            tracing::info!(steps = self.steps.len(), "scenario completed");
            (self.sink)(ScenarioNotice::Completed);
        }
    }

    pub fn previous(&mut self) {
        if !self.started {
            return;
        }
        if let Some(index) = self.index.filter(|i| *i > 0) {
            self.index = Some(index - 1);
            self.notify_step();
        }
    }

    /// Jumps to `index`. Out-of-range indices are ignored.
    pub fn set_index(&mut self, index: usize) {
        if !self.started || index >= self.steps.len() {
            return;
        }
        self.index = Some(index);
        self.notify_step();
    }

    /// Returns to the first step, re-announcing it even if already there.
    pub fn reset(&mut self) {
        if !self.started {
            return;
        }
        self.index = Some(0);
        self.notify_step();
    }

    pub fn current_step(&self) -> Option<&ScenarioStep> {
        self.index.and_then(|i| self.steps.get(i))
    }

    /// Cursor position; `None` before the first step.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn notify_step(&self) {
        let Some((index, step)) = self.index.and_then(|i| self.steps.get(i).map(|s| (i, s))) else {
            return;
        };
        tracing::debug!(index, step_id = %step.id, "scenario step changed");
        (self.sink)(ScenarioNotice::StepChanged {
            index,
            step: step.clone(),
        });
    }
}
