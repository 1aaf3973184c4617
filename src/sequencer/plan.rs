//! Run plan - a growable ordered list of steps with a forward-only cursor.
//!
//! Follow-up steps are inserted directly after the step that triggered them
//! while the plan is being walked, so the plan is indexed, not iterated.

/// One entry of the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub id: String,
    /// Plan index of the step whose outcome inserted this one
    pub parent: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RunPlan {
    steps: Vec<PlannedStep>,
    cursor: usize,
    initial_len: usize,
}

impl RunPlan {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps: Vec<PlannedStep> = ids
            .into_iter()
            .map(|id| PlannedStep {
                id: id.into(),
                parent: None,
            })
            .collect();
        let initial_len = steps.len();
        Self {
            steps,
            cursor: 0,
            initial_len,
        }
    }

    /// Advance to the next step, returning its index
    pub fn next_step(&mut self) -> Option<(usize, PlannedStep)> {
        let index = self.cursor;
        let step = self.steps.get(index)?.clone();
        self.cursor += 1;
        Some((index, step))
    }

    /// Insert `id` right after the step most recently returned by `next_step`
    pub fn insert_next(&mut self, id: impl Into<String>, parent: usize) {
        self.steps.insert(
            self.cursor,
            PlannedStep {
                id: id.into(),
                parent: Some(parent),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn initial_len(&self) -> usize {
        self.initial_len
    }

    /// Number of steps already handed out
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Denominator for overall progress. Never smaller than the number of
    /// steps finished plus the one running.
    pub fn progress_total(&self, completed: usize) -> usize {
        self.initial_len.max(self.steps.len()).max(completed + 1)
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }
}
