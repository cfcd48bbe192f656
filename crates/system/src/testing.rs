use crate::source::{SampleError, SampleSource};
use mx_core::Sample;
use std::collections::VecDeque;

/// Replays a fixed script of source results, then fails.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<Sample, SampleError>>,
}

impl ScriptedSource {
    pub fn new(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            script: samples.into_iter().map(Ok).collect(),
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.script.push_back(Ok(sample));
    }

    pub fn push_failure(&mut self) {
        self.script
            .push_back(Err(SampleError::Parse("scripted failure".to_string())));
    }
}

impl SampleSource for ScriptedSource {
    fn current_sample(&mut self) -> Result<Sample, SampleError> {
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(SampleError::Process("script exhausted".to_string())))
    }
}
