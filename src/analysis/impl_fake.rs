use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
};

use crate::analysis::{AnalysisError, AnalysisResult, Analyzer};

/// Answers each `analyze` call with the next scripted outcome and counts
/// the calls. An exhausted script answers as a model that returned no text.
#[derive(Default)]
pub struct ScriptedAnalyzer {
    script: RefCell<VecDeque<Result<AnalysisResult, AnalysisError>>>,
    calls: Cell<usize>,
    seen: RefCell<Vec<(usize, String)>>,
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_verdict(self, disease: &str, confidence: f64, explanation: &str) -> Self {
        self.script.borrow_mut().push_back(Ok(AnalysisResult {
            disease: disease.to_string(),
            confidence,
            explanation: explanation.to_string(),
        }));
        self
    }

    pub fn then_error(self, error: AnalysisError) -> Self {
        self.script.borrow_mut().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// `(byte length, mime type)` of every image analyzed.
    pub fn seen(&self) -> Vec<(usize, String)> {
        self.seen.borrow().clone()
    }
}

impl Analyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.calls.set(self.calls.get() + 1);
        self.seen
            .borrow_mut()
            .push((image.len(), mime_type.to_string()));
        let next = self.script.borrow_mut().pop_front();
        next.unwrap_or(Err(AnalysisError::NoText))
    }
}
