//! Scripted collaborators shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::events::{CompletionEvent, EventSink};
use crate::provider::{ContentProvider, Generation, GenerationRequest, ProviderError};
use crate::qc::{QcEvaluator, QcReport};
use crate::state_machine::JobInput;

enum Step {
    Ok(String),
    Transient(String),
    Fatal(String),
}

/// Replays queued results, then produces a unique draft per call.
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn push(self, step: Step) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    pub fn ok(self, text: &str) -> Self {
        self.push(Step::Ok(text.to_string()))
    }

    pub fn transient(self, reason: &str) -> Self {
        self.push(Step::Transient(reason.to_string()))
    }

    pub fn fatal(self, reason: &str) -> Self {
        self.push(Step::Fatal(reason.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        // Hand control back once so a caller can be dropped mid-call, like a real request.
        tokio::task::yield_now().await;
        self.requests.lock().unwrap().push(request.clone());
        let step = self.script.lock().unwrap().pop_front();
        let text = match step {
            Some(Step::Ok(text)) => text,
            Some(Step::Transient(reason)) => {
                return Err(ProviderError::transient(&self.name, reason));
            }
            Some(Step::Fatal(reason)) => return Err(ProviderError::fatal(&self.name, reason)),
            None => format!("{} draft #{n} about {}", self.name, request.input.anchor_text),
        };
        Ok(Generation {
            text,
            tokens_used: 100,
            cost_usd: 0.01,
            provider: self.name.clone(),
        })
    }
}

/// Replays queued reports or failures, then passes everything.
#[derive(Default)]
pub struct ScriptedEvaluator {
    script: Mutex<VecDeque<Result<QcReport, String>>>,
    calls: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, report: QcReport) -> Self {
        self.script.lock().unwrap().push_back(Ok(report));
        self
    }

    pub fn fail(self, reason: &str) -> Self {
        self.script.lock().unwrap().push_back(Err(reason.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QcEvaluator for ScriptedEvaluator {
    async fn evaluate(&self, _input: &JobInput, _text: &str) -> Result<QcReport, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Ok(report)) => Ok(report),
            Some(Err(reason)) => Err(ProviderError::fatal("qc", reason)),
            None => Ok(QcReport::pass(95)),
        }
    }
}

/// Records every emitted event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CompletionEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<CompletionEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: CompletionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn sample_input() -> JobInput {
    JobInput::new("a.com", "https://b.com/x", "best tool")
}
