use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::llm::client::{
    InlineImage, ModelClient, ModelError, ModelRequest, ModelResponse, RequestKind,
};

type Responder = Box<dyn Fn(&ModelRequest, usize) -> Result<ModelResponse, ModelError> + Send + Sync>;

/// Scripted `ModelClient` that records every request it receives.
#[derive(Default)]
pub struct FakeModel {
    responders: HashMap<RequestKind, Responder>,
    calls: Mutex<Vec<ModelRequest>>,
}

impl FakeModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// `respond` receives the request and how many calls of this kind came before it.
    pub fn on<F>(mut self, kind: RequestKind, respond: F) -> Self
    where
        F: Fn(&ModelRequest, usize) -> Result<ModelResponse, ModelError> + Send + Sync + 'static,
    {
        self.responders.insert(kind, Box::new(respond));
        self
    }

    pub fn on_text(self, kind: RequestKind, text: &str) -> Self {
        let text = text.to_string();
        self.on(kind, move |_, _| Ok(ModelResponse::from_text(text.clone())))
    }

    pub fn on_error(self, kind: RequestKind, error: ModelError) -> Self {
        self.on(kind, move |_, _| Err(error.clone()))
    }

    pub fn on_image(self, data: Vec<u8>) -> Self {
        self.on(RequestKind::Render, move |_, _| {
            Ok(ModelResponse::from_image(InlineImage {
                mime_type: "image/png".to_string(),
                data: data.clone(),
            }))
        })
    }

    pub fn calls(&self) -> Vec<ModelRequest> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, kind: RequestKind) -> Vec<ModelRequest> {
        self.calls
            .lock()
            .iter()
            .filter(|request| request.kind == kind)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ModelClient for FakeModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let previous = {
            let mut calls = self.calls.lock();
            let previous = calls.iter().filter(|call| call.kind == request.kind).count();
            calls.push(request.clone());
            previous
        };
        match self.responders.get(&request.kind) {
            Some(respond) => respond(request, previous),
            None => Err(ModelError::Api {
                status: 500,
                message: format!("no scripted response for {}", request.kind.as_str()),
            }),
        }
    }
}
