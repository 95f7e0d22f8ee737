//! Scripted generation client.
//!
//! Answers prompts from a rule table instead of calling a model. Used by
//! tests and by the CLI's offline mode.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use parking_lot::RwLock;

use crate::client::{GenerationClient, GenerationEvent, GenerationStream};

const DEFAULT_RESPONSE: [&str; 3] = [
    "export default function App() {\n",
    "  return <main className=\"p-8\"><h1>Generated App</h1></main>\n",
    "}\n",
];

/// Generation client with scripted responses.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    /// Event scripts keyed by a prompt substring, first match wins.
    rules: Arc<RwLock<Vec<(String, Vec<GenerationEvent>)>>>,
    /// Prompts received, in call order.
    prompts: Arc<RwLock<Vec<String>>>,
    /// Delay before each script's first event.
    delay: Arc<RwLock<Option<Duration>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `events` for prompts containing `pattern`.
    pub fn on_prompt(self, pattern: impl Into<String>, events: Vec<GenerationEvent>) -> Self {
        self.rules.write().push((pattern.into(), events));
        self
    }

    /// Stream `text` as line chunks followed by an empty completion.
    pub fn respond(self, pattern: impl Into<String>, text: &str) -> Self {
        let mut events: Vec<GenerationEvent> = text
            .split_inclusive('\n')
            .map(GenerationEvent::chunk)
            .collect();
        events.push(GenerationEvent::complete(""));
        self.on_prompt(pattern, events)
    }

    /// Fail prompts containing `pattern`.
    pub fn fail_on(self, pattern: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        self.on_prompt(pattern, vec![GenerationEvent::error(error)])
    }

    /// Wait before answering each prompt.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.write() = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.read().len()
    }

    fn script_for(&self, prompt: &str) -> Vec<GenerationEvent> {
        self.rules
            .read()
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
            .map(|(_, events)| events.clone())
            .unwrap_or_else(|| {
                let mut events: Vec<GenerationEvent> =
                    DEFAULT_RESPONSE.iter().map(|s| GenerationEvent::chunk(*s)).collect();
                events.push(GenerationEvent::complete(""));
                events
            })
    }
}

impl GenerationClient for ScriptedGenerator {
    fn generate(
        &self,
        prompt: &str,
        _context: &serde_json::Value,
        streaming: bool,
    ) -> GenerationStream {
        self.prompts.write().push(prompt.to_string());
        let mut events = self.script_for(prompt);

        if !streaming {
            // Collapse chunks into a single completion.
            let text: String = events
                .iter()
                .filter_map(|e| match e {
                    GenerationEvent::Chunk { content } => Some(content.as_str()),
                    _ => None,
                })
                .collect();
            events = match events.into_iter().find(GenerationEvent::is_terminal) {
                Some(GenerationEvent::Complete { content }) if content.is_empty() => {
                    vec![GenerationEvent::complete(text)]
                }
                Some(terminal) => vec![terminal],
                None => Vec::new(),
            };
        }

        let delay = *self.delay.read();
        let delayed = async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            stream::iter(events)
        };
        stream::once(delayed).flatten().boxed()
    }
}
