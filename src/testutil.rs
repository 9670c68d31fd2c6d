//! Shared mock collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::agent::interrupt::InterruptGate;
use crate::agent::self_prompter::SelfPrompter;
use crate::agent::AgentEvent;
use crate::commands::{builtin, CommandContext, CommandRegistry};
use crate::history::{HistoryEntry, HistoryStore, SavedState};
use crate::llm_client::ResponseGenerator;
use crate::world::WorldLink;

/// World link that records everything said into it.
pub struct RecordingWorld {
    sent: Mutex<Vec<String>>,
}

impl RecordingWorld {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorldLink for RecordingWorld {
    async fn say(&self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// In-memory history store; counts `persist` calls.
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
    self_prompt: Mutex<Option<String>>,
    pub persist_calls: AtomicUsize,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            self_prompt: Mutex::new(None),
            persist_calls: AtomicUsize::new(0),
        }
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn saved_self_prompt(&self) -> Option<String> {
        self.self_prompt.lock().unwrap().clone()
    }

    pub fn persist_count(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, source: &str, text: &str) -> Result<()> {
        self.entries.lock().unwrap().push(HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn transcript(&self) -> Vec<HistoryEntry> {
        self.entries()
    }

    async fn load_latest(&self) -> Result<SavedState> {
        Ok(SavedState {
            entries: self.entries(),
            self_prompt: self.saved_self_prompt(),
        })
    }

    async fn set_self_prompt(&self, prompt: Option<&str>) -> Result<()> {
        *self.self_prompt.lock().unwrap() = prompt.map(str::to_string);
        Ok(())
    }
}

/// Returns scripted responses in order, then the fallback forever.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<&str>, fallback: Option<&str>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(str::to_string).collect()),
            fallback: fallback.map(str::to_string),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn generate(&self, _transcript: &[HistoryEntry]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return Ok(next);
        }
        match &self.fallback {
            Some(fallback) => Ok(fallback.clone()),
            None => anyhow::bail!("generator script exhausted"),
        }
    }
}

/// Always fails, like an unreachable model backend.
pub struct FailingGenerator;

#[async_trait]
impl ResponseGenerator for FailingGenerator {
    async fn generate(&self, _transcript: &[HistoryEntry]) -> Result<String> {
        anyhow::bail!("model backend unavailable")
    }
}

/// Everything a `CommandContext` needs, with the mocks kept accessible for
/// assertions. Builtins come pre-registered.
pub struct ContextParts {
    pub world: Arc<RecordingWorld>,
    pub history: Arc<MemoryHistory>,
    pub gate: Arc<InterruptGate>,
    pub self_prompter: Arc<SelfPrompter>,
    pub registry: Arc<CommandRegistry>,
    pub events: flume::Receiver<AgentEvent>,
}

impl ContextParts {
    pub async fn new() -> Self {
        let world = Arc::new(RecordingWorld::new());
        let history = Arc::new(MemoryHistory::new());
        let gate = Arc::new(InterruptGate::new());
        let (event_tx, events) = flume::unbounded();
        let self_prompter = Arc::new(SelfPrompter::new(
            gate.clone(),
            world.clone(),
            event_tx,
            std::time::Duration::from_millis(100),
        ));
        let registry = Arc::new(CommandRegistry::new());
        builtin::register_builtins(&registry).await;

        Self {
            world,
            history,
            gate,
            self_prompter,
            registry,
            events,
        }
    }

    pub fn context(&self, username: &str) -> CommandContext {
        CommandContext {
            username: username.to_string(),
            world: self.world.clone(),
            history: self.history.clone(),
            self_prompter: self.self_prompter.clone(),
            gate: self.gate.clone(),
            registry: self.registry.clone(),
        }
    }
}
