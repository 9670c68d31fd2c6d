//! The actor core: one logical agent whose inbound messages, generated
//! responses, directive executions, self-prompt cycles, and background ticks
//! all interleave through a single turn controller.
//!
//! There is deliberately no queue serializing cycles. A new inbound message
//! always begins a fresh `handle_message` invocation, and the interrupt gate
//! is the only coordination between it and anything already in flight:
//! cancellation is cooperative and checked at turn boundaries, never
//! preemptive.

pub mod interrupt;
pub mod self_prompter;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::{sleep, Instant};

use crate::automations::{AutomationContext, AutomationSet};
use crate::commands::{self, parse, CommandContext, CommandRegistry};
use crate::config::AgentConfig;
use crate::history::{HistoryStore, SavedState, SYSTEM_SOURCE};
use crate::llm_client::ResponseGenerator;
use crate::world::{WorldEvent, WorldLink};

use self::interrupt::InterruptGate;
use self::self_prompter::SelfPrompter;

/// Who produced an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Speaker {
    /// The distinguished system identity (death notices, init messages).
    System,
    /// The actor itself; self-prompt cycles speak with this identity.
    Own,
    /// An external participant.
    Participant(String),
}

impl Speaker {
    fn label<'a>(&'a self, own_name: &'a str) -> &'a str {
        match self {
            Speaker::System => SYSTEM_SOURCE,
            Speaker::Own => own_name,
            Speaker::Participant(name) => name,
        }
    }
}

/// Observable agent activity, published on the event bus.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A turn cycle ran to completion. Automations waiting for the actor to
    /// go idle key off this.
    CycleFinished { used_directive: bool },
    DirectiveExecuted { name: String },
    SelfPromptStarted { prompt: String },
    SelfPromptStopped,
}

pub struct Agent {
    name: String,
    config: AgentConfig,
    generator: Arc<dyn ResponseGenerator>,
    history: Arc<dyn HistoryStore>,
    world: Arc<dyn WorldLink>,
    commands: Arc<CommandRegistry>,
    gate: Arc<InterruptGate>,
    self_prompter: Arc<SelfPrompter>,
    automations: AutomationSet,
    event_tx: flume::Sender<AgentEvent>,
    command_ctx: CommandContext,
    busy: AtomicBool,
    started: AtomicBool,
}

impl Agent {
    pub async fn new(
        config: AgentConfig,
        generator: Arc<dyn ResponseGenerator>,
        history: Arc<dyn HistoryStore>,
        world: Arc<dyn WorldLink>,
        automations: AutomationSet,
        event_tx: flume::Sender<AgentEvent>,
    ) -> Arc<Self> {
        let gate = Arc::new(InterruptGate::new());
        let self_prompter = Arc::new(SelfPrompter::new(
            gate.clone(),
            world.clone(),
            event_tx.clone(),
            config.self_prompt_cooldown(),
        ));

        let registry = Arc::new(CommandRegistry::new());
        commands::builtin::register_builtins(&registry).await;

        let command_ctx = CommandContext {
            username: config.username.clone(),
            world: world.clone(),
            history: history.clone(),
            self_prompter: self_prompter.clone(),
            gate: gate.clone(),
            registry: registry.clone(),
        };

        Arc::new(Self {
            name: config.username.clone(),
            config,
            generator,
            history,
            world,
            commands: registry,
            gate,
            self_prompter,
            automations,
            event_tx,
            command_ctx,
            busy: AtomicBool::new(false),
            started: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The directive catalog; environment integrations register their world
    /// actions here before the actor joins.
    pub fn commands(&self) -> Arc<CommandRegistry> {
        self.commands.clone()
    }

    pub fn self_prompter(&self) -> &SelfPrompter {
        &self.self_prompter
    }

    /// True while no turn cycle is in flight.
    pub fn is_idle(&self) -> bool {
        !self.busy.load(Ordering::SeqCst)
    }

    /// Silence the actor and cancel any active self-prompt session without
    /// waiting for its current cycle to finish.
    pub async fn mute(&self) {
        self.gate.mute();
        self.self_prompter.stop(false).await;
    }

    fn emit(&self, event: AgentEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Newlines are delivered as separate chat lines by most transports;
    /// collapse them before emitting.
    async fn emit_reply(&self, text: &str) -> Result<()> {
        self.world.say(&text.replace('\n', "  ")).await
    }

    // ─── Conversation turn controller ────────────────────────────────────

    /// Run one full message cycle. Returns whether any directive was
    /// executed. Generation and execution failures are terminal for the
    /// cycle and propagate; a hallucinated directive is not a failure.
    pub async fn handle_message(
        &self,
        source: Speaker,
        text: &str,
        max_turns: Option<usize>,
    ) -> Result<bool> {
        let self_prompt = matches!(source, Speaker::System | Speaker::Own);

        // A fresh user or system message always gets a chance to be
        // answered, even if the actor was muted. Self-prompt cycles never
        // unmute.
        if source != Speaker::Own {
            self.gate.clear_mute();
        }

        self.busy.store(true, Ordering::SeqCst);
        let result = self.dispatch(&source, text, max_turns, self_prompt).await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    async fn dispatch(
        &self,
        source: &Speaker,
        text: &str,
        max_turns: Option<usize>,
        self_prompt: bool,
    ) -> Result<bool> {
        // A directive typed by a participant executes immediately and never
        // enters the turn loop.
        if let Speaker::Participant(sender) = source {
            if let Some(name) = parse::contains_directive(text) {
                return self.handle_user_directive(sender, name, text).await;
            }
        }

        let result = self
            .run_turn_loop(source, text, max_turns, self_prompt)
            .await;

        // The cycle is over whatever the loop did; release anything waiting
        // on idle.
        self.self_prompter.on_turn_cycle_finished();
        let used_directive = *result.as_ref().unwrap_or(&false);
        self.emit(AgentEvent::CycleFinished { used_directive });
        result
    }

    async fn handle_user_directive(&self, sender: &str, name: &str, text: &str) -> Result<bool> {
        if !self.commands.exists(name).await {
            self.emit_reply(&format!("Command '{}' does not exist.", name))
                .await?;
            return Ok(false);
        }

        self.emit_reply(&format!("*{} used {}*", sender, parse::directive_body(name)))
            .await?;

        if name == commands::NEW_ACTION {
            // The free-form request preceding this directive is the context
            // the action works from.
            self.history.append(sender, text).await?;
        }

        let output = self.commands.execute(&self.command_ctx, text).await?;
        self.emit(AgentEvent::DirectiveExecuted {
            name: name.to_string(),
        });
        if let Some(output) = output {
            self.emit_reply(&output).await?;
        }
        Ok(true)
    }

    async fn run_turn_loop(
        &self,
        source: &Speaker,
        text: &str,
        max_turns: Option<usize>,
        self_prompt: bool,
    ) -> Result<bool> {
        self.history.append(source.label(&self.name), text).await?;
        self.history.persist().await?;

        let budget = turn_budget(
            self.config.directive_turn_budget(),
            max_turns,
            self_prompt,
            self.self_prompter.is_active(),
        );

        let mut used_directive = false;
        let mut turns = 0usize;
        loop {
            if let Some(limit) = budget {
                if turns >= limit {
                    break;
                }
            }
            turns += 1;

            if self.gate.should_interrupt(self_prompt) {
                break;
            }

            let transcript = self.history.transcript().await;
            let response = self
                .generator
                .generate(&transcript)
                .await
                .context("Response generation failed")?;

            let Some(found) = parse::contains_directive(&response) else {
                // Conversational responses always end the cycle, whatever
                // budget remains.
                self.history.append(&self.name, &response).await?;
                self.emit_reply(&response).await?;
                break;
            };
            let name = found.to_string();

            // Everything after the directive is discarded.
            let response = parse::truncate_after_directive(&response).to_string();
            self.history.append(&self.name, &response).await?;

            if !self.commands.exists(&name).await {
                // A hallucinated directive consumes a turn; the budget is
                // what keeps an inventive model from looping forever.
                tracing::warn!("Model hallucinated directive: {}", name);
                self.history
                    .append(SYSTEM_SOURCE, &format!("Command {} does not exist.", name))
                    .await?;
                self.history.persist().await?;
                continue;
            }

            if name == commands::STOP_SELF_PROMPT && self_prompt {
                self.history
                    .append(
                        SYSTEM_SOURCE,
                        "Cannot stop self-prompting unless requested by a user.",
                    )
                    .await?;
                self.history.persist().await?;
                continue;
            }

            if self.gate.should_interrupt(self_prompt) {
                break;
            }

            self.self_prompter
                .on_foreground_directive(self_prompt, self.commands.is_action(&name).await);

            if self.config.verbose_directives {
                self.emit_reply(&response).await?;
            } else {
                let pre_text = response[..response.find(name.as_str()).unwrap_or(0)].trim();
                let summary = format!("*used {}*", parse::directive_body(&name));
                let announcement = if pre_text.is_empty() {
                    summary
                } else {
                    format!("{}  {}", pre_text, summary)
                };
                self.emit_reply(&announcement).await?;
            }

            let output = self
                .commands
                .execute(&self.command_ctx, &response)
                .await
                .with_context(|| format!("Directive {} execution failed", name))?;
            used_directive = true;
            self.emit(AgentEvent::DirectiveExecuted { name: name.clone() });

            match output {
                Some(output) => {
                    // Execution output becomes input to the next turn.
                    self.history.append(SYSTEM_SOURCE, &output).await?;
                }
                None => break,
            }

            self.history.persist().await?;
        }

        Ok(used_directive)
    }

    // ─── Background tick ─────────────────────────────────────────────────

    fn spawn_tick_loop(self: Arc<Self>) {
        let period = self.config.tick_period();
        tokio::spawn(async move {
            run_tick_loop(period, move |delta| {
                let agent = Arc::clone(&self);
                async move {
                    agent.update(delta).await;
                }
            })
            .await;
        });
    }

    async fn update(self: Arc<Self>, delta: Duration) {
        let ctx = AutomationContext {
            idle: self.is_idle(),
            world: self.world.clone(),
        };
        self.automations.update(&ctx, delta).await;

        if let Some(prompt) = self.self_prompter.poll_due(delta) {
            // The cycle runs off-tick; the cadence stays paused until it
            // reports back.
            let agent = Arc::clone(&self);
            tokio::spawn(async move {
                let used = match agent.handle_message(Speaker::Own, &prompt, None).await {
                    Ok(used) => used,
                    Err(e) => {
                        tracing::error!("Self-prompt cycle failed: {}", e);
                        false
                    }
                };
                agent.self_prompter.cycle_finished(used);
            });
        }
    }

    // ─── Actor lifecycle ─────────────────────────────────────────────────

    /// Drive the actor from the inbound world event stream until the
    /// connection is lost. Always returns an error describing why.
    pub async fn run(self: Arc<Self>, events: flume::Receiver<WorldEvent>) -> Result<()> {
        while let Ok(event) = events.recv_async().await {
            match event {
                WorldEvent::Joined => Arc::clone(&self).on_joined().await?,
                WorldEvent::Chat { sender, text } => {
                    if sender == self.name {
                        continue;
                    }
                    if self
                        .config
                        .ignored_message_prefixes
                        .iter()
                        .any(|prefix| text.starts_with(prefix))
                    {
                        continue;
                    }

                    tracing::info!("{}: {}", sender, text);
                    let agent = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = agent
                            .handle_message(Speaker::Participant(sender), &text, None)
                            .await
                        {
                            tracing::error!("Turn cycle failed: {}", e);
                        }
                    });
                }
                WorldEvent::Died { message } => {
                    let notice = format!(
                        "You died with the final message: '{}'. Previous actions were \
                         stopped and you have respawned. Notify the user and perform any \
                         necessary actions.",
                        message
                    );
                    let agent = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = agent.handle_message(Speaker::System, &notice, None).await {
                            tracing::error!("Death cycle failed: {}", e);
                        }
                    });
                }
                WorldEvent::Kicked { reason } => {
                    return self
                        .shutdown(&format!("Kicked from the world: {}", reason))
                        .await;
                }
                WorldEvent::Disconnected { reason } => {
                    return self
                        .shutdown(&format!("Disconnected from the world: {}", reason))
                        .await;
                }
            }
        }

        self.shutdown("World event stream closed").await
    }

    async fn on_joined(self: Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            // Respawn: the tick loop and session state carry over.
            return Ok(());
        }

        tracing::info!("{} joined the world", self.name);

        let saved = if self.config.load_memory {
            self.history.load_latest().await?
        } else {
            SavedState::default()
        };

        if let Some(prompt) = saved.self_prompt {
            // Resume autonomous operation from the previous run; any
            // configured init message is superseded.
            self.history.append(SYSTEM_SOURCE, &prompt).await?;
            self.self_prompter.start(&prompt);
        } else if let Some(init_message) = self.config.init_message.clone() {
            let agent = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = agent
                    .handle_message(Speaker::System, &init_message, Some(2))
                    .await
                {
                    tracing::error!("Init message cycle failed: {}", e);
                }
            });
        } else {
            self.emit_reply(&format!("Hello world! I'm {}.", self.name))
                .await?;
            self.emit(AgentEvent::CycleFinished {
                used_directive: false,
            });
        }

        self.spawn_tick_loop();
        Ok(())
    }

    /// Final persist and goodbye; connectivity loss is unrecoverable, so
    /// this always returns an error for the caller to exit on.
    async fn shutdown(&self, reason: &str) -> Result<()> {
        tracing::warn!("{}", reason);
        if let Err(e) = self.history.append(SYSTEM_SOURCE, reason).await {
            tracing::warn!("Failed to record shutdown: {}", e);
        }
        if let Err(e) = self.history.persist().await {
            tracing::warn!("Failed to persist history at shutdown: {}", e);
        }
        let _ = self.emit_reply("Goodbye world.").await;
        anyhow::bail!("{}", reason)
    }
}

/// One budget per inbound message, computed up front and never carried over.
fn turn_budget(
    configured: Option<usize>,
    override_turns: Option<usize>,
    self_prompt: bool,
    self_prompt_active: bool,
) -> Option<usize> {
    if let Some(explicit) = override_turns {
        return Some(explicit);
    }
    // A user message during self-prompting gets exactly one reply before the
    // cadence takes back over.
    if !self_prompt && self_prompt_active {
        return Some(1);
    }
    configured
}

/// Fixed-period driver for background work. The next tick is scheduled only
/// after the body settles: a slow body is followed by a zero-wait tick, never
/// an overlapping one. The delta handed to the body is measured from the
/// previous tick's start.
pub(crate) async fn run_tick_loop<F, Fut>(period: Duration, mut body: F)
where
    F: FnMut(Duration) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut last = Instant::now();
    loop {
        let start = Instant::now();
        body(start - last).await;
        let remaining = period.saturating_sub(start.elapsed());
        if !remaining.is_zero() {
            sleep(remaining).await;
        }
        last = start;
    }
}
