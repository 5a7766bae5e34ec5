//! The analysis session: owns the roster snapshot, filters, settings and
//! the running transcript, and drives one submission at a time.
//!
//! A submission is strictly sequential:
//!
//! 1. build the context for the target,
//! 2. shrink/truncate it against the session ceiling,
//! 3. append the user turn,
//! 4. send the whole transcript,
//! 5. append the reply.
//!
//! If step 4 fails, the user turn stays and no assistant turn is added.
//! [`SessionHandle`] rejects a submission while another one holds the
//! session instead of queueing it.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::budgeter::{Chunk, ContextManager};
use crate::core::filter::{FilterError, PackageFilter};
use crate::core::graph::ReferenceGraph;
use crate::core::optimize::{Optimized, optimize, shrink};
use crate::core::prompt::{PromptType, compose_follow_up, compose_user_turn};
use crate::core::traverse::{ContextBuilder, ContextDocument, Mode, Target};
use crate::core::unit::{ResolutionError, Roster, UnitSource};
use crate::infra::config::AnalysisConfig;
use crate::llm::{TransmissionError, Transmitter};

/// Author of a transcript turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role
{
    Human,
    Assistant,
}

impl fmt::Display for Role
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        match self
        {
            Role::Human => f.write_str("Human"),
            Role::Assistant => f.write_str("Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn
{
    pub role: Role,
    pub text: String,
}

/// Append-only conversation history
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript
{
    turns: Vec<Turn>,
}

impl Transcript
{
    pub fn turns(&self) -> &[Turn]
    {
        &self.turns
    }

    pub fn len(&self) -> usize
    {
        self.turns
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.turns
            .is_empty()
    }

    fn push(
        &mut self,
        role: Role,
        text: String,
    )
    {
        self.turns
            .push(Turn { role, text });
    }

    /// Payload form: `Human: ...` / `Assistant: ...` blocks
    pub fn render(&self) -> String
    {
        let mut out = String::new();
        for turn in &self.turns
        {
            out.push_str(&format!("{}: {}\n\n", turn.role, turn.text));
        }
        out
    }

    pub fn clear(&mut self)
    {
        self.turns
            .clear();
    }
}

/// Why a submission did not complete
#[derive(Debug, thiserror::Error)]
pub enum SubmitError
{
    #[error("a submission is already in progress")]
    Busy,

    #[error("{0} backend is not configured")]
    NotConfigured(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("transmission failed: {0}")]
    Transmission(#[from] TransmissionError),

    #[error("no context has been built yet")]
    NoContext,

    #[error(transparent)]
    Config(#[from] FilterError),
}

/// A completed round trip
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply
{
    pub text: String,

    /// Estimated tokens of the context that was sent
    pub context_tokens: usize,

    /// Whether the context had to be truncated
    pub truncated: bool,

    /// Contributing units in emission order
    pub units: Vec<String>,
}

/// Explicitly owned analysis state
pub struct Session
{
    roster: Roster,
    graph: ReferenceGraph,
    filter: PackageFilter,
    settings: AnalysisConfig,
    transmitter: Box<dyn Transmitter>,
    transcript: Transcript,

    /// Where unit text is fetched from; the roster snapshot when unset
    source: Option<Box<dyn UnitSource>>,

    /// Last optimized context, reused by follow-ups
    current_context: Option<String>,
}

impl Session
{
    pub fn new(
        roster: Roster,
        settings: AnalysisConfig,
        transmitter: Box<dyn Transmitter>,
    ) -> Result<Self, FilterError>
    {
        let filter = PackageFilter::new(&settings.package_whitelist, &settings.package_blacklist)?;
        let graph = ReferenceGraph::build(&roster);

        Ok(Self {
            roster,
            graph,
            filter,
            settings,
            transmitter,
            transcript: Transcript::default(),
            source: None,
            current_context: None,
        })
    }

    /// Fetch unit text from `source` at build time
    pub fn with_source(
        mut self,
        source: Box<dyn UnitSource>,
    ) -> Self
    {
        self.source = Some(source);
        self
    }

    pub fn roster(&self) -> &Roster
    {
        &self.roster
    }

    pub fn graph(&self) -> &ReferenceGraph
    {
        &self.graph
    }

    pub fn settings(&self) -> &AnalysisConfig
    {
        &self.settings
    }

    pub fn transcript(&self) -> &Transcript
    {
        &self.transcript
    }

    pub fn current_context(&self) -> Option<&str>
    {
        self.current_context
            .as_deref()
    }

    /// Unoptimized document for a target
    pub fn document(
        &mut self,
        target: &Target,
        mode: Mode,
    ) -> Result<ContextDocument, ResolutionError>
    {
        ContextBuilder::new(&self.roster, &self.graph, &mut self.filter)
            .with_source(
                self.source
                    .as_deref(),
            )
            .build(target, mode)
    }

    /// Header plus source of `root`
    pub fn build_simple_context(
        &mut self,
        root: &str,
    ) -> Result<String, ResolutionError>
    {
        Ok(self
            .document(&Target::Class(root.to_string()), Mode::Simple)?
            .render())
    }

    /// Depth-limited, filtered hierarchy of `root`
    pub fn build_hierarchy_context(
        &mut self,
        root: &str,
    ) -> Result<String, ResolutionError>
    {
        Ok(self
            .document(&Target::Class(root.to_string()), Mode::Hierarchy)?
            .render())
    }

    /// Build and optimize a context against the session ceiling
    pub fn build_context(
        &mut self,
        target: &Target,
        mode: Mode,
    ) -> Result<(ContextDocument, Optimized), ResolutionError>
    {
        let doc = self.document(target, mode)?;
        if doc.is_empty()
        {
            warn!(target = target.class(), "context is empty; root filtered or without source");
        }
        let optimized = optimize(&doc.render(), self.settings.max_tokens);
        Ok((doc, optimized))
    }

    /// Shrunk but untruncated context split into chunks at the session ceiling
    pub fn chunk_context(
        &mut self,
        target: &Target,
        mode: Mode,
    ) -> Result<Vec<Chunk>, ResolutionError>
    {
        let doc = self.document(target, mode)?;
        let mut manager = ContextManager::new(self.settings.max_tokens);
        manager.add_context(&shrink(&doc.render()));
        Ok(manager.into_chunks())
    }

    /// Build, optimize and send a new analysis
    #[instrument(skip(self, target), fields(target = target.class()))]
    pub fn submit(
        &mut self,
        target: &Target,
        mode: Mode,
        prompt: PromptType,
    ) -> Result<Reply, SubmitError>
    {
        self.ensure_configured()?;

        let (doc, optimized) = self.build_context(target, mode)?;
        let template = prompt.template(&self.settings.custom_prompt);
        let user_turn = compose_user_turn(&template, &optimized.text);

        self.current_context = Some(
            optimized
                .text
                .clone(),
        );
        let text = self.exchange(user_turn)?;

        Ok(Reply {
            text,
            context_tokens: optimized.tokens,
            truncated: optimized.truncated,
            units: doc
                .units()
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }

    /// Ask a further question about the last submitted context
    #[instrument(skip_all)]
    pub fn follow_up(
        &mut self,
        message: &str,
    ) -> Result<Reply, SubmitError>
    {
        self.ensure_configured()?;

        let context = self
            .current_context
            .clone()
            .ok_or(SubmitError::NoContext)?;
        let text = self.exchange(compose_follow_up(message, &context))?;

        Ok(Reply {
            text,
            context_tokens: self
                .transmitter
                .estimate_tokens(&context),
            truncated: false,
            units: Vec::new(),
        })
    }

    fn ensure_configured(&self) -> Result<(), SubmitError>
    {
        if self
            .transmitter
            .is_configured()
        {
            Ok(())
        }
        else
        {
            Err(SubmitError::NotConfigured(
                self.transmitter
                    .name()
                    .to_string(),
            ))
        }
    }

    /// user turn -> send whole transcript -> assistant turn
    fn exchange(
        &mut self,
        user_turn: String,
    ) -> Result<String, SubmitError>
    {
        self.transcript
            .push(Role::Human, user_turn);
        let payload = self
            .transcript
            .render();

        debug!(
            turns = self
                .transcript
                .len(),
            payload_tokens = self
                .transmitter
                .estimate_tokens(&payload),
            "sending transcript"
        );

        match self
            .transmitter
            .send(&payload, self.settings.max_tokens)
        {
            Ok(reply) =>
            {
                self.transcript
                    .push(Role::Assistant, reply.clone());
                Ok(reply)
            }
            Err(e) =>
            {
                warn!(error = %e, "transmission failed; transcript keeps the user turn");
                Err(e.into())
            }
        }
    }

    /// Swap the filter patterns; on error the old patterns stay in effect
    pub fn reset_filters(
        &mut self,
        whitelist_csv: &str,
        blacklist_csv: &str,
    ) -> Result<(), FilterError>
    {
        self.filter
            .reset(whitelist_csv, blacklist_csv)?;
        self.settings
            .package_whitelist = whitelist_csv.to_string();
        self.settings
            .package_blacklist = blacklist_csv.to_string();
        Ok(())
    }

    /// Replace all settings. A new configuration starts a new conversation.
    pub fn apply_settings(
        &mut self,
        settings: AnalysisConfig,
    ) -> Result<(), FilterError>
    {
        self.filter
            .reset(&settings.package_whitelist, &settings.package_blacklist)?;
        self.settings = settings;
        self.transcript
            .clear();
        self.current_context = None;
        info!("settings applied; transcript cleared");
        Ok(())
    }

    /// Replace the roster snapshot and rebuild the graph from scratch
    pub fn refresh_roster(
        &mut self,
        roster: Roster,
    )
    {
        self.graph = ReferenceGraph::build(&roster);
        self.roster = roster;
        self.filter
            .invalidate();
        debug!(units = self.roster.len(), "roster refreshed");
    }

    pub fn set_transmitter(
        &mut self,
        transmitter: Box<dyn Transmitter>,
    )
    {
        self.transmitter = transmitter;
    }
}

/// Shareable session that rejects overlapping submissions
pub struct SessionHandle
{
    inner: Mutex<Session>,
}

impl SessionHandle
{
    pub fn new(session: Session) -> Self
    {
        Self {
            inner: Mutex::new(session),
        }
    }

    /// Take the session for a submission, or report `Busy`
    fn try_acquire(&self) -> Result<MutexGuard<'_, Session>, SubmitError>
    {
        match self
            .inner
            .try_lock()
        {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(SubmitError::Busy),
            // A panicking transmitter leaves the transcript append-consistent
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner()),
        }
    }

    pub fn submit(
        &self,
        target: &Target,
        mode: Mode,
        prompt: PromptType,
    ) -> Result<Reply, SubmitError>
    {
        self.try_acquire()?
            .submit(target, mode, prompt)
    }

    pub fn follow_up(
        &self,
        message: &str,
    ) -> Result<Reply, SubmitError>
    {
        self.try_acquire()?
            .follow_up(message)
    }

    /// Run `f` with exclusive access, waiting for any in-flight submission
    pub fn with_session<R>(
        &self,
        f: impl FnOnce(&mut Session) -> R,
    ) -> R
    {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn into_inner(self) -> Session
    {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
