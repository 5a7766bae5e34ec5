//! Subcommand handlers: load config and roster, drive a [`Session`], print.

use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde_json::json;
use tracing::warn;

use crate::cli::{AnalysisOverrides, AnalyzeArgs, AppContext, ChunkArgs, ContextArgs, RefsArgs, SourceArgs};
use crate::core::graph::ReferenceGraph;
use crate::core::prompt::PromptType;
use crate::core::session::{Session, SubmitError};
use crate::core::source::open_source;
use crate::core::traverse::{Mode, Target};
use crate::core::unit::{Roster, UnitSource};
use crate::infra::config::{AnalysisConfig, Config, load_config};
use crate::llm::{DryRun, Transmitter, build_transmitter};

/// Spinner on stderr; hidden in --quiet mode
fn spinner(
    ctx: &AppContext,
    msg: String,
) -> ProgressBar
{
    if ctx.quiet
    {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(msg);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Open the source of truth and snapshot its roster
fn load_roster(
    source: &SourceArgs,
    cfg: &Config,
    ctx: &AppContext,
) -> Result<(Roster, Box<dyn UnitSource>)>
{
    let pb = spinner(ctx, format!("Indexing {}", source.source.display()));
    let unit_source = open_source(&source.source, &cfg.source.ignore_patterns)?;
    let roster = Roster::load(unit_source.as_ref())
        .with_context(|| format!("Failed to index {}", source.source.display()));
    pb.finish_and_clear();

    let roster = roster?;
    if roster.is_empty()
    {
        warn!(source = %source.source.display(), "no code units found");
    }
    Ok((roster, unit_source))
}

/// Configured analysis settings with CLI overrides applied
fn analysis_settings(
    cfg: &Config,
    overrides: &AnalysisOverrides,
) -> AnalysisConfig
{
    let mut settings = cfg
        .analysis
        .clone();
    if let Some(w) = &overrides.whitelist
    {
        settings.package_whitelist = w.clone();
    }
    if let Some(b) = &overrides.blacklist
    {
        settings.package_blacklist = b.clone();
    }
    if let Some(n) = overrides.max_tokens
    {
        settings.max_tokens = n;
    }
    settings
}

fn open_session(
    (roster, source): (Roster, Box<dyn UnitSource>),
    settings: AnalysisConfig,
    transmitter: Box<dyn Transmitter>,
) -> Result<Session>
{
    Ok(Session::new(roster, settings, transmitter)
        .context("Invalid package filter configuration")?
        .with_source(source))
}

fn target_of(
    target: &str,
    method: Option<&str>,
) -> Target
{
    match method
    {
        Some(m) => Target::Method {
            class: Target::parse(target)
                .class()
                .to_string(),
            method: m.to_string(),
        },
        None => Target::parse(target),
    }
}

fn mode_of(hierarchy: bool) -> Mode
{
    if hierarchy { Mode::Hierarchy } else { Mode::Simple }
}

/// Color segment headers when writing to a terminal
fn paint(
    text: &str,
    ctx: &AppContext,
) -> String
{
    if ctx.no_color || !std::io::stdout().is_terminal()
    {
        return text.to_string();
    }

    text.lines()
        .map(|line| {
            if line.starts_with("// Class: ") || line == "Method code:" || line == "Analyzed Method:"
            {
                line.bold()
                    .cyan()
                    .to_string()
            }
            else
            {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn run_context(
    args: ContextArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let cfg = load_config()?;
    let loaded = load_roster(&args.source, &cfg, ctx)?;
    let mut session = open_session(loaded, analysis_settings(&cfg, &args.overrides), Box::new(DryRun))?;

    let target = target_of(&args.target, args.method.as_deref());
    let mode = mode_of(args.hierarchy);

    if args.raw
    {
        let doc = session.document(&target, mode)?;
        println!("{}", paint(&doc.render(), ctx));
        return Ok(());
    }

    let (doc, optimized) = session.build_context(&target, mode)?;

    if args.json
    {
        let out = json!({
            "target": args.target,
            "mode": mode,
            "segments": doc.segments(),
            "text": optimized.text,
            "tokens": optimized.tokens,
            "truncated": optimized.truncated,
        });
        println!("{}", serde_json::to_string(&out)?);
        return Ok(());
    }

    println!("{}", paint(&optimized.text, ctx));
    if !ctx.quiet
    {
        eprintln!(
            "{} units, ~{} tokens{}",
            doc.segments()
                .len(),
            optimized.tokens,
            if optimized.truncated { " (truncated)" } else { "" }
        );
    }
    Ok(())
}

pub fn run_chunk(
    args: ChunkArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let cfg = load_config()?;
    let loaded = load_roster(&args.source, &cfg, ctx)?;
    let mut session = open_session(loaded, analysis_settings(&cfg, &args.overrides), Box::new(DryRun))?;

    let chunks = session.chunk_context(&Target::parse(&args.target), mode_of(args.hierarchy))?;
    let total = chunks.len();

    let Some(dir) = args.output_dir
    else
    {
        for (i, chunk) in chunks
            .iter()
            .enumerate()
        {
            if i > 0
            {
                println!();
            }
            println!("----- chunk {}/{} (~{} tokens) -----", i + 1, total, chunk.tokens);
            print!("{}", chunk.text);
            if !chunk
                .text
                .ends_with('\n')
            {
                println!();
            }
        }
        return Ok(());
    };

    if ctx.dry_run
    {
        println!("Would write {total} chunks to {}", dir.display());
        return Ok(());
    }

    write_chunks(&dir, chunks.iter().map(|c| c.text.as_str()))?;
    if !ctx.quiet
    {
        println!("Wrote {total} chunks to {}", dir.display());
    }
    Ok(())
}

/// Write `chunk_001.txt`, `chunk_002.txt`, ... into `dir`
fn write_chunks<'a>(
    dir: &Path,
    texts: impl Iterator<Item = &'a str>,
) -> Result<()>
{
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    for (i, text) in texts.enumerate()
    {
        let path = dir.join(format!("chunk_{:03}.txt", i + 1));
        std::fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

pub fn run_refs(
    args: RefsArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let cfg = load_config()?;
    let (roster, _) = load_roster(&args.source, &cfg, ctx)?;
    let graph = ReferenceGraph::build(&roster);

    if args.dot
    {
        println!("{}", graph.to_dot());
        return Ok(());
    }

    let name = args
        .name
        .context("NAME is required unless --dot is set")?;
    if !roster.contains(&name)
    {
        anyhow::bail!("Unknown class: {name}");
    }

    let names = if args.usages
    {
        graph.referenced_by(&name)
    }
    else
    {
        graph.references_of(&name)
    };

    for n in names
    {
        println!("{n}");
    }
    Ok(())
}

pub fn run_analyze(
    args: AnalyzeArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let mut cfg = load_config()?;
    if let Some(backend) = args.backend
    {
        cfg.llm
            .backend = backend;
    }

    let mut settings = analysis_settings(&cfg, &args.overrides);
    let prompt = match (&args.custom_prompt, args.prompt)
    {
        (Some(text), _) =>
        {
            settings.custom_prompt = text.clone();
            PromptType::Custom
        }
        (None, Some(p)) => p,
        (None, None) => settings.prompt_type,
    };
    let mode = mode_of(args.hierarchy || settings.hierarchy_enabled);

    let transmitter: Box<dyn Transmitter> = if ctx.dry_run
    {
        Box::new(DryRun)
    }
    else
    {
        build_transmitter(&cfg.llm).context("Failed to set up the LLM client")?
    };
    let backend = transmitter
        .name()
        .to_string();

    let loaded = load_roster(&args.source, &cfg, ctx)?;
    let mut session = open_session(loaded, settings, transmitter)?;
    let target = Target::parse(&args.target);

    let pb = spinner(ctx, format!("Waiting for {backend}"));
    let reply = session.submit(&target, mode, prompt);
    pb.finish_and_clear();

    let reply = reply.map_err(|e| match e
    {
        SubmitError::NotConfigured(_) => anyhow::Error::new(e).context(
            "Set llm.api_key (or llm.mistral_endpoint) in classpack.toml, or CLASSPACK__LLM__API_KEY",
        ),
        other => anyhow::Error::new(other),
    })?;

    if !ctx.quiet
    {
        eprintln!(
            "Sent {} units (~{} tokens{}) to {backend}",
            reply
                .units
                .len(),
            reply.context_tokens,
            if reply.truncated { ", truncated" } else { "" }
        );
    }
    println!("{}", reply.text);

    for question in &args.ask
    {
        let pb = spinner(ctx, format!("Waiting for {backend}"));
        let answer = session.follow_up(question);
        pb.finish_and_clear();

        println!();
        println!("Q: {question}");
        println!("{}", answer?.text);
    }
    Ok(())
}
