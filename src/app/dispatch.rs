use crate::audit::{AuditObserver, AuditSession, ConstraintSet, FinalAnswer, NullObserver};
use crate::cli::commands::{Cli, Commands, ConfigCommands, SessionArgs};
use crate::compare::ComparisonRunner;
use crate::config::{Config, SessionConfig};
use crate::error::AuditError;
use crate::llm::{Evaluator, Generator, ReliableProvider, create_resilient_provider, resolve_api_key};
use crate::ui::{CliObserver, style};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "q"];

/// Everything a session needs, resolved once per command.
struct Runtime {
    provider: Arc<ReliableProvider>,
    session_config: Arc<SessionConfig>,
    constraints: Arc<ConstraintSet>,
}

impl Runtime {
    fn generator(&self) -> Arc<dyn Generator> {
        Arc::clone(&self.provider) as Arc<dyn Generator>
    }

    fn evaluator(&self) -> Arc<dyn Evaluator> {
        Arc::clone(&self.provider) as Arc<dyn Evaluator>
    }

    fn session(&self, observer: Arc<dyn AuditObserver>) -> Result<AuditSession, AuditError> {
        Ok(AuditSession::new(
            Arc::clone(&self.session_config),
            self.generator(),
            self.evaluator(),
        )?
        .with_observer(observer))
    }
}

/// Apply per-run overrides on top of the loaded config.
fn build_session_config(config: &Config, args: &SessionArgs) -> Result<SessionConfig> {
    let mut session = SessionConfig::from_config(config);
    if let Some(model) = args.generator_model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        session.generator_model = model.to_string();
    }
    if let Some(model) = args.auditor_model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        session.auditor_model = model.to_string();
    }
    if let Some(max_retries) = args.max_retries {
        session.audit.max_retries = max_retries;
    }
    if let Some(max_takeovers) = args.max_takeovers {
        session.audit.max_takeovers = max_takeovers;
    }
    session.audit.validate()?;
    Ok(session)
}

fn build_constraints(config: &Config, args: &SessionArgs) -> ConstraintSet {
    ConstraintSet::new(config.constraints.iter().chain(args.constraints.iter()))
}

/// BYOK: the key comes from config or env, or is asked for when a terminal
/// is attached. It is never written back to disk.
fn ensure_api_key(config: &mut Config) -> Result<()> {
    config.provider.api_key =
        resolve_api_key(&config.provider.name, config.provider.api_key.as_deref());
    if config.provider.has_api_key() {
        return Ok(());
    }

    if !console::Term::stdout().is_term() {
        bail!(
            "No API key configured. Set provider.api_key in {} or export THINKTWICE_API_KEY.",
            config.config_path.display()
        );
    }

    println!("{}", style::header("API key required"));
    println!(
        "{}",
        style::dim(format!(
            "Not found in {}. It will be used for this run only.",
            config.config_path.display()
        ))
    );
    let key: String = dialoguer::Password::new()
        .with_prompt("API key")
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().len() > 5 {
                Ok(())
            } else {
                Err("API key looks too short")
            }
        })
        .interact()
        .context("Failed to read API key")?;
    config.provider.api_key = Some(key.trim().to_string());
    Ok(())
}

fn build_runtime(mut config: Config, args: &SessionArgs) -> Result<Runtime> {
    ensure_api_key(&mut config)?;
    let session_config = build_session_config(&config, args)?;
    Ok(Runtime {
        provider: create_resilient_provider(&config.provider),
        session_config: Arc::new(session_config),
        constraints: Arc::new(build_constraints(&config, args)),
    })
}

/// Cancel `token` on Ctrl-C until the returned handle is aborted.
fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    })
}

async fn run_session(
    runtime: &Runtime,
    message: &str,
    observer: Arc<dyn AuditObserver>,
) -> Result<(AuditSession, Result<FinalAnswer, AuditError>)> {
    let mut session = runtime.session(observer)?;
    let watcher = cancel_on_ctrl_c(session.cancellation_token());
    let outcome = session.run(message, Arc::clone(&runtime.constraints)).await;
    watcher.abort();
    Ok((session, outcome))
}

fn print_failure(err: &AuditError) {
    println!();
    if let Some(escalation) = err.escalation() {
        println!("{}", style::error(format!("[SYSTEM] {escalation}")));
        for record in &escalation.trail {
            println!(
                "{}",
                style::dim(format!(
                    "  #{} retry {}: {} -> {}",
                    record.position + 1,
                    record.retry_count,
                    record.failed_idea.text(),
                    record.verdict.reason_text()
                ))
            );
        }
        println!(
            "{}",
            style::dim(format!(
                "  final: {} -> {}",
                escalation.final_idea.text(),
                escalation.final_verdict.reason_text()
            ))
        );
    } else {
        println!("{}", style::error(format!("[ERROR] {err}")));
    }
}

fn print_answer(answer: &FinalAnswer) {
    println!("\n\n{}", style::success("Verified answer:"));
    println!("{}", answer.display_text());
}

#[derive(Serialize)]
struct RunOutput<'a> {
    session_id: String,
    answer: Option<&'a FinalAnswer>,
    error: Option<String>,
    attempts: u32,
    takeovers: usize,
    transcript: &'a [crate::audit::Message],
}

async fn run_once(
    config: Config,
    message: &str,
    json: bool,
    args: &SessionArgs,
    verbose: bool,
) -> Result<()> {
    let runtime = build_runtime(config, args)?;
    let observer: Arc<dyn AuditObserver> = if json {
        Arc::new(NullObserver)
    } else {
        println!("{}\n", style::legend());
        Arc::new(CliObserver::new(verbose))
    };

    let (session, outcome) = run_session(&runtime, message, observer).await?;

    if json {
        let output = RunOutput {
            session_id: session.id().to_string(),
            answer: outcome.as_ref().ok(),
            error: outcome.as_ref().err().map(ToString::to_string),
            attempts: session.attempts(),
            takeovers: session.takeovers().len(),
            transcript: session.log().messages(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    match outcome {
        Ok(answer) => {
            if !json {
                print_answer(&answer);
            }
            Ok(())
        }
        Err(err) => {
            if !json {
                print_failure(&err);
            }
            Err(err.into())
        }
    }
}

async fn run_chat(config: Config, args: &SessionArgs, verbose: bool) -> Result<()> {
    let runtime = build_runtime(config, args)?;
    if let Err(e) = runtime.provider.warmup().await {
        tracing::debug!("Provider warmup failed: {e}");
    }

    println!("{}", style::header("ThinkTwice chat"));
    println!(
        "{}",
        style::dim(format!(
            "generator: {}  auditor: {}  constraints: {}",
            runtime.session_config.generator_model,
            runtime.session_config.auditor_model,
            runtime.constraints.len()
        ))
    );
    println!("{}", style::legend());
    println!(
        "{}\n",
        style::dim("Type 'exit', 'quit' or 'q' to leave. Ctrl-C cancels a running session.")
    );

    loop {
        let input: String = match dialoguer::Input::<String>::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()
        {
            Ok(input) => input,
            Err(_) => break,
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&input.to_ascii_lowercase().as_str()) {
            break;
        }

        let observer: Arc<dyn AuditObserver> = Arc::new(CliObserver::new(verbose));
        let (_session, outcome) = run_session(&runtime, input, observer).await?;
        match outcome {
            Ok(answer) => print_answer(&answer),
            Err(AuditError::Cancelled) => {
                println!("\n{}", style::system("[SYSTEM] session cancelled"));
            }
            Err(err) => print_failure(&err),
        }
        println!();
    }

    println!("{}", style::dim("Goodbye."));
    Ok(())
}

async fn run_compare(config: Config, prompts: &[String], args: &SessionArgs) -> Result<()> {
    let runtime = build_runtime(config, args)?;
    let runner = ComparisonRunner::new(
        runtime.generator(),
        runtime.evaluator(),
        Arc::clone(&runtime.session_config),
        Arc::clone(&runtime.constraints),
    );
    let report = runner.run_all(prompts).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_config(config: &Config, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Path => {
            println!("{}", config.config_path.display());
        }
        ConfigCommands::Show => {
            let mut shown = config.clone();
            if let Some(key) = shown.provider.api_key.as_mut() {
                *key = mask_key(key);
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }
    }
    Ok(())
}

fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}...")
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let verbose = cli.verbose;
    match &cli.command {
        Commands::Run {
            message,
            json,
            session,
        } => run_once(config, message, *json, session, verbose).await,
        Commands::Chat { session } => run_chat(config, session, verbose).await,
        Commands::Compare { prompts, session } => run_compare(config, prompts, session).await,
        Commands::Config { config_command } => handle_config(&config, config_command),
    }
}
