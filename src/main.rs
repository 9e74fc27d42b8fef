//! Postcraft CLI - article to social-media post generation
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments, gathering missing input and handling top-level errors.

use anyhow::{bail, Context};
use clap::{Args, CommandFactory, Parser, Subcommand};
use colored::Colorize;
use dialoguer::{Input, Password, Select};
use postcraft::agent::{OpenAiChat, Temperature};
use postcraft::budget::{TiktokenCounter, TokenBudgetGuard};
use postcraft::chunker::Chunker;
use postcraft::credential::ApiKey;
use postcraft::engine::EngineOptions;
use postcraft::recorder::{CommentKind, CommentRecord, RunRecord, RunRecorder, SledRecorder};
use postcraft::scraper::{CachedFetcher, HttpFetcher};
use postcraft::{
    Config, GenerationRequest, Pipeline, RunOutcome, StopSignal, Style, SummarizeEngine, Tone,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const API_KEY_HELP: &str =
    "Instructions: https://help.openai.com/en/articles/4936850-where-do-i-find-my-secret-api-key";

#[derive(Parser)]
#[command(name = "postcraft")]
#[command(author, version, about = "Turn web articles into LinkedIn-style posts", long_about = None)]
struct Cli {
    /// Path to postcraft.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a post from an article URL
    Generate(GenerateArgs),
    /// Leave a comment in the run log
    Comment {
        /// Comment text
        text: Option<String>,
        /// Contact email
        #[arg(long)]
        email: Option<String>,
        /// What the comment is about
        #[arg(long, value_enum)]
        kind: Option<CommentKind>,
    },
    /// List recorded runs and failures
    Runs,
    /// Print shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Default)]
struct GenerateArgs {
    /// Article URL
    url: Option<String>,
    /// Type of post
    #[arg(long, value_enum)]
    style: Option<Style>,
    /// Tone of the post
    #[arg(long, value_enum)]
    tone: Option<Tone>,
    /// Sampling temperature, 0.0 to 2.0 in 0.1 steps
    #[arg(long)]
    temperature: Option<Temperature>,
    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "postcraft", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Runs) => {
            let config = load_config(cli.config.as_ref())?;
            list_runs(&config)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Comment { text, email, kind }) => {
            let config = load_config(cli.config.as_ref())?;
            comment(&config, text, email, kind)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Generate(args)) => {
            let config = load_config(cli.config.as_ref())?;
            generate(&config, args).await
        }
        None => {
            // Default: the interactive form
            let config = load_config(cli.config.as_ref())?;
            generate(&config, GenerateArgs::default()).await
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

fn interactive() -> bool {
    atty::is(atty::Stream::Stdin)
}

async fn generate(config: &Config, args: GenerateArgs) -> anyhow::Result<ExitCode> {
    let api_key = resolve_api_key(config, args.api_key)?;

    let url = match args.url {
        Some(url) => url,
        None if interactive() => Input::<String>::new()
            .with_prompt("Article URL")
            .interact_text()?,
        None => bail!("missing article URL"),
    };
    let style = match args.style {
        Some(style) => style,
        None if interactive() => pick("Type of post", &Style::ALL, |s| s.label())?,
        None => Style::Summary,
    };
    let tone = match args.tone {
        Some(tone) => tone,
        None if interactive() => pick("Tone", &Tone::ALL, |t| t.label())?,
        None => Tone::Professional,
    };
    let temperature = match args.temperature {
        Some(t) => t,
        None if interactive() => Input::<Temperature>::new()
            .with_prompt("Temperature (0.0 - 2.0)")
            .default(Temperature::default())
            .interact_text()?,
        None => Temperature::default(),
    };

    let pipeline = build_pipeline(config, api_key, temperature)?;
    let stop = StopSignal::new();
    watch_for_stop(stop.clone());

    println!("Fetching: {}", url);
    println!("Generating post... press Ctrl-C to stop.\n");
    let request = GenerationRequest { url, style, tone };
    let outcome = pipeline.run(&request, &stop).await;

    Ok(report(&outcome))
}

fn resolve_api_key(config: &Config, flag: Option<String>) -> anyhow::Result<ApiKey> {
    let strict = config.agent.strict_key_check;
    let provided = flag.or_else(|| config.api_key().map(str::to_string));

    if let Some(raw) = provided {
        return ApiKey::parse(&raw, strict)
            .map_err(|e| anyhow::anyhow!("{e}. {API_KEY_HELP}"));
    }
    if !interactive() {
        bail!("no OpenAI API key; set OPENAI_API_KEY or pass --api-key. {API_KEY_HELP}");
    }

    loop {
        let raw = Password::new().with_prompt("OpenAI API key").interact()?;
        match ApiKey::parse(&raw, strict) {
            Ok(key) => return Ok(key),
            Err(e) => eprintln!("{} {}", "⚠️".yellow(), format!("{e}. {API_KEY_HELP}").yellow()),
        }
    }
}

fn pick<T: Copy>(prompt: &str, options: &[T], label: impl Fn(&T) -> &'static str) -> anyhow::Result<T> {
    let labels: Vec<&'static str> = options.iter().map(label).collect();
    let index = Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(options[index])
}

fn build_pipeline(
    config: &Config,
    api_key: ApiKey,
    temperature: Temperature,
) -> anyhow::Result<Pipeline> {
    let timeout = config.request_timeout();
    let template = Arc::new(config.prompt_template()?);

    let counter = Arc::new(TiktokenCounter::for_model(&config.agent.model)?);
    let guard = TokenBudgetGuard::new(counter, config.budget.token_ceiling);

    let model = Arc::new(OpenAiChat::new(
        &config.agent.base_url,
        &config.agent.model,
        api_key,
        temperature,
        timeout,
    )?);
    let engine = SummarizeEngine::new(
        model,
        template,
        guard,
        EngineOptions {
            map_concurrency: config.agent.map_concurrency,
            call_timeout: timeout,
        },
    );

    let fetcher = CachedFetcher::new(Arc::new(HttpFetcher::new(timeout)?));
    let recorder = Arc::new(
        SledRecorder::open(&config.storage.path)
            .with_context(|| format!("opening run log at {}", config.storage.path.display()))?,
    );

    info!(model = %config.agent.model, %temperature, "pipeline ready");
    Ok(Pipeline::new(fetcher, Chunker::default(), engine, recorder))
}

/// First Ctrl-C asks the pipeline to stop at the next phase; the second exits.
fn watch_for_stop(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("stop requested; finishing the call in flight");
        stop.request_stop();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn report(outcome: &RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::Success { post, .. } => {
            println!("{} {}", "✅".green(), outcome.banner().green().bold());
            println!(
                "   {} input tokens, {} output tokens\n",
                post.input_tokens, post.output_tokens
            );
            println!("{}", post.text);
            ExitCode::SUCCESS
        }
        RunOutcome::Cancelled { .. } => {
            println!("{} {}", "⚠️".yellow(), outcome.banner().yellow());
            ExitCode::from(130)
        }
        _ => {
            println!("{} {}", "⚠️".yellow(), outcome.banner().yellow());
            ExitCode::FAILURE
        }
    }
}

fn comment(
    config: &Config,
    text: Option<String>,
    email: Option<String>,
    kind: Option<CommentKind>,
) -> anyhow::Result<()> {
    let email = match email {
        Some(email) => email,
        None if interactive() => Input::<String>::new()
            .with_prompt("Email")
            .allow_empty(true)
            .interact_text()?,
        None => String::new(),
    };
    let kind = match kind {
        Some(kind) => kind,
        None if interactive() => pick("Comment type", &CommentKind::ALL, |k| k.label())?,
        None => CommentKind::Feedback,
    };
    let text = match text {
        Some(text) => text,
        None if interactive() => Input::<String>::new()
            .with_prompt("Comment")
            .interact_text()?,
        None => bail!("missing comment text"),
    };
    if text.trim().is_empty() {
        bail!("comment text is empty");
    }

    let recorder = SledRecorder::open(&config.storage.path)?;
    let record = CommentRecord::new(&chrono::Local::now(), &email, &text, kind);
    recorder.append(&RunRecord::Comment(record))?;
    println!("{} {}", "✅".green(), "Thanks, your comment was recorded.".green());
    Ok(())
}

fn list_runs(config: &Config) -> anyhow::Result<()> {
    let recorder = SledRecorder::open(&config.storage.path)?;
    let runs = recorder.successes()?;
    let failures = recorder.failures()?;

    if runs.is_empty() && failures.is_empty() {
        println!("No recorded runs found.");
        return Ok(());
    }

    println!("Successful runs ({}):\n", runs.len());
    for run in &runs {
        println!(
            "✅ {}  {} / {}  in {}  ({} → {} tokens)",
            run.timestamp, run.style, run.tone, run.elapsed, run.input_tokens, run.output_tokens
        );
    }

    println!("\nFailed runs ({}):\n", failures.len());
    for failure in &failures {
        println!("⚠️  {}  [{}]  {}", failure.timestamp, failure.kind, failure.url);
        if let Some(detail) = &failure.detail {
            println!("   {}", detail);
        }
    }

    Ok(())
}
