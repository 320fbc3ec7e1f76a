use std::io::{IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use lexinetz::agent::AgentStep;
use lexinetz::config::ProviderOverrides;
use lexinetz::constants::{
    is_supported_language, CONFIG_FILENAME, ENV_KEY_CONFIG, PROJECT_HEADLINE, PROJECT_NAME,
    SUPPORTED_LANGUAGES,
};
use lexinetz::pipeline::{
    init_default_config, LanguagePair, PipelineConfig, PipelineOverrides, ReflectionTrace,
};
use lexinetz::progress::ConsoleProgress;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
enum Mode {
    /// One translation call
    Direct,
    /// Extract, translate, assess, improve
    Reflective,
    /// A reasoning model picks the steps
    Agentic,
}

#[derive(Parser, Debug)]
#[command(name = "lexinetz")]
#[command(about = "Knowledge-grounded LLM translation with self-assessment", long_about = None)]
struct Args {
    /// Generate default config + prompt files, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write config/prompt files (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite existing config/prompt files when used with --init-config
    #[arg(long)]
    force: bool,

    /// Print the supported languages, then exit
    #[arg(long)]
    list_languages: bool,

    /// Text to translate (default: --input, then stdin)
    #[arg(value_name = "TEXT")]
    text: Option<String>,

    /// Read the text to translate from a file
    #[arg(short, long, value_name = "FILE", conflicts_with = "text")]
    input: Option<PathBuf>,

    /// Source language (e.g. English)
    #[arg(long, alias = "source-lang")]
    from: Option<String>,

    /// Target language (e.g. Deutsch)
    #[arg(long, alias = "target-lang")]
    to: Option<String>,

    #[arg(long, value_enum, default_value_t = Mode::Reflective)]
    mode: Mode,

    /// Config file path (default: $LEXINETZ_CONFIG, then lexinetz.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cohere, Llamafile, Ollama or "Open AI"
    #[arg(long)]
    provider: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    api_key: Option<String>,

    #[arg(long)]
    base_url: Option<String>,

    /// Knowledge triplets to extract (default: 10)
    #[arg(long)]
    max_triplets: Option<usize>,

    /// Agent turn limit (default: 10)
    #[arg(long)]
    max_turns: Option<usize>,

    /// Budget for the whole request; 0 disables it
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write every prompt and model output under DIR
    #[arg(long, value_name = "DIR")]
    trace_dir: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Print every stage or agent step before the translation
    #[arg(long)]
    show_trace: bool,

    /// No progress lines, warnings only
    #[arg(short, long)]
    quiet: bool,

    /// Debug logging (prompts and raw outputs)
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    mode: Mode,
    languages: &'a LanguagePair,
    translation: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<&'a ReflectionTrace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<&'a [AgentStep]>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet);
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    if args.list_languages {
        for lang in SUPPORTED_LANGUAGES {
            println!("{lang}");
        }
        return Ok(());
    }

    let (Some(from), Some(to)) = (args.from.as_deref(), args.to.as_deref()) else {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        eprintln!(
            "\n\n{PROJECT_NAME}: {PROJECT_HEADLINE}\n\nUSAGE:\n  {PROJECT_NAME} --from English --to Deutsch \"text\"\n\nTIPS:\n  - Default config search: {CONFIG_FILENAME} (upwards), or set {ENV_KEY_CONFIG}.\n  - Run with --init-config to get editable prompt files.\n"
        );
        bail!("--from and --to are required");
    };
    let pair = validate_languages(from, to)?;
    let text = read_input(args.text.clone(), args.input.as_ref())?;

    let provider = ProviderOverrides {
        provider: args.provider.clone(),
        model: args.model.clone(),
        api_key: args.api_key.clone(),
        base_url: args.base_url.clone(),
        temperature: args.temperature,
    };
    let pipeline = PipelineOverrides {
        max_triplets: args.max_triplets,
        max_agent_turns: args.max_turns,
        timeout_secs: args.timeout_secs,
        trace_prompts: args.trace_dir.as_ref().map(|_| true),
        trace_dir: args.trace_dir.clone(),
    };
    let cfg = PipelineConfig::from_file_and_args(args.config.clone(), &provider, &pipeline)
        .context("build config")?;
    tracing::info!(
        provider = %cfg.provider.provider,
        model = %cfg.provider.model,
        mode = ?args.mode,
        "provider configured"
    );

    match args.mode {
        Mode::Direct => {
            let mut translator = cfg.translator(&pair)?;
            let result = translator.translate(&text)?;
            emit(&args, &pair, &result.text, None, None)
        }
        Mode::Reflective => {
            let mut pipeline = cfg.reflective_pipeline(&pair, progress)?;
            let trace = pipeline.reflective_translate(&text)?;
            if args.show_trace && !args.json {
                print_trace(&trace);
            }
            emit(&args, &pair, trace.final_translation(), Some(&trace), None)
        }
        Mode::Agentic => {
            let mut controller = cfg.agentic_controller(&pair, progress)?;
            let outcome = controller.agentic_translate(&text)?;
            if args.show_trace && !args.json {
                print_steps(&outcome.steps);
            }
            emit(&args, &pair, &outcome.answer, None, Some(&outcome.steps))
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "lexinetz=debug"
    } else if quiet {
        "lexinetz=warn"
    } else {
        "lexinetz=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// The core binds any pair it is given; empty or identical languages stop here.
fn validate_languages(from: &str, to: &str) -> anyhow::Result<LanguagePair> {
    let (from, to) = (from.trim(), to.trim());
    if from.is_empty() || to.is_empty() {
        bail!("source and target languages must not be empty");
    }
    if from.eq_ignore_ascii_case(to) {
        bail!("source and target languages are both {from}");
    }
    for lang in [from, to] {
        if !is_supported_language(lang) {
            tracing::warn!(language = lang, "not in the supported language list; continuing");
        }
    }
    Ok(LanguagePair::new(from, to))
}

fn read_input(text: Option<String>, input: Option<&PathBuf>) -> anyhow::Result<String> {
    let text = match (text, input) {
        (Some(t), _) => t,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("read input: {}", path.display()))?,
        (None, None) => {
            let mut stdin = std::io::stdin();
            if stdin.is_terminal() {
                bail!("no text given; pass TEXT, --input FILE, or pipe it on stdin");
            }
            let mut buf = String::new();
            stdin.read_to_string(&mut buf).context("read stdin")?;
            buf
        }
    };
    if text.trim().is_empty() {
        bail!("nothing to translate");
    }
    Ok(text)
}

fn emit(
    args: &Args,
    pair: &LanguagePair,
    translation: &str,
    trace: Option<&ReflectionTrace>,
    steps: Option<&[AgentStep]>,
) -> anyhow::Result<()> {
    let report = Report {
        mode: args.mode,
        languages: pair,
        translation,
        trace,
        steps,
    };
    println!("{}", render_output(&report, args.json)?);
    Ok(())
}

/// Plain output is the translation exactly as the pipeline returned it.
fn render_output(report: &Report<'_>, json: bool) -> anyhow::Result<String> {
    if json {
        serde_json::to_string_pretty(report).context("serialize report")
    } else {
        Ok(report.translation.to_string())
    }
}

fn print_trace(trace: &ReflectionTrace) {
    for (stage, result) in trace.iter() {
        println!("== {}. {} ==", stage.index(), stage.name());
        println!("{}\n", result.text.trim_end());
    }
    if trace.is_pass_through() {
        println!("(assessment found nothing missing; initial translation kept)\n");
    }
    println!("== translation ==");
}

fn print_steps(steps: &[AgentStep]) {
    for step in steps {
        println!("== turn {}: {} ==", step.turn, step.action.name());
        if !step.thought.is_empty() {
            println!("thought: {}", step.thought);
        }
        if !step.arguments.is_null() {
            println!("arguments: {}", step.arguments);
        }
        if step.failed {
            println!("error: {}", step.observation);
        } else if !step.observation.is_empty() {
            println!("{}", step.observation.trim_end());
        }
        println!();
    }
    println!("== translation ==");
}
