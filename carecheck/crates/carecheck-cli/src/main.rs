use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use carecheck::api_keys::{self, KeySource};
use carecheck::config::Settings;
use carecheck::document_processing::{collect_files, extract_batch, read_source_file};
use carecheck::keychain;
use carecheck::model_adapters::GoogleAdapter;
use carecheck::report::SavedReport;
use carecheck::store::GuidelineStore;
use carecheck::{ChatSession, FileCollection, ModelAdapter, ReportGenerator};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod render;

/// Long-term-care evaluation documents checked against facility guidelines.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to <config dir>/carecheck/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the extracted text of each file.
    Extract {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Manage the stored guideline documents.
    Guidelines {
        #[command(subcommand)]
        action: GuidelineAction,
    },
    /// Evaluate documents against the guidelines and render the report.
    Analyze(AnalyzeArgs),
    /// Render a saved report.
    Show { report: PathBuf },
    /// Ask follow-up questions about a saved report.
    Chat {
        #[arg(long)]
        report: PathBuf,
    },
    /// Manage the Gemini API key in the system keychain.
    ApiKey {
        #[command(subcommand)]
        action: ApiKeyAction,
    },
}

#[derive(Subcommand, Debug)]
enum GuidelineAction {
    /// Extract files and merge them into the stored set.
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    List,
    Remove { name: String },
    Clear,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Evaluation documents or directories containing them.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Extra guideline files used for this run only.
    #[arg(long = "guideline")]
    guidelines: Vec<PathBuf>,

    /// Write the report as JSON to this file.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum ApiKeyAction {
    Set { key: String },
    Status {
        /// Print the status as JSON.
        #[arg(long)]
        json: bool,
    },
    Delete,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match run(cli) {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<carecheck::Error>() {
            Some(domain) => {
                eprintln!("{} {}", "error:".red().bold(), domain.user_message());
                std::process::exit(1);
            }
            None => Err(err),
        },
    }
}

fn init_tracing(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to install logger")?;
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Extract { paths } => extract(&paths),
        Command::Guidelines { action } => guidelines(&settings, action),
        Command::Analyze(args) => analyze(&settings, args),
        Command::Show { report } => {
            render::print_saved_report(&load_saved_report(&report)?);
            Ok(())
        }
        Command::Chat { report } => chat(&settings, &report),
        Command::ApiKey { action } => api_key(action),
    }
}

/// Expands directories, then extracts every file. Any failure aborts the
/// whole batch. Files sharing a name collapse to the last one read.
fn read_uploads(paths: &[PathBuf]) -> Result<FileCollection> {
    let mut sources = Vec::new();
    for path in collect_files(paths)? {
        sources.push(read_source_file(&path)?);
    }
    let uploads: FileCollection = extract_batch(&sources)
        .map_err(carecheck::Error::from)?
        .into_iter()
        .collect();
    info!(count = uploads.len(), "extracted files");
    Ok(uploads)
}

fn extract(paths: &[PathBuf]) -> Result<()> {
    for file in read_uploads(paths)?.into_vec() {
        println!("{}", format!("=== {} ===", file.name).bold());
        println!("{}\n", file.content);
    }
    Ok(())
}

fn open_store(settings: &Settings) -> Result<GuidelineStore> {
    Ok(GuidelineStore::open(settings.store.resolved_database_path()?))
}

fn guidelines(settings: &Settings, action: GuidelineAction) -> Result<()> {
    let store = open_store(settings)?;

    match action {
        GuidelineAction::Add { paths } => {
            let mut stored: FileCollection = store.get_all()?.into_iter().collect();
            let added = read_uploads(&paths)?;
            let count = added.len();
            stored.extend(added.into_vec());
            store.save_all(stored.as_slice())?;
            println!(
                "{} {}개 파일 추가, 총 {}개 지침 저장됨",
                "✓".green(),
                count,
                stored.len()
            );
        }
        GuidelineAction::List => {
            let stored = store.get_all()?;
            if stored.is_empty() {
                println!("저장된 지침 파일이 없습니다.");
            }
            for file in stored {
                let size = format!("({}자)", file.content.chars().count());
                println!("{}  {}", file.name.bold(), size.dimmed());
            }
        }
        GuidelineAction::Remove { name } => {
            let mut stored: FileCollection = store.get_all()?.into_iter().collect();
            if stored.remove(&name).is_none() {
                bail!("no stored guideline named {name:?}");
            }
            store.save_all(stored.as_slice())?;
            println!("{} {} 삭제됨", "✓".green(), name);
        }
        GuidelineAction::Clear => {
            store.clear()?;
            println!("{} 저장된 지침을 모두 삭제했습니다.", "✓".green());
        }
    }
    Ok(())
}

fn gemini_adapter(settings: &Settings) -> Result<Arc<dyn ModelAdapter>> {
    keychain::ensure_available();
    let api_key = api_keys::load_api_key()?;
    Ok(Arc::new(GoogleAdapter::new(api_key, settings.model.clone())))
}

fn analyze(settings: &Settings, args: AnalyzeArgs) -> Result<()> {
    let evaluations = read_uploads(&args.paths)?;

    let mut guidelines: FileCollection = open_store(settings)?.get_all()?.into_iter().collect();
    if !args.guidelines.is_empty() {
        guidelines.extend(read_uploads(&args.guidelines)?.into_vec());
    }
    if guidelines.is_empty() {
        warn!("no guideline documents; the report will rely on the evaluation files alone");
        eprintln!(
            "{} 저장된 지침이 없습니다. `carecheck guidelines add`로 지침을 추가할 수 있습니다.",
            "warning:".yellow().bold()
        );
    }

    let adapter = gemini_adapter(settings)?;
    let generator = ReportGenerator::new(adapter, settings.clone());

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}% {wide_msg}")
            .map_err(|err| anyhow!("invalid progress template: {err}"))?
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(120));

    let mut on_progress = |pct: u8, msg: &str| {
        pb.set_position(u64::from(pct));
        pb.set_message(msg.to_string());
    };
    let result = generator.generate(
        guidelines.as_slice(),
        evaluations.as_slice(),
        &mut on_progress,
    );
    pb.finish_and_clear();
    let report = result?;

    let saved = SavedReport {
        generated_at: Utc::now(),
        model: generator.model_name().to_string(),
        guideline_files: guidelines.iter().map(|f| f.name.clone()).collect(),
        evaluation_files: evaluations.iter().map(|f| f.name.clone()).collect(),
        report,
    };
    render::print_saved_report(&saved);

    if let Some(out) = args.out {
        let json = serde_json::to_string_pretty(&saved)?;
        fs::write(&out, json)
            .with_context(|| format!("failed to write report: {}", out.display()))?;
        println!("{} 보고서 저장: {}", "✓".green(), out.display());
    }
    Ok(())
}

fn load_saved_report(path: &Path) -> Result<SavedReport> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read report: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse report from: {}", path.display()))
}

fn chat(settings: &Settings, report_path: &Path) -> Result<()> {
    let saved = load_saved_report(report_path)?;
    let mut session = ChatSession::new(gemini_adapter(settings)?, &settings.model);
    session.start(&saved.report).map_err(carecheck::Error::from)?;
    info!(session = %session.id(), "chat started");

    println!(
        "{} 보고서에 대해 질문하세요. 빈 줄이나 `exit`로 종료합니다.",
        saved.report.basic_info.name.bold()
    );

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{} ", ">".cyan().bold());
        io::stdout().flush()?;

        let Some(line) = lines.next() else { break };
        let question = line?;
        let question = question.trim();
        if question.is_empty() || question == "exit" {
            break;
        }

        let answer = session.ask_or_apology(question);
        println!("{}\n", answer);
    }
    Ok(())
}

fn api_key(action: ApiKeyAction) -> Result<()> {
    keychain::ensure_available();
    match action {
        ApiKeyAction::Set { key } => {
            api_keys::store_api_key(&key)?;
            println!("{} API 키를 저장했습니다.", "✓".green());
            if keychain::using_in_memory_fallback() {
                println!(
                    "{} 시스템 키체인을 사용할 수 없어 이 실행 동안만 유지됩니다.",
                    "warning:".yellow().bold()
                );
            }
        }
        ApiKeyAction::Status { json } => {
            let status = api_keys::api_key_status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
            if !status.is_configured {
                println!(
                    "{} 설정되지 않음 (형식 예: {})",
                    "✗".red(),
                    status.example_format
                );
                return Ok(());
            }
            let origin = match status.source {
                Some(KeySource::Environment) => "환경 변수에서 설정됨",
                _ => "키체인에 저장됨",
            };
            println!("{} {}", "✓".green(), origin);
        }
        ApiKeyAction::Delete => {
            api_keys::delete_api_key()?;
            println!("{} API 키를 삭제했습니다.", "✓".green());
        }
    }
    Ok(())
}
