// AI Debugger CLI - interactive debugging sessions driven by a model provider
// Sessions are persisted under ~/debugger/logs and can be resumed by path

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use ai_debugger::agent::{
    generate_session_id, ActionDispatcher, ConsoleOperator, Notice, Operator, SafetyGate,
    SessionContext, SessionStore, DEFAULT_USE_CASE,
};
use ai_debugger::ai::{self, AiProviderType};
use ai_debugger::models::Message;
use ai_debugger::{init_logging, AgentError, AppConfig};

#[derive(Parser, Debug)]
#[command(
    name = "ai-debugger",
    author,
    version,
    about = "Debug code with an AI agent that can read files, edit files and run commands",
    long_about = "Start a new debugging session, or pass a conversation file from an earlier session to resume it.\nConfiguration comes from DEBUGGER_* and <PROVIDER>_* environment variables."
)]
struct Cli {
    /// Conversation file of a previous session to resume
    session_file: Option<PathBuf>,

    /// Initial prompt (asked interactively when omitted)
    #[arg(short, long)]
    prompt: Option<String>,

    /// Use case selecting the system prompt (debugging, feature, refactoring, performance, explanation, security)
    #[arg(short, long)]
    use_case: Option<String>,

    /// Provider to use instead of DEBUGGER_AI_PROVIDER
    #[arg(long)]
    provider: Option<String>,

    /// Model to use instead of the provider default
    #[arg(short, long)]
    model: Option<String>,

    /// Output token limit for each model call
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Project directory files and commands are resolved against
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// List available providers and exit
    #[arg(long)]
    list_providers: bool,

    /// Print the current configuration and exit
    #[arg(long)]
    show_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("[ERROR] Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    let mut config = AppConfig::from_env();
    if let Some(provider) = &cli.provider {
        config.provider = provider.clone();
    }

    if cli.list_providers {
        list_providers();
        return ExitCode::SUCCESS;
    }

    if cli.show_config {
        print!("{}", config.display());
        for problem in config.validate() {
            println!("- {}", problem);
        }
        return ExitCode::SUCCESS;
    }

    let problems = config.validate();
    if !problems.is_empty() {
        eprintln!("Configuration errors:");
        for problem in &problems {
            eprintln!("- {}", problem);
        }
        eprintln!("Please fix these issues before continuing.");
        return ExitCode::FAILURE;
    }

    if let Err(e) = config.ensure_dirs() {
        eprintln!("[ERROR] Cannot create {}: {}", config.logs_dir.display(), e);
        return ExitCode::FAILURE;
    }

    let provider = match config.provider_type() {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("[ERROR] {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Resumed sessions continue under a fresh id and file
    let session_id = generate_session_id();
    let paths = SessionContext::with_id(&session_id, &config.logs_dir, "", provider.as_str());
    let _log_guard = init_logging(&paths.log_file);

    let mut operator = ConsoleOperator::stdio();
    println!("\n{}", "=".repeat(80));
    println!("{:=^80}", " AI Debug Assistant ");
    println!("{}", "=".repeat(80));
    operator.show(
        Notice::Info,
        &format!("Debug session {} started with {}", session_id, provider),
    );
    operator.show(
        Notice::Debug,
        &format!("Logs will be saved to {}", paths.log_file.display()),
    );
    operator.show(
        Notice::Debug,
        &format!("Conversation will be saved to {}", paths.conversation_file.display()),
    );

    let resumed = cli
        .session_file
        .as_deref()
        .filter(|path| path.exists())
        .and_then(|path| {
            let record = SessionStore::load(path);
            if record.is_none() {
                operator.show(
                    Notice::Warning,
                    "Invalid conversation data in file, starting new conversation",
                );
            }
            record.map(|record| (path.to_path_buf(), record))
        });

    let (conversation, use_case, is_fresh) = match resumed {
        Some((path, record)) => {
            operator.show(
                Notice::Info,
                &format!(
                    "Resuming previous session from {} (Use case: {})",
                    path.display(),
                    record.metadata.use_case
                ),
            );
            (record.messages, record.metadata.use_case, false)
        }
        None => {
            let prompt = match cli.prompt.clone() {
                Some(prompt) => Ok(prompt),
                None => operator.ask_multiline("Enter your prompt:"),
            };
            let prompt = match prompt {
                Ok(prompt) if !prompt.trim().is_empty() => prompt,
                Ok(_) => {
                    operator.show(Notice::Error, "An initial prompt is required");
                    return ExitCode::FAILURE;
                }
                Err(e) => {
                    operator.show(Notice::Error, &e.to_string());
                    return ExitCode::FAILURE;
                }
            };
            let use_case = cli
                .use_case
                .clone()
                .unwrap_or_else(|| DEFAULT_USE_CASE.to_string());
            (vec![Message::user(prompt)], use_case, true)
        }
    };

    let context = SessionContext::with_id(&session_id, &config.logs_dir, &use_case, provider.as_str());
    info!(
        "Starting session with {} provider for use case: {}",
        provider, use_case
    );
    if let Some(first) = conversation.first() {
        info!("Initial user prompt: {}", first.content);
    }

    // A fresh session is resumable from here on, even if setup fails below
    if is_fresh {
        let store = SessionStore::new(&context.conversation_file);
        if let Err(e) = store.save(&context.metadata(), &conversation) {
            operator.show(Notice::Warning, &format!("Failed to save conversation: {}", e));
        }
    }

    let workdir = match cli.workdir.clone() {
        Some(workdir) => workdir,
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };

    let dispatcher = build_dispatcher(&cli, &config, provider, &use_case, &workdir)
        .map(|(model, gate)| {
            ActionDispatcher::new(
                model,
                gate,
                Box::new(operator),
                context.clone(),
                conversation,
            )
            .with_workdir(&workdir)
        });

    let mut dispatcher = match dispatcher {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            report_failure(&e, &context);
            return ExitCode::FAILURE;
        }
    };

    match dispatcher.run().await {
        Ok(()) => {
            if let Some(hint) = context.resume_hint(&program_name()) {
                println!("[INFO] You can resume this session with: {}", hint);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(&e, &context);
            ExitCode::FAILURE
        }
    }
}

/// Model provider for the agent plus the safety gate, sharing provider and key
fn build_dispatcher(
    cli: &Cli,
    config: &AppConfig,
    provider: AiProviderType,
    use_case: &str,
    workdir: &Path,
) -> ai_debugger::Result<(std::sync::Arc<dyn ai::AiProvider>, SafetyGate)> {
    let system_prompt = config.system_prompt_for(use_case)?;
    let schema = config.load_schema()?;

    let mut provider_config =
        config.provider_config(provider.as_str(), Some(system_prompt), Some(schema))?;
    if let Some(model) = &cli.model {
        provider_config.model = Some(model.clone());
    }
    if let Some(max_tokens) = cli.max_tokens {
        provider_config.max_tokens = Some(max_tokens);
    }

    let model = ai::create_provider(&provider_config)?;
    let info = model.model_info();
    info!(
        "Using {} model: {} (max tokens: {})",
        info.provider, info.model, info.max_tokens
    );

    let gate = SafetyGate::from_config(&provider_config, workdir)?;
    Ok((model, gate))
}

fn list_providers() {
    for id in ai::available_providers() {
        let model = ai::default_model(id).unwrap_or_default();
        let tokens = ai::default_token_limit(id).unwrap_or_default();
        let url = ai::provider_url(id).unwrap_or_default();
        println!("{:<10} {:<28} {:>6}  {}", id, model, tokens, url);
    }
}

fn report_failure(err: &AgentError, context: &SessionContext) {
    tracing::error!("Session failed: {}", err);
    eprintln!("[ERROR] {}", err);
    eprintln!("[INFO] {}", err.recovery_suggestion());
    eprintln!("[INFO] Check log file for details: {}", context.log_file.display());
    if let Some(hint) = context.resume_hint(&program_name()) {
        eprintln!("[INFO] You can resume this session with: {}", hint);
    }
}

fn program_name() -> String {
    std::env::args()
        .next()
        .unwrap_or_else(|| "ai-debugger".to_string())
}
