use anyhow::{Context, Result};
use deepdive::cli::output::Output;
use deepdive::cli::{Cli, Commands};
use deepdive::utils::toml_config::LoggingConfig;
use deepdive::{DeepdiveConfig, OpenAlexSource, ResearchOrchestrator};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match cli.command {
        Commands::Run {
            question,
            max_rounds,
            timeout,
            fulltext,
            json,
        } => {
            let mut config = DeepdiveConfig::load_or_default(&cli.config)
                .with_context(|| format!("Failed to load {}", cli.config.display()))?;
            init_tracing(&config.logging, cli.verbose);

            if let Some(max_rounds) = max_rounds {
                config.session.max_rounds = max_rounds;
            }
            if let Some(timeout) = timeout {
                config.session.session_timeout_seconds = timeout;
            }
            config.session.use_fulltext |= fulltext;
            config.validate().context("Invalid configuration")?;

            run(config, &question, json, output).await
        }
        Commands::Config { validate } => show_config(&cli.config, validate, &output),
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(config: DeepdiveConfig, question: &str, json: bool, output: Output) -> Result<()> {
    let supervisor_llm = config
        .provider()
        .context("Failed to resolve provider")?
        .create_client()?;
    let researcher_llm = config.researcher_provider()?.create_client()?;
    let source = Arc::new(OpenAlexSource::new(
        config.evidence.base_url.clone(),
        config.evidence.mailto.clone(),
        config.evidence_timeout(),
    )?);

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let colored = output.colored;
    let printer = tokio::spawn(async move {
        let output = if colored {
            Output::new()
        } else {
            Output::no_color()
        };
        while let Some(event) = events_rx.recv().await {
            output.event(&event);
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping research");
            on_interrupt.cancel();
        }
    });

    output.banner();
    let orchestrator = ResearchOrchestrator::new(supervisor_llm, source, config.session.clone())
        .with_researcher_llm(researcher_llm)
        .with_events(events_tx);

    let report = orchestrator.run(question, cancel).await?;
    drop(orchestrator);
    printer.await.ok();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.markdown);
        output.kv("rounds", &report.metadata.rounds.to_string());
        output.kv("sources", &report.metadata.documents_selected.to_string());
        output.kv(
            "elapsed",
            &format!("{:.1}s", report.metadata.elapsed.as_secs_f64()),
        );
    }
    Ok(())
}

fn show_config(path: &Path, validate: bool, output: &Output) -> Result<()> {
    if validate {
        match DeepdiveConfig::load(path) {
            Ok(_) => {
                output.success(&format!("{} is valid", path.display()));
                Ok(())
            }
            Err(e) => {
                output.error(&e.to_string());
                Err(e.into())
            }
        }
    } else {
        let config = DeepdiveConfig::load_or_default(path)?;
        output.header("Configuration");
        output.kv("file", &path.display().to_string());
        output.kv("provider", &config.provider_label());
        output.kv("max_rounds", &config.session.max_rounds.to_string());
        output.kv(
            "session_timeout",
            &format!("{}s", config.session.session_timeout_seconds),
        );
        output.kv("use_fulltext", &config.session.use_fulltext.to_string());
        println!("{}", toml::to_string_pretty(&config)?);
        Ok(())
    }
}
