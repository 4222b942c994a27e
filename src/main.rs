//! askdb - ask your database questions in plain language.
//!
//! Terminal surface for the query pipeline: connects, then answers one-shot
//! or interactive questions by rendering the pipeline's DisplayModel values.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use askdb::cli::Cli;
use askdb::config::{Config, ConnectionConfig};
use askdb::db::MockDatabaseClient;
use askdb::llm::{self, LlmProvider, PromptContext};
use askdb::pipeline::{Answer, PipelineOptions, Session};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with rendered results on
    // stdout; RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse_args();

    let config_path = cli.config_path();
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let connection = resolve_connection(&cli, &config)?;

    if cli.check {
        return check_connection(connection, &config).await;
    }

    // The generation client is built once here and handed to the session.
    let provider: LlmProvider = cli
        .llm
        .as_deref()
        .unwrap_or(&config.llm.provider)
        .parse()
        .map_err(anyhow::Error::msg)?;

    let mut llm_config = config.llm.clone();
    if cli.model.is_some() {
        llm_config.model = cli.model.clone();
    }
    let llm = llm::create_client(provider, &llm_config, cli.api_key.clone())
        .context("creating generation client")?;

    let context = match &cli.context_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading context file {}", path.display()))?;
            PromptContext::fixed(text)
        }
        None => PromptContext::Introspected,
    };

    let mut options = PipelineOptions::from(&config.pipeline);
    if cli.read_only {
        options.read_only = true;
    }

    let session = if cli.mock_db {
        info!("Using mock database");
        Session::with_client(
            Box::new(MockDatabaseClient::new()),
            Default::default(),
            Arc::clone(&llm),
            context,
            options,
        )
    } else {
        let connection =
            connection.context("no database connection configured; see --help for usage")?;
        info!("Connecting to {}", connection.display_string());
        Session::connect(connection, Arc::clone(&llm), context, options)
            .await
            .map_err(|e| anyhow::anyhow!("{}: {e}", e.category()))?
    };

    let outcome = if let Some(question) = &cli.question {
        ask_once(&session, question).await
    } else {
        interactive_loop(&session).await
    };

    session
        .close()
        .await
        .map_err(|e| anyhow::anyhow!("closing connection: {e}"))?;

    outcome
}

/// Resolves the final connection configuration.
///
/// Precedence: CLI arguments, then the named connection, then the default
/// connection from the config file, with environment variable fallbacks.
fn resolve_connection(cli: &Cli, config: &Config) -> anyhow::Result<Option<ConnectionConfig>> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                anyhow::bail!("Connection '{name}' not found in config file");
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}

/// Resolves a connection and immediately releases it, reporting the outcome.
async fn check_connection(
    connection: Option<ConnectionConfig>,
    config: &Config,
) -> anyhow::Result<()> {
    let connection = connection.context("no database connection configured")?;
    let timeout = std::time::Duration::from_secs(config.pipeline.query_timeout_secs);

    match askdb::db::connect(&connection, timeout).await {
        Ok(handle) => {
            handle
                .close()
                .await
                .map_err(|e| anyhow::anyhow!("closing connection: {e}"))?;
            println!("Successfully connected to {}", connection.display_string());
            Ok(())
        }
        Err(e) => anyhow::bail!("{}: {e}", e.category()),
    }
}

async fn ask_once(session: &Session, question: &str) -> anyhow::Result<()> {
    match session.ask(question).await {
        Ok(answer) => {
            print_answer(&answer);
            Ok(())
        }
        Err(e) => anyhow::bail!("{}: {e}", e.category()),
    }
}

async fn interactive_loop(session: &Session) -> anyhow::Result<()> {
    println!("askdb {}", env!("CARGO_PKG_VERSION"));
    if session.schema().is_empty() {
        println!("No schema context available; questions still work, \\sql runs SQL directly.");
    } else {
        println!(
            "Schema loaded: {} table(s). Type a question, \\sql <statement>, \\schema, or exit.",
            session.schema().tables.len()
        );
    }
    print_sample_questions();

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" | "\\q" => break,
            "\\schema" => {
                println!("{}", session.schema().format_for_llm());
            }
            _ => {
                if let Some(sql) = line.strip_prefix("\\sql ") {
                    match session.run_sql(sql).await {
                        Ok((_, display)) => println!("\n{}", display.to_text()),
                        Err(e) => eprintln!("{}: {e}", e.category()),
                    }
                } else {
                    match session.ask(line).await {
                        Ok(answer) => print_answer(&answer),
                        Err(e) => eprintln!("{}: {e}", e.category()),
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("\nGenerated SQL:");
    for line in answer.query.sanitized.lines() {
        println!("  {line}");
    }
    println!("\n{}", answer.display.to_text());
    println!(
        "({} row(s) in {:.3}s)",
        answer.result.row_count(),
        answer.elapsed.as_secs_f64()
    );
}

fn print_sample_questions() {
    println!("Sample questions:");
    println!("  - How many rows are in table patients?");
    println!("  - Show average lab results by test type");
    println!("  - Find doctors with the most appointments this month");
    println!();
}
