// ABOUTME: CLI binary for autodesc: scrape descriptions, propose search paths, run demos, ping the LLM.
// ABOUTME: Loads .env, logs to stderr through tracing and prints results to stdout.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use autodesc::llm::test_connection;
use autodesc::dom::decode_checked;
use autodesc::{
    Client, CompletionBackend, ExtractError, ExtractionResult, LlmClient, LlmConfig, Status,
};

#[derive(Parser, Debug)]
#[command(name = "autodesc")]
#[command(about = "Extract dealer vehicle descriptions from vehicle detail pages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a VDP and print its dealer description
    ScrapeDescription {
        /// The VDP URL to process
        url: String,

        /// Read the page from this HTML file instead of fetching it
        #[arg(long = "html")]
        html: Option<PathBuf>,

        /// Print the full result as JSON
        #[arg(long = "json")]
        json_output: bool,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Propose search paths for the description on a VDP
    DetermineSearchPaths {
        /// The VDP URL to process
        url: String,

        /// Read the page from this HTML file instead of fetching it
        #[arg(long = "html")]
        html: Option<PathBuf>,

        /// Allow fetching from private/local networks
        #[arg(long = "allow-private-networks")]
        allow_private_networks: bool,
    },

    /// Scrape every URL in a JSON file of `{"section": ["url", ...]}`
    Demo {
        file: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Check that the configured LLM provider answers
    TestLlm,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Skip the LLM refinement stage
    #[arg(long = "no-refine")]
    no_refine: bool,

    /// Allow fetching from private/local networks
    #[arg(long = "allow-private-networks")]
    allow_private_networks: bool,
}

fn init_tracing() {
    let fallback = if std::env::var_os("PRINT_DEBUG_COMMENTS").is_some() {
        "autodesc=debug"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn read_html(path: &Path) -> anyhow::Result<String> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let html = decode_checked(&bytes, None).with_context(|| format!("decoding {}", path.display()))?;
    Ok(html)
}

fn llm_config() -> anyhow::Result<LlmConfig> {
    let config = LlmConfig::from_env()
        .map_err(ExtractError::from)
        .context("LLM configuration")?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_client(run: &RunArgs) -> anyhow::Result<Client> {
    let mut builder = Client::builder()
        .allow_private_networks(run.allow_private_networks)
        .refine(!run.no_refine);
    if !run.no_refine {
        let config = llm_config()?;
        builder = builder.llm_config(&config).map_err(ExtractError::from)?;
    }
    Ok(builder.build())
}

async fn scrape(
    client: &Client,
    url: &str,
    html: Option<&Path>,
    cancel: &CancellationToken,
) -> anyhow::Result<ExtractionResult> {
    Ok(match html {
        Some(path) => {
            let html = read_html(path)?;
            client.scrape_html_cancellable(&html, url, cancel).await
        }
        None => client.scrape_description_cancellable(url, cancel).await,
    })
}

fn exit_for(result: &ExtractionResult) -> ExitCode {
    if result.is_failed() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::ScrapeDescription {
            url,
            html,
            json_output,
            run,
        } => {
            let client = build_client(&run)?;
            let result = scrape(&client, &url, html.as_deref(), &cancel).await?;
            if json_output {
                print_json(&result)?;
            } else {
                match (&result.status, &result.error) {
                    (Status::Failed, Some(err)) => eprintln!("error: {}", err.message),
                    (Status::Partial, Some(err)) => {
                        eprintln!("warning: unrefined description ({})", err.message);
                        println!("{}", result.description);
                    }
                    _ => println!("{}", result.description),
                }
            }
            Ok(exit_for(&result))
        }

        Command::DetermineSearchPaths {
            url,
            html,
            allow_private_networks,
        } => {
            let client = Client::builder()
                .allow_private_networks(allow_private_networks)
                .refine(false)
                .build();
            let page = match html {
                Some(path) => read_html(&path)?,
                None => client.fetch_page(&url).await?,
            };
            let report = client.determine_search_paths(&page, &url)?;
            print_json(&report)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Demo { file, run } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let sections: BTreeMap<String, Vec<String>> =
                serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;
            let client = build_client(&run)?;

            let mut failures = 0usize;
            for (section, urls) in &sections {
                println!("\n{} {} {}\n", "=".repeat(10), section.to_uppercase(), "=".repeat(10));
                for url in urls {
                    if cancel.is_cancelled() {
                        return Ok(ExitCode::from(1));
                    }
                    let result = client.scrape_description_cancellable(url, &cancel).await;
                    if result.is_failed() {
                        failures += 1;
                    }
                    println!("{}\n", result.format_text());
                }
            }
            Ok(if failures > 0 {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }

        Command::TestLlm => {
            let config = llm_config()?;
            let client = LlmClient::from_config(&config).map_err(ExtractError::from)?;
            let response = test_connection(&client, &config.retry_policy(), &cancel).await?;
            println!(
                "connected to {} ({}): {}",
                client.provider(),
                response.model,
                response.text.trim()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    match run(cli, cancel).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(1)
        }
    }
}
