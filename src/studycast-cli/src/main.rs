//! Studycast CLI - Research Podcast Generator
//!
//! A command-line tool that turns recent PubMed studies into a two-host
//! podcast episode and publishes it to an RSS feed.

use clap::Parser;
use colored::Colorize;
use std::env;
use std::path::PathBuf;
use studycast_core::{
    Config, ElevenLabsClient, OpenAiScriptWriter, PipelineEvent, PodcastPipeline, PubMedClient,
    RunOutcome, Services, default_config,
};

#[derive(Parser)]
#[command(
    name = "studycast",
    version,
    about = "Research Podcast Generator - Turn new studies into an episode",
    long_about = "A CLI tool that searches PubMed, writes a two-host dialogue with an OpenAI-compatible API, voices it and publishes the episode to an RSS feed."
)]
struct Cli {
    /// Topic profile to produce (falls back to the default topic if unknown)
    #[arg(short, long, env = "PODCAST_TOPIC", value_name = "TOPIC")]
    topic: Option<String>,

    /// TOML configuration file (built-in defaults when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Feed file to update
    #[arg(long, value_name = "FILE")]
    feed: Option<PathBuf>,

    /// Directory the episode MP3 is written to
    #[arg(long, value_name = "DIR")]
    episodes_dir: Option<PathBuf>,

    /// Maximum number of studies discussed in the episode
    #[arg(long, value_name = "COUNT")]
    max_studies: Option<usize>,

    /// Print the configured topics and exit
    #[arg(long)]
    list_topics: bool,
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e.to_string().red());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            Config::load(path)?
        }
        None => default_config(),
    };

    if cli.list_topics {
        for topic in &config.topics {
            let marker = if topic.key == config.default_topic { " (default)" } else { "" };
            println!(
                "  {} - {}{}",
                topic.key.bright_cyan(),
                topic.show_title,
                marker.dimmed()
            );
        }
        return Ok(());
    }

    // Apply CLI overrides
    if let Some(feed) = cli.feed {
        config.pipeline.feed_path = feed;
    }
    if let Some(dir) = cli.episodes_dir {
        config.pipeline.episodes_dir = dir;
    }
    if let Some(max) = cli.max_studies {
        config.pipeline.max_studies = max;
    }

    // Get API configuration from environment
    let api_base = env::var("OPENAI_API_BASE")
        .or_else(|_| env::var("OPENAI_BASE_URL"))
        .unwrap_or_else(|_| config.services.generation_base.clone());

    let api_key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. Script generation may fail.".yellow()
        );
        String::new()
    });

    let speech_key = env::var("ELEVENLABS_API_KEY").unwrap_or_else(|_| {
        eprintln!(
            "{}",
            "Warning: ELEVENLABS_API_KEY not set. Speech synthesis may fail.".yellow()
        );
        String::new()
    });

    let ncbi_key = env::var("NCBI_API_KEY").ok().filter(|k| !k.is_empty());

    let topic = config.select_topic(cli.topic.as_deref())?;

    // Print header
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - {}", "Studycast".bold(), topic.show_title)
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), topic.name.bright_white());
    println!(
        "{} {} and {}",
        "Hosts:".bold(),
        config.hosts.host_a_name.bright_cyan(),
        config.hosts.host_b_name.bright_cyan()
    );
    println!("{} {}", "Model:".bold(), config.services.generation_model.dimmed());
    println!();
    println!("{}", "─".repeat(70).dimmed());

    let literature = PubMedClient::new(&config.services, ncbi_key)?;
    let writer = OpenAiScriptWriter::new(&config.services, api_base, api_key)?;
    let speech = ElevenLabsClient::new(&config.services, &config.synthesis, speech_key)?;

    let services = Services {
        literature: &literature,
        writer: &writer,
        speech: &speech,
    };

    // Create pipeline with event callback
    let callback = create_console_callback();
    let pipeline = PodcastPipeline::new(&config, topic, services).with_callback(callback);

    let outcome = pipeline.run(chrono::Utc::now()).await?;

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    match outcome {
        RunOutcome::NoStudies => {
            println!("{}", "  No new studies found. Nothing to publish.".yellow().bold());
        }
        RunOutcome::Published(episode) => {
            println!("{}", "  Episode published.".bright_green().bold());
            println!("  {} {}", "Title:".bold(), episode.entry.title);
            println!("  {} {}", "Audio:".bold(), episode.audio_path.display());
            println!("  {} {:.1} seconds", "Length:".bold(), episode.duration_seconds);
        }
    }
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    Ok(())
}

/// Create a callback that prints pipeline events to the console.
fn create_console_callback() -> Box<dyn Fn(PipelineEvent) + Send + Sync> {
    Box::new(move |event| match event {
        PipelineEvent::FetchStart { topic, queries } => {
            print_stage(&format!("Searching PubMed: {} ({} queries)", topic, queries));
        }
        PipelineEvent::StudiesFetched { titles } => {
            println!("{}", format!("Found {} studies", titles.len()).bold());
            for (i, title) in titles.iter().enumerate() {
                let wrapped = textwrap(title, 62);
                for (line_no, line) in wrapped.lines().enumerate() {
                    if line_no == 0 {
                        println!("  {:>2}. {}", i + 1, line);
                    } else {
                        println!("      {}", line);
                    }
                }
            }
        }
        PipelineEvent::NoStudies => {
            println!("{}", "No studies matched the search queries.".yellow());
        }
        PipelineEvent::ScriptRequested { prompt_chars } => {
            print_stage("Writing script");
            println!("  {}", format!("Prompt: {} characters", prompt_chars).dimmed());
        }
        PipelineEvent::ScriptSegmented {
            script_chars,
            segments,
        } => {
            println!(
                "  Script ready: {} characters, {} segments",
                script_chars,
                segments.to_string().bright_white()
            );
            print_stage("Synthesizing audio");
        }
        PipelineEvent::SegmentStart {
            index,
            total,
            speaker,
        } => {
            println!(
                "{} {} {}",
                "▶".bright_cyan(),
                format!("[{}/{}]", index + 1, total).dimmed(),
                speaker.bright_cyan().bold()
            );
        }
        PipelineEvent::AudioExported {
            path,
            duration_seconds,
        } => {
            println!(
                "  Saved {} ({:.1} seconds)",
                path.display().to_string().bright_white(),
                duration_seconds
            );
        }
        PipelineEvent::FeedUpdated { path, guid } => {
            print_stage("Publishing feed");
            println!("  {} {}", path.display(), format!("({})", guid).dimmed());
        }
    })
}

fn print_stage(name: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_magenta());
    println!("{}", format!("  {}", name).bright_magenta().bold());
    println!("{}", "═".repeat(70).bright_magenta());
    println!();
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
