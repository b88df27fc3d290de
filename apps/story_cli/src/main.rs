use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Parser;
use story_core::{
    load_settings, GeminiClient, GeminiConfig, GenerationOutcome, PendingGeneration,
    SessionState, Settings, StoryController, StoryView, TextGenerationService,
};
use tokio::io::AsyncReadExt;
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "story_cli", about = "Write a short story from a prompt")]
struct Args {
    /// Story prompt; read from stdin when omitted.
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    base_url: Option<String>,
    /// TOML config file (defaults to ./story_writer.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let settings =
        load_settings(args.config.as_deref())?.with_overrides(args.model, args.base_url);

    let prompt = match args.prompt {
        Some(prompt) => prompt,
        None => read_prompt_from_stdin().await?,
    };

    let controller = StoryController::new();
    let Some((ticket, config)) = accept_submission(&controller, prompt, &settings)? else {
        report_error_line(&controller);
        return Ok(ExitCode::FAILURE);
    };
    let client = GeminiClient::new(config);
    tracing::info!(model = client.model(), "writing story");

    let stdout = io::stdout();
    let mut renderer = TerminalRenderer::new(stdout.lock());
    let outcome = write_story(&controller, ticket, &client, &mut renderer).await?;

    let exit = match outcome {
        GenerationOutcome::Completed { .. } => ExitCode::SUCCESS,
        GenerationOutcome::Failed { .. } | GenerationOutcome::Superseded => {
            report_error_line(&controller);
            ExitCode::FAILURE
        }
    };
    Ok(exit)
}

/// Validates the prompt before the configuration, so an empty prompt gets the
/// validation message even when no API key is set. `None` means rejected.
fn accept_submission(
    controller: &StoryController,
    prompt: String,
    settings: &Settings,
) -> Result<Option<(PendingGeneration, GeminiConfig)>> {
    controller.edit_prompt(prompt);
    let Ok(ticket) = controller.begin_submission() else {
        return Ok(None);
    };
    match settings.gemini_config() {
        Ok(config) => Ok(Some((ticket, config))),
        Err(err) => {
            controller.fail(ticket, &err);
            Err(anyhow::Error::new(err).context("invalid configuration"))
        }
    }
}

fn report_error_line(controller: &StoryController) {
    if let Some(error_line) = StoryView::project(&controller.snapshot()).error_line {
        eprintln!("{error_line}");
    }
}

async fn read_prompt_from_stdin() -> Result<String> {
    let mut raw = String::new();
    tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .context("failed to read prompt from stdin")?;
    Ok(raw.trim_end_matches(&['\r', '\n'][..]).to_string())
}

/// Runs an accepted submission and renders every published state until the
/// generation resolves.
async fn write_story<W: Write>(
    controller: &StoryController,
    ticket: PendingGeneration,
    service: &dyn TextGenerationService,
    renderer: &mut TerminalRenderer<W>,
) -> io::Result<GenerationOutcome> {
    let mut updates = WatchStream::new(controller.subscribe());
    let generation = controller.run(ticket, service);
    tokio::pin!(generation);

    let outcome = loop {
        tokio::select! {
            biased;
            Some(state) = updates.next() => renderer.render(&state)?,
            outcome = &mut generation => break outcome,
        }
    };

    renderer.render(&controller.snapshot())?;
    renderer.finish()?;
    Ok(outcome)
}

/// Prints only the part of the story not yet written, so the terminal
/// reads like the text is being typed.
struct TerminalRenderer<W: Write> {
    out: W,
    printed: usize,
    placeholder_shown: bool,
}

impl<W: Write> TerminalRenderer<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            placeholder_shown: false,
        }
    }

    fn render(&mut self, state: &SessionState) -> io::Result<()> {
        let view = StoryView::project(state);

        if let Some(placeholder) = view.placeholder {
            if !self.placeholder_shown {
                eprintln!("{placeholder}");
                self.placeholder_shown = true;
            }
        }

        // A shorter story (or one not splittable at our offset) means a new submission.
        let suffix = match view.story.get(self.printed..) {
            Some(suffix) => suffix,
            None => {
                self.printed = 0;
                view.story.as_str()
            }
        };
        if !suffix.is_empty() {
            self.out.write_all(suffix.as_bytes())?;
            self.out.flush()?;
            self.printed = view.story.len();
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.printed > 0 {
            // Keep the shell prompt off the last line of the story.
            writeln!(self.out)?;
        }
        self.out.flush()
    }
}
