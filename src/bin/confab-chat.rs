//! Interactive chat application for OpenAI-compatible chat completion APIs.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings
//! confab-chat
//!
//! # Specify a model and wait for whole replies
//! confab-chat --model gpt-4o --no-stream
//!
//! # Read settings from explicit files
//! confab-chat --config ./config.yml --env-file ./.env
//! ```
//!
//! # Directives
//!
//! - `:help` - Show available directives
//! - `:version` - Show the version
//! - `:testgen <file> [<function>]` - Generate tests for a file or function
//! - `:findbugs <file> [<function>]` - Look for bugs in a file or function
//! - `:quit` - Exit the application

use std::path::PathBuf;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use confab::chat::{
    ChatArgs, ChatConfig, ChatSession, Directive, PlainTextRenderer, Renderer, help_text,
    load_env, load_file_config, parse_directive, version_text,
};
use confab::{Error, OpenAi};

const BANNER: &str = "Please input text (or ':quit' to exit): ";
const PROMPT: &str = "chat> ";

/// Main entry point for the confab-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("confab-chat [OPTIONS]");
    let env_file = args.env_file.clone().map(PathBuf::from);
    let config_file = args.config.clone().map(PathBuf::from);

    load_env(env_file.as_deref())
        .inspect_err(|err| tracing::error!(error = %err, "Error loading .env file"))?;
    let file_config = load_file_config(config_file.as_deref())
        .inspect_err(|err| tracing::error!(error = %err, "Error loading config file"))?;
    let config = ChatConfig::from(args).with_file_config(&file_config);
    let use_color = config.use_color;

    let client = OpenAi::with_options(None, config.base_url.clone(), None)
        .inspect_err(|err| tracing::error!(error = %err, "Error creating client"))?;
    let mut renderer = PlainTextRenderer::with_color(use_color);
    renderer.print_info(&format!("OpenAI API Key: {}", client.masked_api_key()));

    let mut session = ChatSession::new(client, config);
    let mut rl = DefaultEditor::new()?;

    tracing::debug!(model = %session.model(), streaming = session.is_streaming(), "starting chat");
    renderer.print_info(BANNER);

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(directive) = parse_directive(line) {
                    match directive {
                        Directive::Quit => {
                            renderer.print_info("Bye!");
                            break;
                        }
                        Directive::ShowHelp => renderer.print_info(help_text().trim_end()),
                        Directive::ShowVersion => renderer.print_info(&version_text()),
                        Directive::GenerateTest | Directive::FindBugs => {
                            let Some(task) = directive.code_task() else {
                                continue;
                            };
                            if let Err(err) = session.run_code_task(task, line, &mut renderer).await
                            {
                                report_failure(&err, task.name(), &mut renderer);
                            }
                        }
                    }
                    continue;
                }

                if let Err(err) = session.send(line, &mut renderer).await {
                    report_failure(&err, "chat", &mut renderer);
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                renderer.print_info("Bye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

/// Logs a failed turn with whatever the provider told us about it, then shows it.
fn report_failure(err: &Error, turn: &str, renderer: &mut PlainTextRenderer) {
    tracing::error!(
        error = %err,
        turn,
        status_code = err.status_code(),
        request_id = err.request_id(),
        "turn failed"
    );
    renderer.print_error(&err.to_string());
}
