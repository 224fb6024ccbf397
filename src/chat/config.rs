//! Configuration types for the chat application.
//!
//! Settings come from three places: command-line arguments parsed via `arrrg`,
//! an optional `.env` file that populates the process environment, and an
//! optional YAML file holding the session's system messages and the
//! code-assistance prompt headers.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::assist::{CodeAssist, CodeTask};
use crate::error::{Error, Result};
use crate::types::Model;

/// File name of the environment file looked up beside the executable.
pub const ENV_FILE_NAME: &str = ".env";

/// File name of the YAML configuration looked up beside the executable.
pub const CONFIG_FILE_NAME: &str = "config.yml";

const CHAT_COMMAND: &str = "chat";

/// Command-line arguments for the confab-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: gpt-3.5-turbo)", "MODEL")]
    pub model: Option<String>,

    /// Path of the YAML configuration file.
    #[arrrg(optional, "Configuration file (default: config.yml beside the binary)", "PATH")]
    pub config: Option<String>,

    /// Path of the environment file.
    #[arrrg(optional, "Environment file (default: .env beside the binary)", "PATH")]
    pub env_file: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response (default: provider default)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Base URL of an OpenAI-compatible API.
    #[arrrg(optional, "API base URL (default: https://api.openai.com/v1/)", "URL")]
    pub base_url: Option<String>,

    /// Wait for whole replies instead of streaming them.
    #[arrrg(flag, "Disable streamed responses")]
    pub no_stream: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Per-command settings in the YAML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandConfig {
    /// System messages, in order.
    #[serde(default)]
    pub system_messages: Vec<String>,

    /// Prompt lines; for code-assistance commands these replace the header.
    #[serde(default)]
    pub user_messages: Vec<String>,
}

/// The YAML configuration file.
///
/// ```yaml
/// commands:
///   chat:
///     systemMessages:
///       - You are a helpful assistant.
///   testgen:
///     userMessages:
///       - Write table-driven tests for the following program.
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Settings keyed by command name.
    #[serde(default)]
    pub commands: HashMap<String, CommandConfig>,
}

impl FileConfig {
    /// Parses a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|err| {
            Error::config(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_yaml(&yaml).map_err(|err| {
            Error::config(format!("cannot parse {}: {err}", path.display()))
        })
    }

    /// The settings for `name`, if present.
    pub fn command(&self, name: &str) -> Option<&CommandConfig> {
        self.commands.get(name)
    }

    /// The system messages of the chat session.
    pub fn system_messages(&self) -> &[String] {
        self.command(CHAT_COMMAND)
            .map(|command| command.system_messages.as_slice())
            .unwrap_or_default()
    }

    /// The configured header for `task`, if any.
    pub fn header(&self, task: CodeTask) -> Option<String> {
        self.command(task.name())
            .filter(|command| !command.user_messages.is_empty())
            .map(|command| command.user_messages.join("\n"))
    }
}

/// Directory holding the running executable.
pub fn executable_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Loads environment variables from a `.env` file.
///
/// An explicit path must exist.  Without one, `.env` beside the executable is
/// loaded if it is there.  Variables already set in the environment win.
pub fn load_env(explicit: Option<&Path>) -> Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match executable_dir().map(|dir| dir.join(ENV_FILE_NAME)) {
            Some(path) if path.exists() => path,
            _ => {
                tracing::debug!("no {ENV_FILE_NAME} file beside the executable");
                return Ok(());
            }
        },
    };
    dotenv::from_path(&path)
        .map_err(|err| Error::config(format!("cannot load {}: {err}", path.display())))?;
    tracing::debug!(path = %path.display(), "loaded environment file");
    Ok(())
}

/// Loads the YAML configuration.
///
/// An explicit path must exist.  Without one, `config.yml` beside the
/// executable is read if it is there, and an empty configuration is used
/// otherwise.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return FileConfig::load(path);
    }
    match executable_dir().map(|dir| dir.join(CONFIG_FILE_NAME)) {
        Some(path) if path.exists() => FileConfig::load(&path),
        _ => {
            tracing::debug!("no {CONFIG_FILE_NAME} beside the executable");
            Ok(FileConfig::default())
        }
    }
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments and the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// The model to use for generating responses.
    pub model: Model,

    /// Maximum tokens per response; the provider decides when unset.
    pub max_tokens: Option<u32>,

    /// Base URL of the API; the OpenAI endpoint when unset.
    pub base_url: Option<String>,

    /// Whether replies are streamed.
    pub streaming: bool,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// System messages placed before the history of every request.
    pub system_messages: Vec<String>,

    /// Replacement header for `:testgen` prompts.
    pub test_gen_header: Option<String>,

    /// Replacement header for `:findbugs` prompts.
    pub find_bugs_header: Option<String>,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Model: gpt-3.5-turbo
    /// - Streaming: enabled
    /// - Color: enabled
    /// - No system messages
    pub fn new() -> Self {
        Self {
            model: Model::default(),
            max_tokens: None,
            base_url: None,
            streaming: true,
            use_color: true,
            system_messages: Vec::new(),
            test_gen_header: None,
            find_bugs_header: None,
        }
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the API base URL.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Sets whether replies are streamed.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the system messages.
    pub fn with_system_messages(mut self, system_messages: Vec<String>) -> Self {
        self.system_messages = system_messages;
        self
    }

    /// Takes system messages and prompt headers from the configuration file.
    pub fn with_file_config(mut self, file: &FileConfig) -> Self {
        self.system_messages = file.system_messages().to_vec();
        self.test_gen_header = file.header(CodeTask::GenerateTest);
        self.find_bugs_header = file.header(CodeTask::FindBugs);
        self
    }

    /// The code-assistance prompt builder for this configuration.
    pub fn code_assist(&self) -> CodeAssist {
        let mut assist = CodeAssist::new();
        if let Some(header) = &self.test_gen_header {
            assist = assist.with_header(CodeTask::GenerateTest, header.clone());
        }
        if let Some(header) = &self.find_bugs_header {
            assist = assist.with_header(CodeTask::FindBugs, header.clone());
        }
        assist
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let model = args
            .model
            .and_then(|s| s.parse::<Model>().ok())
            .unwrap_or_default();

        ChatConfig {
            model,
            max_tokens: args.max_tokens,
            base_url: args.base_url,
            streaming: !args.no_stream,
            use_color: !args.no_color,
            ..ChatConfig::new()
        }
    }
}
