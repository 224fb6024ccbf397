//! Code-assistance commands: test generation and bug finding.
//!
//! Both commands read a source file (or one function of it), put a fixed header
//! in front of the code, and send the result to the model as a standalone
//! prompt.  Replies are shown on the terminal but never enter the chat history.

pub mod extract;

use std::io;
use std::path::{Path, PathBuf};

use crate::dialogue::DialogueEngine;
use crate::error::{Error, Result};
use crate::gateway::ChatGateway;
use crate::render::Renderer;

pub use extract::{extract_code, find_function_span};

const TEST_GEN_HEADER: &str = "Generate test code for the following program.";

const FIND_BUGS_HEADER: &str = "Find the bugs in the following program.
Infer what each function is supposed to do from its name.
For every bug you find, explain its cause and how to fix it.";

/// The kind of code-assistance command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeTask {
    /// `:testgen <file> [<function>]`
    GenerateTest,
    /// `:findbugs <file> [<function>]`
    FindBugs,
}

impl CodeTask {
    /// The directive name that selects this task.
    pub fn name(self) -> &'static str {
        match self {
            CodeTask::GenerateTest => "testgen",
            CodeTask::FindBugs => "findbugs",
        }
    }

    /// The prompt header used when configuration does not override it.
    pub fn default_header(self) -> &'static str {
        match self {
            CodeTask::GenerateTest => TEST_GEN_HEADER,
            CodeTask::FindBugs => FIND_BUGS_HEADER,
        }
    }
}

impl std::fmt::Display for CodeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The arguments of a code-assistance directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRequest {
    /// The source file to read.
    pub path: PathBuf,
    /// The function to extract; the whole file when absent.
    pub function: Option<String>,
}

impl CodeRequest {
    /// Parses `:<task> <file> [<function>]`.
    pub fn parse(task: CodeTask, line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let directive = format!(":{}", task.name());
        if !tokens
            .next()
            .is_some_and(|token| token.eq_ignore_ascii_case(&directive))
        {
            return Err(Error::validation(
                format!("invalid format: text must start with '{directive}'"),
                None,
            ));
        }
        let Some(path) = tokens.next() else {
            return Err(Error::validation(
                format!("invalid format: usage is '{directive} <file> [<function>]'"),
                Some("file".to_string()),
            ));
        };
        Ok(Self {
            path: PathBuf::from(path),
            function: tokens.next().map(String::from),
        })
    }
}

/// Builds and sends code-assistance prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAssist {
    test_gen_header: String,
    find_bugs_header: String,
}

impl Default for CodeAssist {
    fn default() -> Self {
        Self {
            test_gen_header: TEST_GEN_HEADER.to_string(),
            find_bugs_header: FIND_BUGS_HEADER.to_string(),
        }
    }
}

impl CodeAssist {
    /// Creates a CodeAssist with the default headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the header of `task`.
    pub fn with_header(mut self, task: CodeTask, header: impl Into<String>) -> Self {
        match task {
            CodeTask::GenerateTest => self.test_gen_header = header.into(),
            CodeTask::FindBugs => self.find_bugs_header = header.into(),
        }
        self
    }

    /// The header put in front of the code for `task`.
    pub fn header(&self, task: CodeTask) -> &str {
        match task {
            CodeTask::GenerateTest => &self.test_gen_header,
            CodeTask::FindBugs => &self.find_bugs_header,
        }
    }

    /// The prompt for `task` over `code`.
    pub fn build_prompt(&self, task: CodeTask, code: &str) -> String {
        format!("{}\n\n{}", self.header(task), code)
    }

    /// Parses `line`, reads the code it names, and builds the prompt.
    pub async fn prepare(&self, task: CodeTask, line: &str) -> Result<String> {
        let request = CodeRequest::parse(task, line)?;
        let source = read_source(&request.path).await?;
        let code = extract_code(&source, request.function.as_deref()).inspect_err(|err| {
            tracing::error!(error = %err, path = %request.path.display(), "Error extracting code")
        })?;
        Ok(self.build_prompt(task, &code))
    }

    /// Runs `task` for the directive `line` and shows the reply.
    ///
    /// With `stream` set the reply is streamed, otherwise it is shown whole.
    pub async fn run<G: ChatGateway>(
        &self,
        engine: &DialogueEngine<G>,
        task: CodeTask,
        line: &str,
        renderer: &mut dyn Renderer,
        stream: bool,
    ) -> Result<String> {
        let prompt = self.prepare(task, line).await?;
        tracing::debug!(%task, bytes = prompt.len(), "sending code-assistance prompt");
        if stream {
            engine.ask_stream(&prompt, renderer).await
        } else {
            engine.ask_once(&prompt, renderer).await
        }
    }
}

async fn read_source(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            Error::not_found(
                "file not found",
                Some("file".to_string()),
                Some(path.display().to_string()),
            )
        } else {
            Error::io(format!("failed to read {}", path.display()), err)
        }
    })
}
