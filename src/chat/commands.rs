//! Directive parsing for the chat application.
//!
//! Lines that start with `:` select a directive instead of being sent to the
//! model.  Unknown directives fall back to showing help.

use crate::assist::CodeTask;

/// The character that marks a line as a directive.
pub const DIRECTIVE_MARKER: char = ':';

/// A parsed directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Display help information.
    ShowHelp,
    /// Display the version.
    ShowVersion,
    /// Exit the chat application.
    Quit,
    /// Generate tests for a file or function.
    GenerateTest,
    /// Look for bugs in a file or function.
    FindBugs,
}

impl Directive {
    /// The code-assistance task this directive runs, if any.
    pub fn code_task(self) -> Option<CodeTask> {
        match self {
            Directive::GenerateTest => Some(CodeTask::GenerateTest),
            Directive::FindBugs => Some(CodeTask::FindBugs),
            _ => None,
        }
    }
}

struct DirectiveDefinition {
    name: &'static str,
    options: &'static [(&'static str, &'static str)],
}

const DEFINITIONS: &[DirectiveDefinition] = &[
    DirectiveDefinition {
        name: "testgen",
        options: &[
            ("<file>", "generate test for <file>"),
            ("<file> <function>", "generate test for <function> in <file>"),
        ],
    },
    DirectiveDefinition {
        name: "findbugs",
        options: &[
            ("<file>", "find bugs in <file>"),
            ("<file> <function>", "find bugs in <function> in <file>"),
        ],
    },
    DirectiveDefinition {
        name: "help",
        options: &[("", "show help")],
    },
    DirectiveDefinition {
        name: "version",
        options: &[("", "show version")],
    },
    DirectiveDefinition {
        name: "quit",
        options: &[("", "exit the chat")],
    },
];

/// Classifies a line of user input.
///
/// Returns `Some(Directive)` if the line starts with the directive marker, or
/// `None` if it is chat text.
///
/// # Examples
///
/// ```
/// # use confab::chat::{Directive, parse_directive};
/// assert_eq!(parse_directive(":quit"), Some(Directive::Quit));
/// assert_eq!(parse_directive(":testgen main.go"), Some(Directive::GenerateTest));
/// assert_eq!(parse_directive(":nonsense"), Some(Directive::ShowHelp));
/// assert_eq!(parse_directive("Hello!"), None);
/// ```
pub fn parse_directive(input: &str) -> Option<Directive> {
    let rest = input.trim().strip_prefix(DIRECTIVE_MARKER)?;
    let name = rest
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();

    let directive = match name.as_str() {
        "version" => Directive::ShowVersion,
        "quit" | "exit" | "q" => Directive::Quit,
        "testgen" => Directive::GenerateTest,
        "findbugs" => Directive::FindBugs,
        _ => Directive::ShowHelp,
    };
    Some(directive)
}

/// Returns help text describing available directives.
pub fn help_text() -> String {
    let mut text = String::new();
    for definition in DEFINITIONS {
        for (option, description) in definition.options {
            let usage = format!("{DIRECTIVE_MARKER}{} {option}", definition.name);
            text.push_str(&format!("{}: {description}\n", usage.trim_end()));
        }
    }
    text
}

/// Returns the version line.
pub fn version_text() -> String {
    format!("version: {}", env!("CARGO_PKG_VERSION"))
}
