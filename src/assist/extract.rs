//! Slicing a single function out of a source file.
//!
//! Extraction is textual.  A declaration is recognized by one of the keywords
//! `func`, `fn`, `def` or `function` followed by the function's name; its end is
//! the matching closing brace, or for `def` the end of the indented block.  The
//! returned text is made of whole lines from the declaration through its end.

use regex::Regex;

use crate::error::{Error, Result};

/// Returns the whole `source`, or just the named function when one is given.
pub fn extract_code(source: &str, function: Option<&str>) -> Result<String> {
    let Some(name) = function.map(str::trim).filter(|name| !name.is_empty()) else {
        return Ok(source.to_string());
    };
    let (start, end) =
        find_function_span(source, name)?.ok_or_else(|| Error::function_not_found(name))?;
    let lines: Vec<&str> = source.split('\n').collect();
    Ok(lines[start..=end].join("\n"))
}

/// Locates the first declaration of `name`.
///
/// Returns the zero-based first and last line of the declaration, or `None`
/// when the function is not declared in `source`.
pub fn find_function_span(source: &str, name: &str) -> Result<Option<(usize, usize)>> {
    let declaration = declaration_regex(name)?;
    let lines: Vec<&str> = source.split('\n').collect();

    for (index, line) in lines.iter().enumerate() {
        let Some(captures) = declaration.captures(line) else {
            continue;
        };
        let keyword = captures.name("keyword").map_or("", |m| m.as_str());
        let end = if keyword == "def" {
            indented_block_end(&lines, index)
        } else {
            let offset: usize = lines[..index].iter().map(|l| l.len() + 1).sum();
            braced_block_end(source, offset, keyword == "fn")
        };
        return Ok(Some((index, end)));
    }
    Ok(None)
}

fn declaration_regex(name: &str) -> Result<Regex> {
    let pattern = format!(
        r#"^\s*(?:(?:pub(?:\([^)]*\))?|async|unsafe|const|static|export|default|extern(?:\s+"[^"]*")?)\s+)*(?P<keyword>func|fn|def|function)\s*(?:\([^)]*\)\s*)?{}\s*[(<\[]"#,
        regex::escape(name)
    );
    Regex::new(&pattern).map_err(|e| Error::validation(format!("invalid function name: {e}"), None))
}

/// Line index of the brace that closes the first block opened at or after
/// `offset`.  A `;` before any block marks a body-less declaration.
fn braced_block_end(source: &str, offset: usize, rust_quotes: bool) -> usize {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut opened = false;
    let mut i = offset;
    let mut end = bytes.len();

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = skip_until(bytes, i + 2, b"\n");
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_until(bytes, i + 2, b"*/") + 2;
                continue;
            }
            b'"' => {
                i = skip_quoted(bytes, i + 1, b'"');
                continue;
            }
            b'`' => {
                i = skip_until(bytes, i + 1, b"`") + 1;
                continue;
            }
            b'\'' if rust_quotes => {
                i = skip_rust_char(bytes, i);
                continue;
            }
            b'\'' => {
                i = skip_quoted(bytes, i + 1, b'\'');
                continue;
            }
            b'r' if rust_quotes => {
                if let Some(hashes) = raw_string_start(bytes, i) {
                    let mut close = vec![b'"'];
                    close.extend(std::iter::repeat_n(b'#', hashes));
                    i = skip_until(bytes, i + hashes + 2, &close) + close.len();
                    continue;
                }
            }
            b'{' => {
                depth += 1;
                opened = true;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 && opened {
                    end = i;
                    break;
                }
            }
            b';' if !opened => {
                end = i;
                break;
            }
            _ => {}
        }
        i += 1;
    }

    let end = end.min(bytes.len());
    bytes[..end].iter().filter(|b| **b == b'\n').count()
}

/// Index of the first occurrence of `pattern` at or after `from`, or the end of input.
fn skip_until(bytes: &[u8], from: usize, pattern: &[u8]) -> usize {
    if from >= bytes.len() {
        return bytes.len();
    }
    bytes[from..]
        .windows(pattern.len())
        .position(|window| window == pattern)
        .map_or(bytes.len(), |pos| from + pos)
}

/// Index just past the closing `quote`, honoring backslash escapes.
fn skip_quoted(bytes: &[u8], mut i: usize, quote: u8) -> usize {
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            b'\n' if quote == b'\'' => return i,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Skips a Rust character literal, or only the quote of a lifetime.
fn skip_rust_char(bytes: &[u8], i: usize) -> usize {
    match bytes.get(i + 1) {
        Some(b'\\') => skip_quoted(bytes, i + 1, b'\''),
        Some(&lead) => {
            let width = match lead {
                0xf0.. => 4,
                0xe0.. => 3,
                0x80.. => 2,
                _ => 1,
            };
            if bytes.get(i + 1 + width) == Some(&b'\'') {
                i + width + 2
            } else {
                i + 1
            }
        }
        None => i + 1,
    }
}

/// Number of `#`s if a raw string literal starts at `i`.
fn raw_string_start(bytes: &[u8], i: usize) -> Option<usize> {
    if i > 0 && (bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_') {
        return None;
    }
    let hashes = bytes[i + 1..].iter().take_while(|b| **b == b'#').count();
    (bytes.get(i + 1 + hashes) == Some(&b'"')).then_some(hashes)
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Last line of the indented block introduced by the `def` on line `start`.
fn indented_block_end(lines: &[&str], start: usize) -> usize {
    let base = indentation(lines[start]);

    // The signature may span several lines; it ends at a `:` outside brackets.
    let mut nesting = 0i32;
    let mut header_end = start;
    for (index, line) in lines.iter().enumerate().skip(start) {
        for c in line.chars() {
            match c {
                '(' | '[' | '{' => nesting += 1,
                ')' | ']' | '}' => nesting -= 1,
                _ => {}
            }
        }
        header_end = index;
        if nesting <= 0 && line.trim_end().ends_with(':') {
            break;
        }
    }

    let mut end = header_end;
    for (index, line) in lines.iter().enumerate().skip(header_end + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if indentation(line) <= base {
            break;
        }
        end = index;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    const GO_SOURCE: &str = r#"package main

import "fmt"

// Add returns the sum.
func Add(a, b int) int {
	return a + b
}

func (s *Server) Handle(path string) {
	if path == "}" {
		fmt.Println(`{`)
	}
	// closing brace in a comment }
}

func main() {
	fmt.Println(Add(1, 2))
}
"#;

    #[test]
    fn whole_file_without_function() {
        assert_eq!(extract_code(GO_SOURCE, None).unwrap(), GO_SOURCE);
        assert_eq!(extract_code(GO_SOURCE, Some("  ")).unwrap(), GO_SOURCE);
    }

    #[test]
    fn go_function() {
        assert_eq!(
            extract_code(GO_SOURCE, Some("Add")).unwrap(),
            "func Add(a, b int) int {\n\treturn a + b\n}"
        );
    }

    #[test]
    fn go_method_with_tricky_braces() {
        let code = extract_code(GO_SOURCE, Some("Handle")).unwrap();
        assert!(code.starts_with("func (s *Server) Handle(path string) {"));
        assert!(code.ends_with("\t// closing brace in a comment }\n}"));
        assert_eq!(code.lines().count(), 6);
    }

    #[test]
    fn missing_function() {
        let err = extract_code(GO_SOURCE, Some("Sub")).unwrap_err();
        assert!(err.is_function_not_found());
        assert_eq!(find_function_span(GO_SOURCE, "Ad").unwrap(), None);
    }

    #[test]
    fn rust_function_with_lifetimes_and_chars() {
        let source = r##"pub struct Parser;

impl Parser {
    pub async fn split<'a>(&self, input: &'a str) -> Vec<&'a str> {
        let open = '{';
        let raw = r#"}"#;
        input.split(|c| c == '}' || c == open).collect()
    }

    fn other(&self) {}
}
"##;
        let code = extract_code(source, Some("split")).unwrap();
        assert!(code.starts_with("    pub async fn split<'a>"));
        assert!(code.ends_with("collect()\n    }"));
        assert_eq!(find_function_span(source, "other").unwrap(), Some((9, 9)));
    }

    #[test]
    fn python_function() {
        let source = "import os\n\ndef load(path,\n         mode='r'):\n    with open(path, mode) as f:\n\n        return f.read()\n\ndef main():\n    pass\n";
        assert_eq!(
            extract_code(source, Some("load")).unwrap(),
            "def load(path,\n         mode='r'):\n    with open(path, mode) as f:\n\n        return f.read()"
        );
        assert_eq!(extract_code(source, Some("main")).unwrap(), "def main():\n    pass");
    }

    #[test]
    fn javascript_function() {
        let source = "export function greet(name) {\n  return `hi ${name}`;\n}\n";
        assert_eq!(
            extract_code(source, Some("greet")).unwrap(),
            "export function greet(name) {\n  return `hi ${name}`;\n}"
        );
    }

    #[test]
    fn name_is_matched_literally() {
        let source = "func a_b() {}\nfunc a.b() {}\n";
        assert_eq!(find_function_span(source, "a.b").unwrap(), Some((1, 1)));
    }
}
