use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding the crate's own Rust sources.
const SOURCE_ROOTS: [&str; 4] = ["analysis", "cli", "tests", "benches"];

// A source-policy rule: a line regex plus a filter that decides whether a
// matching line is really a violation.
struct Rule {
    title: &'static str,
    pattern: &'static str,
    is_violation: fn(&str) -> bool,
    advice: &'static str,
}

static RULES: [Rule; 5] = [
    Rule {
        title: "underscore-prefixed identifiers",
        pattern: r"\b(_[a-zA-Z0-9_]+)\b",
        is_violation: underscore_outside_comment_or_string,
        advice: "Either use the binding (removing the underscore) or remove it completely.",
    },
    Rule {
        title: "forbidden comment words",
        pattern: r"(//|/\*).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE)",
        is_violation: always,
        advice: "Comments describe the code as it is, not its edit history. Remove the comment.",
    },
    Rule {
        title: "'**' in non-doc comments",
        pattern: r"(//|/\*).*\*\*",
        is_violation: not_doc_comment,
        advice: "Markdown emphasis belongs in doc comments only.",
    },
    Rule {
        title: "all-uppercase comments",
        pattern: r"(//|/\*)",
        is_violation: comment_is_all_uppercase,
        advice: "Rewrite the comment in sentence case or delete it.",
    },
    Rule {
        title: "#[allow(dead_code)] attributes",
        pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        is_violation: always,
        advice: "Either use the code (removing the attribute) or remove it completely.",
    },
];

fn always(_: &str) -> bool {
    true
}

fn not_doc_comment(line: &str) -> bool {
    !line.trim_start().starts_with("///")
}

fn underscore_outside_comment_or_string(line: &str) -> bool {
    if line.trim_start().starts_with("//") {
        return false;
    }
    // Odd segments of a quote split are inside string literals.
    let in_string = line
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'));
    !in_string
}

fn comment_is_all_uppercase(line: &str) -> bool {
    let trimmed = line.trim_start();
    let text = if let Some(rest) = trimmed.strip_prefix("///") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        rest.trim_start_matches('!')
    } else if let Some(start) = line.find("/*") {
        let rest = &line[start + 2..];
        rest.find("*/").map_or(rest, |end| &rest[..end])
    } else {
        return false;
    };
    let mut letters = text.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(char::is_uppercase)
}

// Collects the offending lines of one file for one rule.
struct LineCollector<'a> {
    rule: &'a Rule,
    path: PathBuf,
    violations: Vec<String>,
}

impl Sink for LineCollector<'_> {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.rule.is_violation)(line_text) {
            let line_number = mat.line_number().unwrap_or(0);
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

impl LineCollector<'_> {
    fn report(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let mut message = format!(
            "\n❌ ERROR: Found {} {} in {}:\n",
            self.violations.len(),
            self.rule.title,
            self.path.display()
        );
        for violation in &self.violations {
            message.push_str(&format!("   {violation}\n"));
        }
        message.push_str(&format!("\n⚠️ {}\n", self.rule.advice));
        Some(message)
    }
}

fn rust_sources() -> Vec<PathBuf> {
    SOURCE_ROOTS
        .iter()
        .filter(|root| Path::new(root).is_dir())
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn check_sources(sources: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let mut searcher = Searcher::new();
    for rule in &RULES {
        let matcher = RegexMatcher::new_line_matcher(rule.pattern)?;
        for path in sources {
            let mut collector = LineCollector {
                rule,
                path: path.clone(),
                violations: Vec::new(),
            };
            searcher.search_path(&matcher, path, &mut collector)?;
            if let Some(message) = collector.report() {
                return Err(message.into());
            }
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SOURCE_ROOTS {
        println!("cargo:rerun-if-changed={root}");
    }

    if let Err(e) = check_sources(&rust_sources()) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
