use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding the crate's own sources. Nothing else is scanned.
const SOURCE_ROOTS: [&str; 5] = ["engine", "scenario", "cli", "tests", "benches"];

const FORBIDDEN_WORDS: &str = "FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE";

#[derive(Clone, Copy, PartialEq)]
enum Check {
    UnderscorePrefix,
    ForbiddenWords,
    StarsOutsideDocComments,
    AllUppercaseComment,
    AllowDeadCode,
}

impl Check {
    fn pattern(self) -> String {
        match self {
            Check::UnderscorePrefix => r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            Check::ForbiddenWords => format!(r"(//|/\*|///).*(?:{FORBIDDEN_WORDS})"),
            Check::StarsOutsideDocComments => r"(//|/\*).*\*\*".to_string(),
            Check::AllUppercaseComment => r"(//|/\*|///).*".to_string(),
            Check::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
        }
    }

    fn explanation(self) -> &'static str {
        match self {
            Check::UnderscorePrefix => {
                "Underscore-prefixed names are not allowed. Use the binding or remove it."
            }
            Check::ForbiddenWords => {
                "Comments narrating edits (FIX, NEW, CHANGE, UPDATE and similar) are not allowed."
            }
            Check::StarsOutsideDocComments => "'**' is only allowed in doc comments.",
            Check::AllUppercaseComment => {
                "Comments whose letters are all uppercase are not allowed."
            }
            Check::AllowDeadCode => {
                "#[allow(dead_code)] is not allowed. Use the code or delete it."
            }
        }
    }

    fn applies_to_build_script(self) -> bool {
        self == Check::UnderscorePrefix
    }
}

// Collects the offending lines of one file for one check.
struct ViolationCollector {
    check: Check,
    violations: Vec<String>,
    file_path: PathBuf,
}

impl ViolationCollector {
    fn new(check: Check, file_path: &Path) -> Self {
        Self {
            check,
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
        }
    }

    fn is_violation(&self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match self.check {
            Check::UnderscorePrefix => {
                let is_comment = trimmed.starts_with("//") || line.contains("/*");
                let in_string = line
                    .split('"')
                    .enumerate()
                    .any(|(i, part)| i % 2 == 1 && part.contains('_'));
                !is_comment && !in_string
            }
            Check::ForbiddenWords | Check::AllowDeadCode => true,
            Check::StarsOutsideDocComments => !trimmed.starts_with("///"),
            Check::AllUppercaseComment => {
                let comment = if let Some(rest) = trimmed.strip_prefix("///") {
                    rest
                } else if let Some(rest) = trimmed.strip_prefix("//") {
                    rest
                } else if let Some(idx) = line.find("/*") {
                    let rest = &line[idx + 2..];
                    rest.find("*/").map_or(rest, |end| &rest[..end])
                } else {
                    return false;
                };
                let mut letters = comment.chars().filter(|c| c.is_alphabetic()).peekable();
                letters.peek().is_some() && letters.all(char::is_uppercase)
            }
        }
    }

    fn error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }
        let mut message = format!(
            "\n❌ ERROR: {} violation(s) in {}:\n",
            self.violations.len(),
            self.file_path.display()
        );
        for violation in &self.violations {
            message.push_str(&format!("   {violation}\n"));
        }
        message.push_str(&format!("\n⚠️ {}\n", self.check.explanation()));
        Some(message)
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if self.is_violation(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn rust_sources() -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = SOURCE_ROOTS
        .iter()
        .flat_map(|root| WalkDir::new(root).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect();
    files.push(PathBuf::from("build.rs"));
    files
}

fn run_check(check: Check, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(&check.pattern())?;
    let mut searcher = Searcher::new();
    for path in files {
        if path == Path::new("build.rs") && !check.applies_to_build_script() {
            continue;
        }
        let mut collector = ViolationCollector::new(check, path);
        searcher.search_path(&matcher, path, &mut collector)?;
        if let Some(message) = collector.error_message() {
            return Err(message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SOURCE_ROOTS {
        println!("cargo:rerun-if-changed={root}");
    }

    let files = rust_sources();
    let checks = [
        Check::UnderscorePrefix,
        Check::ForbiddenWords,
        Check::StarsOutsideDocComments,
        Check::AllUppercaseComment,
        Check::AllowDeadCode,
    ];
    for check in checks {
        if let Err(e) = run_check(check, &files) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
