//! Feature files: the subset of Gherkin the run preparation needs.
//!
//! Only structure is parsed (feature, background, scenarios and their
//! steps). Tags, comments, data tables and doc strings are skipped. Syntax
//! errors carry the source and a span so they render with context.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Comment prefix of notices the operator must acknowledge before a run.
pub const NOTICE_PREFIX: &str = "# grizzly-cli:notice ";

const QUESTION_PREFIX: &str = "ask for value of variable";

/// Feature file syntax error with source location.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(grizzly::feature))]
pub struct FeatureError {
    pub message: String,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("here")]
    pub span: SourceSpan,

    #[help]
    pub help: Option<String>,
}

impl FeatureError {
    fn new(message: impl Into<String>, source: &Source<'_>, offset: usize, len: usize) -> Self {
        Self {
            message: message.into(),
            src: NamedSource::new(source.name, source.text.to_string()),
            span: (offset, len).into(),
            help: None,
        }
    }

    fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// Step keyword after `And`/`But` have been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Given,
    When,
    Then,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepKind::Given => "Given",
            StepKind::When => "When",
            StepKind::Then => "Then",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    /// Step text without its keyword.
    pub text: String,
    /// 1-based line number.
    pub line: usize,
    offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub line: usize,
    pub steps: Vec<Step>,
}

/// A parsed feature file.
#[derive(Debug, Clone)]
pub struct Feature {
    pub name: String,
    pub background: Vec<Step>,
    pub scenarios: Vec<Scenario>,
    source_name: String,
    source: String,
}

impl Feature {
    /// Read and parse the feature file at `path`.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&path.display().to_string(), &text)?)
    }

    /// Parse feature file text; `name` is only used in diagnostics.
    pub fn parse(name: &str, text: &str) -> Result<Self, FeatureError> {
        Parser::new(Source { name, text }).run()
    }

    /// Notices embedded as `# grizzly-cli:notice <text>` comments.
    pub fn notices(&self) -> Vec<String> {
        self.source
            .lines()
            .map(str::trim)
            .filter_map(|line| line.strip_prefix(NOTICE_PREFIX))
            .map(str::to_string)
            .collect()
    }

    /// Sorted, unique names of variables asked for with
    /// `ask for value of variable "<name>"`.
    pub fn question_variables(&self) -> Result<Vec<String>, FeatureError> {
        let mut names = BTreeSet::new();
        let steps = self
            .scenarios
            .iter()
            .flat_map(|scenario| scenario.steps.iter())
            .chain(self.background.iter());

        for step in steps {
            let Some(rest) = step.text.strip_prefix(QUESTION_PREFIX) else {
                continue;
            };
            match quoted(rest.trim_start()) {
                Some((name, _)) => {
                    names.insert(name.to_string());
                }
                None => {
                    let source = Source {
                        name: &self.source_name,
                        text: &self.source,
                    };
                    return Err(FeatureError::new(
                        format!("could not find variable name in \"{}\"", step.text),
                        &source,
                        step.offset,
                        step.text.len(),
                    )
                    .with_help("quote the variable name: ask for value of variable \"name\""));
                }
            }
        }

        Ok(names.into_iter().collect())
    }
}

/// Split `"value" rest` into `value` and `rest`.
pub(crate) fn quoted(text: &str) -> Option<(&str, &str)> {
    let inner = text.strip_prefix('"')?;
    let end = inner.find('"')?;
    Some((&inner[..end], &inner[end + 1..]))
}

struct Source<'a> {
    name: &'a str,
    text: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Feature,
    Background,
    Scenario,
    Examples,
}

struct Parser<'a> {
    source: Source<'a>,
    section: Section,
    name: Option<String>,
    background: Option<Vec<Step>>,
    scenarios: Vec<Scenario>,
    last_kind: Option<StepKind>,
    doc_string: Option<&'static str>,
}

impl<'a> Parser<'a> {
    fn new(source: Source<'a>) -> Self {
        Self {
            source,
            section: Section::Preamble,
            name: None,
            background: None,
            scenarios: Vec::new(),
            last_kind: None,
            doc_string: None,
        }
    }

    fn run(mut self) -> Result<Feature, FeatureError> {
        let text = self.source.text;
        let mut offset = 0;

        for (index, raw) in text.split_inclusive('\n').enumerate() {
            let line_offset = offset;
            offset += raw.len();

            let content = raw.trim_end_matches(['\n', '\r']);
            let line = content.trim();
            if line.is_empty() {
                continue;
            }
            let column = content.len() - content.trim_start().len();
            self.line(index + 1, line, line_offset + column)?;
        }

        if let Some(delimiter) = self.doc_string {
            return Err(FeatureError::new(
                format!("unterminated doc string, expected closing {delimiter}"),
                &self.source,
                text.len(),
                0,
            ));
        }

        let Some(name) = self.name else {
            return Err(FeatureError::new("missing `Feature:` header", &self.source, 0, 0)
                .with_help("a feature file starts with `Feature: <name>`"));
        };

        Ok(Feature {
            name,
            background: self.background.unwrap_or_default(),
            scenarios: self.scenarios,
            source_name: self.source.name.to_string(),
            source: text.to_string(),
        })
    }

    fn line(&mut self, number: usize, line: &str, offset: usize) -> Result<(), FeatureError> {
        if let Some(delimiter) = self.doc_string {
            if line.starts_with(delimiter) {
                self.doc_string = None;
            }
            return Ok(());
        }
        if line.starts_with("\"\"\"") {
            self.doc_string = Some("\"\"\"");
            return Ok(());
        }
        if line.starts_with("```") {
            self.doc_string = Some("```");
            return Ok(());
        }
        if line.starts_with('#') || line.starts_with('@') || line.starts_with('|') {
            return Ok(());
        }

        if let Some(name) = line.strip_prefix("Feature:") {
            if self.section != Section::Preamble {
                return Err(self.error("only one `Feature:` is allowed per file", line, offset));
            }
            self.name = Some(name.trim().to_string());
            self.section = Section::Feature;
            return Ok(());
        }

        if self.section == Section::Preamble {
            return Err(self
                .error("expected `Feature:`", line, offset)
                .with_help("only comments and tags may precede the feature header"));
        }

        if line.starts_with("Background:") {
            if self.background.is_some() || !self.scenarios.is_empty() {
                return Err(self.error(
                    "`Background:` must come once, before the first scenario",
                    line,
                    offset,
                ));
            }
            self.background = Some(Vec::new());
            self.enter(Section::Background);
            return Ok(());
        }

        const SCENARIO_KEYWORDS: [&str; 4] =
            ["Scenario Outline:", "Scenario Template:", "Scenario:", "Example:"];
        if let Some(name) = SCENARIO_KEYWORDS
            .iter()
            .find_map(|keyword| line.strip_prefix(keyword))
        {
            self.scenarios.push(Scenario {
                name: name.trim().to_string(),
                line: number,
                steps: Vec::new(),
            });
            self.enter(Section::Scenario);
            return Ok(());
        }

        if line.starts_with("Examples:") || line.starts_with("Scenarios:") {
            if self.section != Section::Scenario && self.section != Section::Examples {
                return Err(self.error("`Examples:` outside of a scenario outline", line, offset));
            }
            self.section = Section::Examples;
            return Ok(());
        }

        if line.starts_with("Rule:") {
            self.enter(Section::Feature);
            return Ok(());
        }

        match self.step(line, number, offset)? {
            Some(step) => self.push(step, line, offset),
            None if self.has_steps() => Err(self
                .error("unexpected text, expected a step", line, offset)
                .with_help("steps start with Given, When, Then, And, But or *")),
            // free-form description under a header
            None => Ok(()),
        }
    }

    fn step(&mut self, line: &str, number: usize, offset: usize) -> Result<Option<Step>, FeatureError> {
        const KEYWORDS: [(&str, Option<StepKind>); 6] = [
            ("Given ", Some(StepKind::Given)),
            ("When ", Some(StepKind::When)),
            ("Then ", Some(StepKind::Then)),
            ("And ", None),
            ("But ", None),
            ("* ", None),
        ];

        let Some((keyword, explicit, text)) = KEYWORDS.iter().find_map(|(keyword, kind)| {
            line.strip_prefix(keyword).map(|text| (*keyword, *kind, text))
        }) else {
            return Ok(None);
        };

        let kind = match (explicit, self.last_kind, keyword) {
            (Some(kind), _, _) => kind,
            (None, Some(previous), _) => previous,
            (None, None, "* ") => StepKind::Given,
            (None, None, _) => {
                return Err(self.error(
                    format!("`{}` without a preceding step", keyword.trim()),
                    line,
                    offset,
                ))
            }
        };
        self.last_kind = Some(kind);

        let text = text.trim();
        Ok(Some(Step {
            kind,
            text: text.to_string(),
            line: number,
            offset: offset + (line.len() - text.len()),
        }))
    }

    fn push(&mut self, step: Step, line: &str, offset: usize) -> Result<(), FeatureError> {
        match self.section {
            Section::Background => {
                if let Some(background) = self.background.as_mut() {
                    background.push(step);
                }
                Ok(())
            }
            Section::Scenario => {
                if let Some(scenario) = self.scenarios.last_mut() {
                    scenario.steps.push(step);
                }
                Ok(())
            }
            _ => Err(self.error("step outside of a scenario", line, offset)),
        }
    }

    fn has_steps(&self) -> bool {
        match self.section {
            Section::Background => self.background.as_ref().is_some_and(|steps| !steps.is_empty()),
            Section::Scenario => self.scenarios.last().is_some_and(|s| !s.steps.is_empty()),
            Section::Examples => true,
            _ => false,
        }
    }

    fn enter(&mut self, section: Section) {
        self.section = section;
        self.last_kind = None;
    }

    fn error(&self, message: impl Into<String>, line: &str, offset: usize) -> FeatureError {
        FeatureError::new(message, &self.source, offset, line.len())
    }
}
