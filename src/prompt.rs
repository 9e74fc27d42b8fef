//! Two-part chat prompt templates.
//!
//! Templates use `{name}` placeholders and `{{` / `}}` for literal braces.
//! Only `text`, `style` and `tone` are known; anything else is rejected when
//! the template is built, so a rendered prompt never has holes in it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SYSTEM_TEMPLATE: &str = "You are a social media copywriter who turns articles \
into LinkedIn posts. Write in the following tone: {tone}. Never invent facts that are not in the \
provided text.";

pub const DEFAULT_HUMAN_TEMPLATE: &str = "Write a post of the following kind: {style}\n\n\
Base it only on this text:\n\n{text}";

const KNOWN_VARIABLES: [&str; 3] = ["text", "style", "tone"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PromptError {
    #[error("template placeholder {{{0}}} has no matching variable")]
    MissingVariable(String),
    #[error("malformed template: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Compiled {
    source: String,
    segments: Vec<Segment>,
}

impl Compiled {
    fn parse(source: &str) -> Result<Self, PromptError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => {
                                return Err(PromptError::Malformed(format!(
                                    "unclosed placeholder {{{name}"
                                )))
                            }
                            Some(ch) => name.push(ch),
                        }
                    }
                    let name = name.trim().to_string();
                    if !KNOWN_VARIABLES.contains(&name.as_str()) {
                        return Err(PromptError::MissingVariable(name));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Variable(name));
                }
                '}' => {
                    return Err(PromptError::Malformed(
                        "unmatched '}' outside a placeholder".to_string(),
                    ))
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    fn render(&self, vars: &PromptVariables<'_>) -> Result<String, PromptError> {
        let mut out = String::with_capacity(self.source.len() + vars.text.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Variable(name) => out.push_str(vars.get(name)?),
            }
        }
        Ok(out)
    }

    fn skeleton(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Literal(s) => Some(s.as_str()),
                Segment::Variable(_) => None,
            })
            .collect()
    }
}

/// Values substituted into a template.
///
/// `style` and `tone` carry the catalog directive/description, not the label.
#[derive(Debug, Clone, Copy)]
pub struct PromptVariables<'a> {
    pub text: &'a str,
    pub style: &'a str,
    pub tone: &'a str,
}

impl<'a> PromptVariables<'a> {
    fn get(&self, name: &str) -> Result<&'a str, PromptError> {
        match name {
            "text" => Ok(self.text),
            "style" => Ok(self.style),
            "tone" => Ok(self.tone),
            other => Err(PromptError::MissingVariable(other.to_string())),
        }
    }
}

/// A system/human message pair ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPrompt {
    pub system: String,
    pub human: String,
}

/// The process-wide prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    system: Compiled,
    human: Compiled,
}

impl PromptTemplate {
    pub fn new(system: &str, human: &str) -> Result<Self, PromptError> {
        Ok(Self {
            system: Compiled::parse(system)?,
            human: Compiled::parse(human)?,
        })
    }

    pub fn render(&self, vars: &PromptVariables<'_>) -> Result<RenderedPrompt, PromptError> {
        Ok(RenderedPrompt {
            system: self.system.render(vars)?,
            human: self.human.render(vars)?,
        })
    }

    /// System message source text.
    pub fn system_text(&self) -> &str {
        &self.system.source
    }

    /// Human text with every placeholder removed.
    pub fn human_skeleton(&self) -> String {
        self.human.skeleton()
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_TEMPLATE, DEFAULT_HUMAN_TEMPLATE)
            .expect("built-in templates are well formed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: PromptVariables<'static> = PromptVariables {
        text: "ARTICLE",
        style: "a short summary",
        tone: "casual",
    };

    #[test]
    fn renders_both_messages() {
        let template = PromptTemplate::new("Tone: {tone}", "{style}\n---\n{text}").unwrap();
        let prompt = template.render(&VARS).unwrap();
        assert_eq!(prompt.system, "Tone: casual");
        assert_eq!(prompt.human, "a short summary\n---\nARTICLE");
    }

    #[test]
    fn doubled_braces_are_literal() {
        let template = PromptTemplate::new("Reply as {{\"post\": ...}}", "{text}").unwrap();
        assert_eq!(template.render(&VARS).unwrap().system, "Reply as {\"post\": ...}");
    }

    #[test]
    fn unknown_placeholder_is_missing_variable() {
        let err = PromptTemplate::new("{persona}", "{text}").unwrap_err();
        assert_eq!(err, PromptError::MissingVariable("persona".to_string()));
        let err = PromptTemplate::new("ok", "{text} for {audience}").unwrap_err();
        assert_eq!(err, PromptError::MissingVariable("audience".to_string()));
    }

    #[test]
    fn unbalanced_braces_are_malformed() {
        assert!(matches!(
            PromptTemplate::new("{text", "x"),
            Err(PromptError::Malformed(_))
        ));
        assert!(matches!(
            PromptTemplate::new("x", "oops }"),
            Err(PromptError::Malformed(_))
        ));
    }

    #[test]
    fn skeleton_drops_placeholders() {
        let template = PromptTemplate::new("sys {tone}.", "Kind: {style}\n{text}").unwrap();
        assert_eq!(template.system_text(), "sys {tone}.");
        assert_eq!(template.human_skeleton(), "Kind: \n");
    }

    #[test]
    fn builtin_templates_parse() {
        let prompt = PromptTemplate::default().render(&VARS).unwrap();
        assert!(prompt.system.contains("casual"));
        assert!(prompt.human.ends_with("ARTICLE"));
        assert!(prompt.human.contains("a short summary"));
    }
}
