//! Style and tone catalogs.
//!
//! Each entry has a display label (shown to the user and written to the run
//! log) and a directive (the only part that is ever sent to the model).

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of post to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    BasicIntroduction,
    Summary,
    KeyObservations,
    BenefitsLimitations,
}

impl Style {
    pub const ALL: [Style; 4] = [
        Style::BasicIntroduction,
        Style::Summary,
        Style::KeyObservations,
        Style::BenefitsLimitations,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Style::BasicIntroduction => "Basic Introduction Post",
            Style::Summary => "Summary Post",
            Style::KeyObservations => "Key Observations Post",
            Style::BenefitsLimitations => "Benefits & Limitations Post",
        }
    }

    pub fn directive(self) -> &'static str {
        match self {
            Style::BasicIntroduction => {
                "Introduce the topic or article in a concise and engaging manner. Highlight the key \
                 points and provide a compelling reason for the audience to continue reading"
            }
            Style::Summary => {
                "Provide a brief summary of the content, focusing on the most important points. Use \
                 clear and concise language to make the post easy to read and understand"
            }
            Style::KeyObservations => {
                "Identify the most important observations or insights from the content and present \
                 them in a clear and organized manner. Use bullet points or numbered lists to make \
                 the post easy to scan and digest."
            }
            Style::BenefitsLimitations => {
                "Highlight the top benefits and limitations of the topic or article, providing a \
                 balanced view of both. Use bullet points or numbered lists to make the post easy \
                 to read and understand"
            }
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The register the post is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Casual,
    Professional,
    Humorous,
    Informative,
    Inspirational,
}

impl Tone {
    pub const ALL: [Tone; 5] = [
        Tone::Casual,
        Tone::Professional,
        Tone::Humorous,
        Tone::Informative,
        Tone::Inspirational,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Tone::Casual => "Casual",
            Tone::Professional => "Professional",
            Tone::Humorous => "Humorous",
            Tone::Informative => "Informative",
            Tone::Inspirational => "Inspirational",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Tone::Casual => "relaxed and conversational, like talking to a colleague",
            Tone::Professional => "polished and credible, free of slang",
            Tone::Humorous => "light and witty without undermining the content",
            Tone::Informative => "factual and explanatory, focused on clarity",
            Tone::Inspirational => "uplifting and motivating, ending on a call to action",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
