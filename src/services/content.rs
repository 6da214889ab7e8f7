//! Prompt construction and parsing of generated social media content.

use crate::models::job::{
    FacebookPost, InstagramPost, JobOptions, LengthPreset, PlatformVariants, YoutubePost,
};
use crate::services::ai::Prompt;

const SYSTEM_PROMPT: &str = "You are a social media expert who creates engaging captions, \
descriptions, and trending hashtags for video content. Make content suitable for Instagram, \
Facebook, and YouTube.";

const CAPTION_MARKER: &str = "CAPTION:";
const DESCRIPTION_MARKER: &str = "DESCRIPTION:";
const HASHTAGS_MARKER: &str = "HASHTAGS:";

/// What the generator writes about.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceMaterial {
    Transcript(String),
    Image(String),
}

/// Caption, description and hashtags extracted from a model response.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContent {
    pub caption: String,
    pub description: String,
    pub hashtags: Vec<String>,
}

fn caption_requirement(length: LengthPreset) -> &'static str {
    match length {
        LengthPreset::Short => "1 sentence (concise and punchy)",
        LengthPreset::Medium => "2 sentences (engaging with hook)",
        LengthPreset::Long => "3 sentences (detailed with strong hook)",
    }
}

fn description_requirement(length: LengthPreset) -> &'static str {
    match length {
        LengthPreset::Short => "1 paragraph (brief overview)",
        LengthPreset::Medium => "2-3 paragraphs (detailed explanation)",
        LengthPreset::Long => "4-5 paragraphs (comprehensive and detailed)",
    }
}

pub fn build_prompt(source: &SourceMaterial, options: &JobOptions) -> Prompt {
    let (intro, material) = match source {
        SourceMaterial::Transcript(text) => ("Based on this video transcription", text.as_str()),
        SourceMaterial::Image(summary) => ("Based on this description of an image", summary.as_str()),
    };

    let user = format!(
        "{intro}, generate social media content for Instagram, Facebook, and YouTube:\n\n\
         {material}\n\n\
         Please provide:\n\
         1. A hook-style caption ({caption}, written like a hook that grabs attention and creates curiosity, with emojis)\n\
         2. A detailed description ({description} explaining the content)\n\
         3. Exactly {count} trending hashtags relevant to the content\n\n\
         Format the response as:\n\n\
         {CAPTION_MARKER}\n[caption]\n\n\
         {DESCRIPTION_MARKER}\n[description]\n\n\
         {HASHTAGS_MARKER}\n[hashtags separated by spaces, like: #trending #video #content]",
        caption = caption_requirement(options.caption_length),
        description = description_requirement(options.description_length),
        count = options.hashtag_count,
    );

    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

fn section<'a>(text: &'a str, marker: &str, next: Option<&str>) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let end = next.and_then(|n| rest.find(n)).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Parse a `CAPTION: / DESCRIPTION: / HASHTAGS:` response.
///
/// Returns `None` when no caption could be found.
pub fn parse_response(raw: &str, hashtag_count: u8) -> Option<GeneratedContent> {
    let caption = section(raw, CAPTION_MARKER, Some(DESCRIPTION_MARKER))?.to_string();
    if caption.is_empty() {
        return None;
    }

    let description = section(raw, DESCRIPTION_MARKER, Some(HASHTAGS_MARKER))
        .unwrap_or_default()
        .to_string();

    let hashtags = section(raw, HASHTAGS_MARKER, None)
        .unwrap_or_default()
        .split_whitespace()
        .map(|tag| tag.trim_end_matches([',', '.']))
        .filter(|tag| tag.starts_with('#') && tag.len() > 1)
        .map(str::to_string)
        .take(usize::from(hashtag_count))
        .collect();

    Some(GeneratedContent {
        caption,
        description,
        hashtags,
    })
}

/// Per-platform post variants derived from the generated content.
pub fn platform_variants(content: &GeneratedContent) -> PlatformVariants {
    let tags_line = content.hashtags.join(" ");
    let with_tags = |text: &str| {
        if tags_line.is_empty() {
            text.to_string()
        } else {
            format!("{text}\n\n{tags_line}")
        }
    };

    PlatformVariants {
        instagram: InstagramPost {
            caption: with_tags(&content.caption),
            description: content.description.clone(),
        },
        facebook: FacebookPost {
            caption: content.caption.clone(),
            description: with_tags(&content.description),
        },
        youtube: YoutubePost {
            title: content.caption.clone(),
            description: with_tags(&content.description),
            tags: content
                .hashtags
                .iter()
                .map(|tag| tag.trim_start_matches('#').to_string())
                .collect(),
        },
    }
}
