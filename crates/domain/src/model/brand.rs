use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};
use thiserror::Error;

use crate::storage::{Fields, StorageResult};

use super::{optional_field, parse_field};

/// Longest accepted reveal instruction text, in characters.
pub const MAX_INSTRUCTIONS_LENGTH: usize = 500;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FontFamily {
    #[default]
    Sans,
    Serif,
    Mono,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CornerStyle {
    #[default]
    Rounded,
    Pill,
    Square,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrandError {
    #[error("Invalid primary color")]
    InvalidColor,
    #[error("Unknown font family")]
    UnknownFont,
    #[error("Unknown corner style")]
    UnknownCornerStyle,
    #[error("Instructions must be {MAX_INSTRUCTIONS_LENGTH} characters or fewer")]
    InstructionsTooLong,
}

/// Look and feel applied to secrets served from a custom domain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BrandSettings {
    pub primary_color: Option<String>,
    pub font_family: FontFamily,
    pub corner_style: CornerStyle,
    pub button_text_light: bool,
    pub allow_public_homepage: bool,
    pub instructions_pre_reveal: Option<String>,
    pub instructions_post_reveal: Option<String>,
}

/// Partial update submitted by the customer. Keys not listed here are
/// dropped during deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandUpdate {
    pub primary_color: Option<String>,
    pub font_family: Option<String>,
    pub corner_style: Option<String>,
    pub button_text_light: Option<bool>,
    pub allow_public_homepage: Option<bool>,
    pub instructions_pre_reveal: Option<String>,
    pub instructions_post_reveal: Option<String>,
}

impl BrandUpdate {
    /// Validates every supplied value without applying anything.
    pub fn validate(&self) -> Result<(), BrandError> {
        if let Some(color) = &self.primary_color {
            normalize_color(color)?;
        }
        if let Some(font) = &self.font_family {
            font.trim()
                .parse::<FontFamily>()
                .map_err(|_| BrandError::UnknownFont)?;
        }
        if let Some(style) = &self.corner_style {
            style
                .trim()
                .parse::<CornerStyle>()
                .map_err(|_| BrandError::UnknownCornerStyle)?;
        }
        for text in [&self.instructions_pre_reveal, &self.instructions_post_reveal]
            .into_iter()
            .flatten()
        {
            if text.trim().chars().count() > MAX_INSTRUCTIONS_LENGTH {
                return Err(BrandError::InstructionsTooLong);
            }
        }
        Ok(())
    }
}

impl BrandSettings {
    /// Merges `update` into the current settings. Empty strings clear the
    /// optional text values.
    pub fn apply(&mut self, update: &BrandUpdate) -> Result<(), BrandError> {
        update.validate()?;

        if let Some(color) = &update.primary_color {
            self.primary_color = Some(normalize_color(color)?);
        }
        if let Some(font) = &update.font_family {
            self.font_family = font.trim().parse().map_err(|_| BrandError::UnknownFont)?;
        }
        if let Some(style) = &update.corner_style {
            self.corner_style = style
                .trim()
                .parse()
                .map_err(|_| BrandError::UnknownCornerStyle)?;
        }
        if let Some(light) = update.button_text_light {
            self.button_text_light = light;
        }
        if let Some(allow) = update.allow_public_homepage {
            self.allow_public_homepage = allow;
        }
        if let Some(text) = &update.instructions_pre_reveal {
            self.instructions_pre_reveal = non_empty(text);
        }
        if let Some(text) = &update.instructions_post_reveal {
            self.instructions_post_reveal = non_empty(text);
        }
        Ok(())
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::from([
            (
                "font_family".to_string(),
                self.font_family.as_ref().to_string(),
            ),
            (
                "corner_style".to_string(),
                self.corner_style.as_ref().to_string(),
            ),
            (
                "button_text_light".to_string(),
                self.button_text_light.to_string(),
            ),
            (
                "allow_public_homepage".to_string(),
                self.allow_public_homepage.to_string(),
            ),
        ]);
        let optional = [
            ("primary_color", &self.primary_color),
            ("instructions_pre_reveal", &self.instructions_pre_reveal),
            ("instructions_post_reveal", &self.instructions_post_reveal),
        ];
        for (name, value) in optional {
            fields.insert(name.to_string(), value.clone().unwrap_or_default());
        }
        fields
    }

    pub fn from_fields(fields: &Fields) -> StorageResult<Self> {
        Ok(Self {
            primary_color: optional_field(fields, "primary_color"),
            font_family: parse_field(fields, "font_family")?,
            corner_style: parse_field(fields, "corner_style")?,
            button_text_light: parse_field(fields, "button_text_light")?,
            allow_public_homepage: parse_field(fields, "allow_public_homepage")?,
            instructions_pre_reveal: optional_field(fields, "instructions_pre_reveal"),
            instructions_post_reveal: optional_field(fields, "instructions_post_reveal"),
        })
    }
}

/// Accepts `#rgb` and `#rrggbb`, returning the lowercase six-digit form.
fn normalize_color(input: &str) -> Result<String, BrandError> {
    let hex = input
        .trim()
        .strip_prefix('#')
        .ok_or(BrandError::InvalidColor)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BrandError::InvalidColor);
    }
    let hex = hex.to_ascii_lowercase();
    match hex.len() {
        3 => Ok(format!(
            "#{}",
            hex.chars().flat_map(|c| [c, c]).collect::<String>()
        )),
        6 => Ok(format!("#{hex}")),
        _ => Err(BrandError::InvalidColor),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
