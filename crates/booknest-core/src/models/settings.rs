use serde::{Deserialize, Serialize};

use super::check_len;
use crate::{BookNestError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomFont {
    pub name: String,
    pub url: String,
}

/// Site-wide settings; a single document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteSettings {
    pub site_name: String,
    pub logo: String,
    pub banner: String,
    pub comment_enabled: bool,
    pub comment_pre_approval: bool,
    pub default_font: String,
    pub default_font_size: u32,
    pub default_night_mode: bool,
    pub custom_fonts: Vec<CustomFont>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "Your Book".to_string(),
            logo: "/logo.png".to_string(),
            banner: "/banner.jpg".to_string(),
            comment_enabled: true,
            comment_pre_approval: false,
            default_font: "Inter".to_string(),
            default_font_size: 18,
            default_night_mode: false,
            custom_fonts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub site_name: Option<String>,
    pub logo: Option<String>,
    pub banner: Option<String>,
    pub comment_enabled: Option<bool>,
    pub comment_pre_approval: Option<bool>,
    pub default_font: Option<String>,
    pub default_font_size: Option<u32>,
    pub default_night_mode: Option<bool>,
    pub custom_fonts: Option<Vec<CustomFont>>,
}

impl SiteSettings {
    pub fn apply(&mut self, patch: SettingsPatch) -> Result<()> {
        if let Some(name) = patch.site_name {
            check_len("siteName", &name, 255)?;
            self.site_name = name;
        }
        if let Some(size) = patch.default_font_size {
            if !(8..=72).contains(&size) {
                return Err(BookNestError::validation(
                    "defaultFontSize must be between 8 and 72",
                ));
            }
            self.default_font_size = size;
        }
        if let Some(fonts) = patch.custom_fonts {
            if fonts.iter().any(|f| f.name.trim().is_empty() || f.url.trim().is_empty()) {
                return Err(BookNestError::validation("custom fonts need a name and a url"));
            }
            self.custom_fonts = fonts;
        }
        if let Some(logo) = patch.logo {
            self.logo = logo;
        }
        if let Some(banner) = patch.banner {
            self.banner = banner;
        }
        if let Some(font) = patch.default_font {
            self.default_font = font;
        }
        if let Some(v) = patch.comment_enabled {
            self.comment_enabled = v;
        }
        if let Some(v) = patch.comment_pre_approval {
            self.comment_pre_approval = v;
        }
        if let Some(v) = patch.default_night_mode {
            self.default_night_mode = v;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_merges_only_given_fields() {
        let mut settings = SiteSettings::default();
        let patch: SettingsPatch =
            serde_json::from_str(r#"{"siteName":"Truyện Hay","commentPreApproval":true}"#).unwrap();
        settings.apply(patch).unwrap();
        assert_eq!(settings.site_name, "Truyện Hay");
        assert!(settings.comment_pre_approval);
        assert_eq!(settings.default_font_size, 18);
    }

    #[test]
    fn font_size_is_checked() {
        let mut settings = SiteSettings::default();
        let patch = SettingsPatch {
            default_font_size: Some(2),
            ..Default::default()
        };
        assert!(settings.apply(patch).is_err());
    }
}
