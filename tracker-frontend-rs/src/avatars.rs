//! The built-in avatar set. Avatars are small inline SVGs, served as data URIs so they work offline.

use serde::{Deserialize, Deserializer};

#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AvatarId {
    #[default]
    #[serde(rename = "ghibli-1")]
    Ghibli1,
    #[serde(rename = "ghibli-2")]
    Ghibli2,
    #[serde(rename = "ghibli-3")]
    Ghibli3,
    #[serde(rename = "ghibli-4")]
    Ghibli4,
    #[serde(rename = "ghibli-5")]
    Ghibli5,
    #[serde(rename = "ghibli-6")]
    Ghibli6,
}

/// Every avatar, in cycling order.
pub const AVATARS: [AvatarId; 6] = [
    AvatarId::Ghibli1,
    AvatarId::Ghibli2,
    AvatarId::Ghibli3,
    AvatarId::Ghibli4,
    AvatarId::Ghibli5,
    AvatarId::Ghibli6,
];

impl AvatarId {
    pub fn as_str(self) -> &'static str {
        match self {
            AvatarId::Ghibli1 => "ghibli-1",
            AvatarId::Ghibli2 => "ghibli-2",
            AvatarId::Ghibli3 => "ghibli-3",
            AvatarId::Ghibli4 => "ghibli-4",
            AvatarId::Ghibli5 => "ghibli-5",
            AvatarId::Ghibli6 => "ghibli-6",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        AVATARS.into_iter().find(|avatar| avatar.as_str() == raw)
    }

    pub fn index(self) -> usize {
        AVATARS
            .iter()
            .position(|avatar| *avatar == self)
            .unwrap_or_default()
    }

    /// The next avatar in the cycle, wrapping around after the last one.
    pub fn next(self) -> Self {
        AVATARS[(self.index() + 1) % AVATARS.len()]
    }

    pub fn name(self) -> &'static str {
        match self {
            AvatarId::Ghibli1 => "Breeze",
            AvatarId::Ghibli2 => "Forest",
            AvatarId::Ghibli3 => "Sky",
            AvatarId::Ghibli4 => "Tea",
            AvatarId::Ghibli5 => "Moss",
            AvatarId::Ghibli6 => "Moon",
        }
    }

    pub fn svg(self) -> &'static str {
        match self {
            AvatarId::Ghibli1 => BREEZE_SVG,
            AvatarId::Ghibli2 => FOREST_SVG,
            AvatarId::Ghibli3 => SKY_SVG,
            AvatarId::Ghibli4 => TEA_SVG,
            AvatarId::Ghibli5 => MOSS_SVG,
            AvatarId::Ghibli6 => MOON_SVG,
        }
    }
}

// Unknown ids (hand edited caches, newer clients) fall back to the first avatar instead of failing the whole record.
impl<'de> Deserialize<'de> for AvatarId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(AvatarId::parse(&raw).unwrap_or_else(|| {
            log::warn!("Unknown avatar id {raw:?}, using {}", AvatarId::default().as_str());
            AvatarId::default()
        }))
    }
}

/// Data URI of a built-in avatar.
pub fn avatar_url(id: AvatarId) -> String {
    format!(
        "data:image/svg+xml;utf8,{}",
        urlencoding::encode(id.svg().trim())
    )
}

/// The image to show for a profile: its custom picture if it has one, else its built-in avatar.
pub fn resolve_avatar(id: AvatarId, custom: Option<&str>) -> String {
    match custom {
        Some(custom) if !custom.is_empty() => custom.to_string(),
        _ => avatar_url(id),
    }
}

const BREEZE_SVG: &str = r##"
<svg xmlns="http://www.w3.org/2000/svg" width="160" height="160" viewBox="0 0 160 160">
  <defs>
    <linearGradient id="g" x1="0" y1="0" x2="1" y2="1">
      <stop offset="0" stop-color="#F6F1E7"/>
      <stop offset="1" stop-color="#B7D3C6"/>
    </linearGradient>
  </defs>
  <rect width="160" height="160" rx="48" fill="url(#g)"/>
  <circle cx="80" cy="76" r="34" fill="#2F3A33" opacity="0.12"/>
  <path d="M30 118c18-22 34-28 50-28s32 6 50 28" fill="none" stroke="#2F3A33" stroke-width="10" stroke-linecap="round" opacity="0.18"/>
  <path d="M52 66c8-10 20-16 28-16s20 6 28 16" fill="none" stroke="#2F3A33" stroke-width="8" stroke-linecap="round" opacity="0.20"/>
  <path d="M58 78c6 8 14 12 22 12s16-4 22-12" fill="none" stroke="#2F3A33" stroke-width="8" stroke-linecap="round" opacity="0.18"/>
</svg>
"##;

const FOREST_SVG: &str = r##"
<svg xmlns="http://www.w3.org/2000/svg" width="160" height="160" viewBox="0 0 160 160">
  <rect width="160" height="160" rx="48" fill="#E9F1EA"/>
  <circle cx="52" cy="60" r="22" fill="#5F7C6B" opacity="0.20"/>
  <circle cx="106" cy="58" r="18" fill="#5F7C6B" opacity="0.18"/>
  <path d="M34 120c20-26 38-34 46-34s26 8 46 34" fill="none" stroke="#3A4A40" stroke-width="10" stroke-linecap="round" opacity="0.18"/>
  <path d="M54 70c6-6 14-10 26-10s20 4 26 10" fill="none" stroke="#3A4A40" stroke-width="8" stroke-linecap="round" opacity="0.18"/>
  <path d="M62 86c10 10 26 10 36 0" fill="none" stroke="#3A4A40" stroke-width="8" stroke-linecap="round" opacity="0.15"/>
</svg>
"##;

const SKY_SVG: &str = r##"
<svg xmlns="http://www.w3.org/2000/svg" width="160" height="160" viewBox="0 0 160 160">
  <defs>
    <linearGradient id="s" x1="0" y1="0" x2="0" y2="1">
      <stop offset="0" stop-color="#E9F2FF"/>
      <stop offset="1" stop-color="#F6F1E7"/>
    </linearGradient>
  </defs>
  <rect width="160" height="160" rx="48" fill="url(#s)"/>
  <path d="M30 58c10-12 26-16 38-10 12-6 28-2 36 10 10-6 22-4 26 6-4 12-16 18-30 14-10 10-26 12-40 4-16 8-34 4-42-10-10 2-18-2-22-8 2-4 6-6 10-6z" fill="#2D3A55" opacity="0.10"/>
  <path d="M34 122c20-24 38-32 46-32s26 8 46 32" fill="none" stroke="#2D3A55" stroke-width="10" stroke-linecap="round" opacity="0.16"/>
</svg>
"##;

const TEA_SVG: &str = r##"
<svg xmlns="http://www.w3.org/2000/svg" width="160" height="160" viewBox="0 0 160 160">
  <rect width="160" height="160" rx="48" fill="#F6F1E7"/>
  <circle cx="80" cy="76" r="38" fill="#7A5A44" opacity="0.10"/>
  <path d="M44 60c8-10 18-14 36-14s28 4 36 14" fill="none" stroke="#7A5A44" stroke-width="8" stroke-linecap="round" opacity="0.18"/>
  <path d="M44 120c18-22 34-28 36-28s18 6 36 28" fill="none" stroke="#7A5A44" stroke-width="10" stroke-linecap="round" opacity="0.18"/>
  <path d="M66 82c8 8 20 8 28 0" fill="none" stroke="#7A5A44" stroke-width="8" stroke-linecap="round" opacity="0.14"/>
</svg>
"##;

const MOSS_SVG: &str = r##"
<svg xmlns="http://www.w3.org/2000/svg" width="160" height="160" viewBox="0 0 160 160">
  <rect width="160" height="160" rx="48" fill="#EAF3ED"/>
  <path d="M22 104c18-18 34-22 46-16 12-10 30-12 44-2 10-8 22-8 28 0 6 10 2 22-8 28-14 8-36 10-58 0-16 10-38 8-52-10z" fill="#2F3A33" opacity="0.10"/>
  <path d="M36 122c20-24 38-32 44-32s24 8 44 32" fill="none" stroke="#2F3A33" stroke-width="10" stroke-linecap="round" opacity="0.16"/>
</svg>
"##;

const MOON_SVG: &str = r##"
<svg xmlns="http://www.w3.org/2000/svg" width="160" height="160" viewBox="0 0 160 160">
  <rect width="160" height="160" rx="48" fill="#F2F0FF"/>
  <path d="M110 52c-10 2-18 10-20 20-2 12 6 24 18 26-12 8-30 4-38-10-10-18 2-40 22-44 6-2 12-2 18 0z" fill="#2D2740" opacity="0.10"/>
  <path d="M38 122c20-24 38-32 44-32s24 8 44 32" fill="none" stroke="#2D2740" stroke-width="10" stroke-linecap="round" opacity="0.16"/>
</svg>
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_six_cycles_return_to_start() {
        for start in AVATARS {
            let mut avatar = start;
            for _ in 0..AVATARS.len() {
                avatar = avatar.next();
            }
            assert_eq!(avatar, start, "cycling from {}", start.as_str());
        }
        assert_eq!(AvatarId::Ghibli6.next(), AvatarId::Ghibli1);
    }

    #[test]
    fn test_unknown_avatar_id_decodes_as_first() {
        let avatar: AvatarId = serde_json::from_str("\"totoro\"").unwrap();
        assert_eq!(avatar, AvatarId::Ghibli1);
        let avatar: AvatarId = serde_json::from_str("\"ghibli-4\"").unwrap();
        assert_eq!(avatar, AvatarId::Ghibli4);
    }

    #[test]
    fn test_avatar_url_is_percent_encoded_svg() {
        let url = avatar_url(AvatarId::Ghibli3);
        assert!(url.starts_with("data:image/svg+xml;utf8,%3Csvg"));
        assert!(!url.contains(' '));
        assert!(!url.contains('#'), "fragment characters must be escaped");
    }

    #[test]
    fn test_custom_avatar_wins_when_present() {
        assert_eq!(
            resolve_avatar(AvatarId::Ghibli2, Some("data:image/webp;base64,AAAA")),
            "data:image/webp;base64,AAAA"
        );
        assert_eq!(
            resolve_avatar(AvatarId::Ghibli2, Some("")),
            avatar_url(AvatarId::Ghibli2)
        );
        assert_eq!(resolve_avatar(AvatarId::Ghibli2, None), avatar_url(AvatarId::Ghibli2));
    }
}
