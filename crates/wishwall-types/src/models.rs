use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Upper bound on images attached to a single multi-image post.
pub const MAX_IMAGES_PER_CONTENT: usize = 20;

/// The shape of a post on a wall. Stored as its snake_case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Image,
    TextImage,
    /// Several images shown as a carousel
    Images,
    /// Several images with a caption
    ImagesText,
}

/// How many uploaded files a content type expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRequirement {
    None,
    /// Exactly one file in the `image` field
    Single,
    /// Between 1 and [`MAX_IMAGES_PER_CONTENT`] files in the `images` field
    Multiple,
}

impl ContentType {
    pub const ALL: [ContentType; 5] = [
        ContentType::Text,
        ContentType::Image,
        ContentType::TextImage,
        ContentType::Images,
        ContentType::ImagesText,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::TextImage => "text_image",
            Self::Images => "images",
            Self::ImagesText => "images_text",
        }
    }

    pub fn requires_text(self) -> bool {
        matches!(self, Self::Text | Self::TextImage | Self::ImagesText)
    }

    pub fn image_requirement(self) -> ImageRequirement {
        match self {
            Self::Text => ImageRequirement::None,
            Self::Image | Self::TextImage => ImageRequirement::Single,
            Self::Images | Self::ImagesText => ImageRequirement::Multiple,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownContentType(pub String);

impl fmt::Display for UnknownContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown content type '{}'", self.0)
    }
}

impl std::error::Error for UnknownContentType {}

impl FromStr for ContentType {
    type Err = UnknownContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ct| ct.as_str() == s)
            .ok_or_else(|| UnknownContentType(s.to_string()))
    }
}
