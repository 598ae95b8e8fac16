// src/core/object/transforms.rs

//! Transform operations and the ordered chain applied to a parent image.

use serde::{Deserialize, Serialize};
use std::io::Cursor;
use strum_macros::{Display, EnumString};

/// Seed for the chain fingerprint hash.
const FINGERPRINT_SEED: u32 = 0;

/// Where a crop anchors inside the source image.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Gravity {
    #[default]
    Center,
    North,
    South,
    East,
    West,
    Smart,
}

/// Output encodings the engine can be asked for.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Gif => "image/gif",
        }
    }
}

/// One image operation with its parameters.
///
/// The serde encoding doubles as the wire format handed to the processing
/// engine and as the preset syntax in the config file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Transform {
    Rotate {
        angle: u16,
    },
    Blur {
        sigma: f32,
    },
    Grayscale,
    Resize {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    Crop {
        width: u32,
        height: u32,
        #[serde(default)]
        gravity: Gravity,
    },
    Extract {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    ResizeCropAuto {
        width: u32,
        height: u32,
    },
    Watermark {
        image: String,
        position: String,
        opacity: f32,
    },
    Format {
        format: ImageFormat,
    },
}

/// An ordered list of operations, applied parent-to-child on root bytes.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct TransformChain(Vec<Transform>);

impl TransformChain {
    pub fn new(transforms: Vec<Transform>) -> Self {
        Self(transforms)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, transform: Transform) {
        self.0.push(transform);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transform> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Transform] {
        &self.0
    }

    /// A stable 64-bit fingerprint of the ordered chain.
    ///
    /// Used to key placeholder cache entries and to name derived artifacts,
    /// so identical chains on different originals share both.
    pub fn fingerprint(&self) -> u64 {
        let encoded = serde_json::to_vec(&self.0).expect("transform chain serializes");
        murmur3::murmur3_x64_128(&mut Cursor::new(&encoded), FINGERPRINT_SEED).unwrap() as u64
    }

    /// The fingerprint rendered as fixed-width hex.
    pub fn fingerprint_hex(&self) -> String {
        format!("{:016x}", self.fingerprint())
    }
}

impl From<Vec<Transform>> for TransformChain {
    fn from(transforms: Vec<Transform>) -> Self {
        Self(transforms)
    }
}

impl<'a> IntoIterator for &'a TransformChain {
    type Item = &'a Transform;
    type IntoIter = std::slice::Iter<'a, Transform>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
