//! Value types produced by face detection: bounding boxes and identity embeddings

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of components in every face embedding.
pub const EMBEDDING_DIMENSION: usize = 128;

/// Size in bytes of a serialized embedding (128 native-endian `f64`s).
pub const EMBEDDING_BYTES: usize = EMBEDDING_DIMENSION * std::mem::size_of::<f64>();

/// A 128-dimensional face identity vector.
///
/// The length is checked on construction, so every `FaceEmbedding` in the system can be
/// compared against every other one without further validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct FaceEmbedding(Vec<f64>);

impl FaceEmbedding {
    /// Wraps a vector, rejecting anything that is not exactly [`EMBEDDING_DIMENSION`] long.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.len() != EMBEDDING_DIMENSION {
            return Err(EmbedError::InvalidEmbedding {
                len: values.len(),
                expected: EMBEDDING_DIMENSION,
            });
        }
        Ok(Self(values))
    }

    /// Decodes the blob layout used by the index store.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != EMBEDDING_BYTES {
            return Err(EmbedError::InvalidEmbedding {
                len: bytes.len() / std::mem::size_of::<f64>(),
                expected: EMBEDDING_DIMENSION,
            });
        }
        // Blobs from sqlite carry no alignment guarantee, so read each value unaligned.
        Self::new(
            bytes
                .chunks_exact(std::mem::size_of::<f64>())
                .map(bytemuck::pod_read_unaligned::<f64>)
                .collect(),
        )
    }

    /// Native-endian byte representation, 8 bytes per component.
    pub fn to_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice::<f64, u8>(&self.0).to_vec()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Euclidean (L2) distance, the metric face encoders are trained against.
    pub fn euclidean_distance(&self, other: &FaceEmbedding) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt()
    }
}

impl TryFrom<Vec<f64>> for FaceEmbedding {
    type Error = EmbedError;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        Self::new(values)
    }
}

impl From<FaceEmbedding> for Vec<f64> {
    fn from(embedding: FaceEmbedding) -> Self {
        embedding.0
    }
}

/// Face location in pixel coordinates, in `(top, right, bottom, left)` order.
///
/// Only used for display; matching never looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl BoundingBox {
    pub fn new(top: i32, right: i32, bottom: i32, left: i32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from([top, right, bottom, left]: [i32; 4]) -> Self {
        Self::new(top, right, bottom, left)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.top, self.right, self.bottom, self.left)
    }
}

impl FromStr for BoundingBox {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let fields = s
            .split(',')
            .map(|field| field.trim().parse::<i32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| format!("Invalid bounding box '{s}': {e}"))?;

        match fields.as_slice() {
            [top, right, bottom, left] => Ok(Self::new(*top, *right, *bottom, *left)),
            _ => Err(format!(
                "Invalid bounding box '{s}': expected 4 fields, got {}",
                fields.len()
            )),
        }
    }
}

/// One detected face: where it is and who it looks like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bounding_box: BoundingBox,
    pub embedding: FaceEmbedding,
}

impl FaceDetection {
    pub fn new(bounding_box: BoundingBox, embedding: FaceEmbedding) -> Self {
        Self {
            bounding_box,
            embedding,
        }
    }
}
