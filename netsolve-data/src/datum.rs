//! The serialized record stored in the database.
//!
//! Wire layout (protobuf, proto2):
//!
//! ```text
//! message Datum {
//!   optional int32 channels = 1;
//!   optional int32 height = 2;
//!   optional int32 width = 3;
//!   optional bytes data = 4;       // uint8 pixels, c-major
//!   optional int32 label = 5;
//!   repeated float float_data = 6; // used when `data` is absent
//!   optional bool encoded = 7 [default = false];
//! }
//! ```

use netsolve_core::NetsolveError;
use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct Datum {
    #[prost(int32, optional, tag = "1")]
    pub channels: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub height: Option<i32>,
    #[prost(int32, optional, tag = "3")]
    pub width: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub data: Option<Vec<u8>>,
    #[prost(int32, optional, tag = "5")]
    pub label: Option<i32>,
    #[prost(float, repeated, packed = "false", tag = "6")]
    pub float_data: Vec<f32>,
    #[prost(bool, optional, tag = "7", default = "false")]
    pub encoded: Option<bool>,
}

impl Datum {
    /// A raw-pixel datum, as written by dataset converters.
    pub fn from_pixels(channels: usize, height: usize, width: usize, pixels: Vec<u8>, label: i32) -> Self {
        Datum {
            channels: Some(channels as i32),
            height: Some(height as i32),
            width: Some(width as i32),
            data: Some(pixels),
            label: Some(label),
            float_data: Vec::new(),
            encoded: Some(false),
        }
    }

    /// A datum carrying float values instead of bytes.
    pub fn from_floats(channels: usize, height: usize, width: usize, values: Vec<f32>, label: i32) -> Self {
        Datum {
            channels: Some(channels as i32),
            height: Some(height as i32),
            width: Some(width as i32),
            data: None,
            label: Some(label),
            float_data: values,
            encoded: None,
        }
    }

    pub fn decode_record(bytes: &[u8]) -> Result<Self, NetsolveError> {
        Datum::decode(bytes).map_err(|e| NetsolveError::Decode(format!("Datum: {}", e)))
    }

    pub fn encode_record(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// `[channels, height, width]`.
    pub fn shape(&self) -> Result<[usize; 3], NetsolveError> {
        let dims = [self.channels(), self.height(), self.width()];
        if dims.iter().any(|&d| d < 0) {
            return Err(NetsolveError::Decode(format!("Datum: negative dimension in {:?}", dims)));
        }
        Ok([dims[0] as usize, dims[1] as usize, dims[2] as usize])
    }

    /// The sample values in `[c, h, w]` order, before any transform.
    ///
    /// # Errors
    /// `UnsupportedRecord` for encoded (compressed image) datums,
    /// `ShapeMismatch` if the payload does not hold `c * h * w` values.
    pub fn values(&self) -> Result<Vec<f32>, NetsolveError> {
        if self.encoded() {
            return Err(NetsolveError::UnsupportedRecord(
                "encoded datum; decode images before writing them to the database".to_string(),
            ));
        }
        let shape = self.shape()?;
        let count = shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| NetsolveError::Decode(format!("Datum: shape {:?} is too large", shape)))?;
        let bytes = self.data();
        let values: Vec<f32> = if !bytes.is_empty() {
            bytes.iter().map(|&b| b as f32).collect()
        } else {
            self.float_data.clone()
        };
        if values.len() != count {
            return Err(NetsolveError::shape(&shape, &[values.len()], "Datum::values"));
        }
        Ok(values)
    }
}

#[cfg(test)]
#[path = "datum_test.rs"]
mod tests;
