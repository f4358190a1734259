//! MNIST IDX files to an LMDB of [`Datum`]s.
//!
//! IDX layout: big-endian `u32` magic, `u32` item count, then for images
//! `u32` rows and `u32` cols, followed by the raw `u8` payload.

use crate::datum::Datum;
use crate::sources::LmdbWriter;
use log::info;
use netsolve_core::NetsolveError;
use std::fs;
use std::path::Path;

pub const IMAGES_MAGIC: u32 = 0x0000_0803;
pub const LABELS_MAGIC: u32 = 0x0000_0801;

/// Decoded IDX image file.
#[derive(Debug, Clone, PartialEq)]
pub struct IdxImages {
    pub count: usize,
    pub rows: usize,
    pub cols: usize,
    pub pixels: Vec<u8>,
}

impl IdxImages {
    pub fn image(&self, i: usize) -> &[u8] {
        let size = self.rows * self.cols;
        &self.pixels[i * size..(i + 1) * size]
    }
}

fn read_be_u32(data: &[u8], offset: &mut usize) -> Result<u32, NetsolveError> {
    let bytes = data
        .get(*offset..*offset + 4)
        .ok_or_else(|| NetsolveError::Decode("IDX header is truncated".to_string()))?;
    *offset += 4;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn check_magic(found: u32, expected: u32) -> Result<(), NetsolveError> {
    if found != expected {
        return Err(NetsolveError::Decode(format!(
            "IDX magic 0x{:08x}, expected 0x{:08x}",
            found, expected
        )));
    }
    Ok(())
}

pub fn parse_idx_images(data: &[u8]) -> Result<IdxImages, NetsolveError> {
    let mut offset = 0usize;
    check_magic(read_be_u32(data, &mut offset)?, IMAGES_MAGIC)?;
    let count = read_be_u32(data, &mut offset)? as usize;
    let rows = read_be_u32(data, &mut offset)? as usize;
    let cols = read_be_u32(data, &mut offset)? as usize;

    let total = count
        .checked_mul(rows)
        .and_then(|n| n.checked_mul(cols))
        .ok_or_else(|| {
            NetsolveError::Decode(format!("IDX header {}x{}x{} is too large", count, rows, cols))
        })?;
    if data.len() - offset != total {
        return Err(NetsolveError::shape(
            &[count, rows, cols],
            &[data.len() - offset],
            "IDX images payload",
        ));
    }
    Ok(IdxImages {
        count,
        rows,
        cols,
        pixels: data[offset..].to_vec(),
    })
}

pub fn parse_idx_labels(data: &[u8]) -> Result<Vec<u8>, NetsolveError> {
    let mut offset = 0usize;
    check_magic(read_be_u32(data, &mut offset)?, LABELS_MAGIC)?;
    let count = read_be_u32(data, &mut offset)? as usize;
    if data.len() - offset != count {
        return Err(NetsolveError::shape(&[count], &[data.len() - offset], "IDX labels payload"));
    }
    Ok(data[offset..].to_vec())
}

pub fn read_idx_images(path: impl AsRef<Path>) -> Result<IdxImages, NetsolveError> {
    parse_idx_images(&fs::read(path)?)
}

pub fn read_idx_labels(path: impl AsRef<Path>) -> Result<Vec<u8>, NetsolveError> {
    parse_idx_labels(&fs::read(path)?)
}

/// Writes every image as a `1 x rows x cols` datum; returns the record count.
pub fn write_datums(images: &IdxImages, labels: &[u8], writer: &mut LmdbWriter) -> Result<usize, NetsolveError> {
    if images.count != labels.len() {
        return Err(NetsolveError::DimensionMismatch {
            expected: images.count,
            actual: labels.len(),
        });
    }
    for (i, &label) in labels.iter().enumerate() {
        let datum = Datum::from_pixels(1, images.rows, images.cols, images.image(i).to_vec(), label as i32);
        writer.put_datum(i, &datum)?;
    }
    Ok(images.count)
}

/// Converts an MNIST image/label file pair into an LMDB environment at `output`.
pub fn convert_mnist(
    images_path: impl AsRef<Path>,
    labels_path: impl AsRef<Path>,
    output: impl AsRef<Path>,
    map_size: usize,
) -> Result<usize, NetsolveError> {
    let images = read_idx_images(images_path)?;
    let labels = read_idx_labels(labels_path)?;
    info!(
        "Converting {} images of {}x{} into {}",
        images.count,
        images.rows,
        images.cols,
        output.as_ref().display()
    );
    let mut writer = LmdbWriter::create(output, map_size)?;
    write_datums(&images, &labels, &mut writer)?;
    let written = writer.finish()?;
    info!("Wrote {} records", written);
    Ok(written)
}
