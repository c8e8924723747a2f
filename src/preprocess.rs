//! Image preprocessing for interpreters that consume pixels.
//!
//! Decodes a validation JPEG, takes a central crop, resizes it bilinearly to
//! the model input size and converts it to the model's input element type.
//!
//! # Example
//!
//! ```ignore
//! use ilsvrc_eval::preprocess::preprocess_image;
//! use ilsvrc_eval::runtime::{InputSpec, InputType};
//!
//! let spec = InputSpec {
//!     width: 224,
//!     height: 224,
//!     input_type: InputType::float_symmetric(),
//! };
//! let tensor = preprocess_image(path, &spec)?;
//! ```

use std::path::Path;

use imgref::{ImgRef, ImgVec};
use rgb::RGB8;

use crate::error::{Error, Result};
use crate::runtime::{InputSpec, InputType};

/// Fraction of each side kept by the central crop.
pub const DEFAULT_CROPPING_FRACTION: f32 = 0.875;

/// Input element buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum InputData {
    /// Normalized floats.
    Float32(Vec<f32>),
    /// Raw channels.
    Uint8(Vec<u8>),
    /// Channels shifted by -128.
    Int8(Vec<i8>),
}

/// A preprocessed NHWC RGB input with batch size 1.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// `width * height * 3` elements.
    pub data: InputData,
}

/// Decode JPEG data to RGB8.
#[cfg(feature = "jpeg-decode")]
pub fn decode_jpeg(data: &[u8]) -> Result<ImgVec<RGB8>> {
    use std::io::Cursor;

    let mut decoder = jpeg_decoder::Decoder::new(Cursor::new(data));
    let pixels = decoder
        .decode()
        .map_err(|e| Error::Interpreter(format!("jpeg-decoder: {e}")))?;

    let info = decoder
        .info()
        .ok_or_else(|| Error::Interpreter("Missing JPEG info after decode".to_string()))?;

    let width = info.width as usize;
    let height = info.height as usize;

    let rgb: Vec<RGB8> = match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => pixels
            .chunks_exact(3)
            .map(|c| RGB8::new(c[0], c[1], c[2]))
            .collect(),
        jpeg_decoder::PixelFormat::L8 => pixels.iter().map(|&g| RGB8::new(g, g, g)).collect(),
        // 16-bit grayscale, big endian: keep the high byte
        jpeg_decoder::PixelFormat::L16 => pixels
            .chunks_exact(2)
            .map(|c| RGB8::new(c[0], c[0], c[0]))
            .collect(),
        jpeg_decoder::PixelFormat::CMYK32 => {
            return Err(Error::Interpreter("CMYK JPEGs are not supported".to_string()));
        }
    };

    if rgb.len() != width * height {
        return Err(Error::Interpreter(format!(
            "Decoded {} pixels for a {}x{} image",
            rgb.len(),
            width,
            height
        )));
    }

    Ok(ImgVec::new(rgb, width, height))
}

/// Read and decode an image file.
pub fn load_image(path: &Path) -> Result<ImgVec<RGB8>> {
    let data = std::fs::read(path).map_err(|e| Error::ImageLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    decode(&data).map_err(|e| Error::ImageLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(feature = "jpeg-decode")]
fn decode(data: &[u8]) -> Result<ImgVec<RGB8>> {
    decode_jpeg(data)
}

#[cfg(not(feature = "jpeg-decode"))]
fn decode(_data: &[u8]) -> Result<ImgVec<RGB8>> {
    Err(Error::Interpreter("built without the jpeg-decode feature".to_string()))
}

/// An image with no pixels.
fn empty(width: usize, height: usize) -> ImgVec<RGB8> {
    ImgVec::new_stride(Vec::new(), width, height, width.max(1))
}

/// Keep the central `fraction` of each side. An empty source is returned
/// unchanged.
#[must_use]
pub fn central_crop(img: ImgRef<'_, RGB8>, fraction: f32) -> ImgVec<RGB8> {
    if img.width() == 0 || img.height() == 0 {
        return empty(img.width(), img.height());
    }
    let fraction = fraction.clamp(0.0, 1.0);
    let crop_w = ((img.width() as f32 * fraction).round() as usize).clamp(1, img.width());
    let crop_h = ((img.height() as f32 * fraction).round() as usize).clamp(1, img.height());
    let left = (img.width() - crop_w) / 2;
    let top = (img.height() - crop_h) / 2;

    let sub = img.sub_image(left, top, crop_w, crop_h);
    ImgVec::new(sub.pixels().collect(), crop_w, crop_h)
}

/// Bilinear resize with half-pixel centers.
///
/// An empty target gives an empty image; an empty source gives black pixels.
#[must_use]
pub fn resize_bilinear(img: ImgRef<'_, RGB8>, width: usize, height: usize) -> ImgVec<RGB8> {
    if width == 0 || height == 0 {
        return empty(width, height);
    }
    if img.width() == 0 || img.height() == 0 {
        return ImgVec::new(vec![RGB8::default(); width * height], width, height);
    }
    if img.width() == width && img.height() == height {
        return ImgVec::new(img.pixels().collect(), width, height);
    }

    let scale_x = img.width() as f32 / width as f32;
    let scale_y = img.height() as f32 / height as f32;
    let max_x = img.width() - 1;
    let max_y = img.height() - 1;

    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        let sy = ((y as f32 + 0.5) * scale_y - 0.5).max(0.0);
        let y0 = (sy.floor() as usize).min(max_y);
        let y1 = (y0 + 1).min(max_y);
        let fy = sy - y0 as f32;

        for x in 0..width {
            let sx = ((x as f32 + 0.5) * scale_x - 0.5).max(0.0);
            let x0 = (sx.floor() as usize).min(max_x);
            let x1 = (x0 + 1).min(max_x);
            let fx = sx - x0 as f32;

            let p00 = img[(x0, y0)];
            let p10 = img[(x1, y0)];
            let p01 = img[(x0, y1)];
            let p11 = img[(x1, y1)];

            let lerp = |a: u8, b: u8, c: u8, d: u8| -> u8 {
                let top = f32::from(a) + (f32::from(b) - f32::from(a)) * fx;
                let bottom = f32::from(c) + (f32::from(d) - f32::from(c)) * fx;
                (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8
            };

            out.push(RGB8::new(
                lerp(p00.r, p10.r, p01.r, p11.r),
                lerp(p00.g, p10.g, p01.g, p11.g),
                lerp(p00.b, p10.b, p01.b, p11.b),
            ));
        }
    }

    ImgVec::new(out, width, height)
}

/// Convert pixels to the model's input element type.
#[must_use]
pub fn to_input_tensor(img: ImgRef<'_, RGB8>, input_type: InputType) -> InputTensor {
    let channels = img.pixels().flat_map(|p| [p.r, p.g, p.b]);
    let data = match input_type {
        InputType::Float32 { mean, scale } => {
            InputData::Float32(channels.map(|c| (f32::from(c) - mean) * scale).collect())
        }
        InputType::Uint8 => InputData::Uint8(channels.collect()),
        InputType::Int8 => InputData::Int8(channels.map(|c| (i16::from(c) - 128) as i8).collect()),
    };
    InputTensor {
        width: img.width(),
        height: img.height(),
        data,
    }
}

/// Full pipeline: load, crop, resize, convert.
pub fn preprocess_image(path: &Path, spec: &InputSpec) -> Result<InputTensor> {
    if spec.width == 0 || spec.height == 0 {
        return Err(Error::InvalidConfig(format!(
            "Model input size {}x{} is empty",
            spec.width, spec.height
        )));
    }
    let image = load_image(path)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::ImageLoad {
            path: path.to_path_buf(),
            reason: "empty image".to_string(),
        });
    }
    let cropped = central_crop(image.as_ref(), DEFAULT_CROPPING_FRACTION);
    let resized = resize_bilinear(cropped.as_ref(), spec.width, spec.height);
    Ok(to_input_tensor(resized.as_ref(), spec.input_type))
}

/// Write a JPEG whose left half is `left` and right half is `right`.
#[cfg(test)]
pub(crate) fn write_split_jpeg(path: &Path, width: u16, height: u16, left: RGB8, right: RGB8) {
    let pixels: Vec<u8> = (0..height)
        .flat_map(|_| (0..width).map(|x| if x < width / 2 { left } else { right }))
        .flat_map(|p| [p.r, p.g, p.b])
        .collect();
    jpeg_encoder::Encoder::new_file(path, 95)
        .unwrap()
        .encode(&pixels, width, height, jpeg_encoder::ColorType::Rgb)
        .unwrap();
}
