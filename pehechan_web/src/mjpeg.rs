use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use pehechan::Frame;
use pehechan::core_modules::preprocess::preprocess;
use thiserror::Error;

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("frame buffer does not match a {width}x{height}x{channels} image")]
    BadBuffer { width: u32, height: u32, channels: u8 },
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

fn to_image(frame: &Frame) -> Result<DynamicImage, EncodeError> {
    let bad = || EncodeError::BadBuffer {
        width: frame.width,
        height: frame.height,
        channels: frame.channels,
    };

    match frame.channels {
        1 => GrayImage::from_raw(frame.width, frame.height, frame.data.clone())
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(bad),
        3 => {
            let rgb = preprocess(frame);
            RgbImage::from_raw(rgb.width, rgb.height, rgb.data)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(bad)
        }
        _ => Err(bad()),
    }
}

/// Resizes a captured frame to the display size and encodes it as JPEG.
pub fn encode_display_jpeg(frame: &Frame, width: u32, height: u32, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let mut image = to_image(frame)?;
    if (image.width(), image.height()) != (width, height) {
        image = image.resize_exact(width, height, FilterType::Triangle);
    }

    let mut jpeg = Vec::new();
    image.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, quality))?;
    Ok(jpeg)
}

/// Wraps one JPEG as a `multipart/x-mixed-replace` body part.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(jpeg.len() + 64);
    part.put_slice(b"--");
    part.put_slice(BOUNDARY.as_bytes());
    part.put_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}
