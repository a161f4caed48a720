// THEORY:
// The `Frame` module is the most fundamental unit of the analysis system. It is a
// "dumb" data container for one captured image: a packed 8-bit buffer plus the
// shape needed to interpret it. Everything that reasons about a whole image
// (quality heuristics, channel reordering, model requests) takes a `Frame`.
//
// Key architectural principles:
// 1.  **Capture-native layout**: Cameras hand us interleaved BGR rows. The frame
//     records the channel order explicitly instead of assuming it, so a frame
//     can travel from the capture layer to the model without a hidden swap.
// 2.  **Plain ownership**: A frame is moved through one validation + analysis
//     cycle and then dropped. There is no pooling and no shared mutation.
// 3.  **Single-image heuristics**: Grayscale projection and the Laplacian edge
//     response live here because they only need this frame's pixels.

/// Channel layout of a 3-channel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    /// Native order of the capture library.
    Bgr,
    /// Order the analysis model expects.
    Rgb,
}

/// An owned, interleaved 8-bit image.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Width of the image in pixels.
    pub width: u32,
    /// Height of the image in pixels.
    pub height: u32,
    /// 1 for grayscale, 3 for color.
    pub channels: u8,
    /// Meaningful only when `channels == 3`.
    pub order: ChannelOrder,
    /// Row-major pixel bytes, `width * height * channels` long.
    pub data: Vec<u8>,
}

// ITU-R BT.601 luma weights.
const LUMA_R: f64 = 0.299;
const LUMA_G: f64 = 0.587;
const LUMA_B: f64 = 0.114;

impl Frame {
    pub fn new(width: u32, height: u32, channels: u8, order: ChannelOrder, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            order,
            data,
        }
    }

    /// A color frame in the capture library's native order.
    pub fn bgr(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self::new(width, height, 3, ChannelOrder::Bgr, data)
    }

    /// A single-channel frame.
    pub fn gray(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self::new(width, height, 1, ChannelOrder::Rgb, data)
    }

    /// `[h, w]` for grayscale frames, `[h, w, c]` otherwise.
    pub fn shape(&self) -> Vec<usize> {
        let (h, w) = (self.height as usize, self.width as usize);
        if self.channels == 1 {
            vec![h, w]
        } else {
            vec![h, w, self.channels as usize]
        }
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Projects the frame onto a single luminance channel.
    ///
    /// Grayscale frames are returned as-is. Color frames are weighted with BT.601
    /// coefficients and rounded to the nearest byte, honouring `order`.
    pub fn to_grayscale(&self) -> Vec<u8> {
        if self.channels == 1 {
            return self.data.clone();
        }

        let step = self.channels as usize;
        self.data
            .chunks_exact(step)
            .map(|px| {
                let (r, g, b) = match self.order {
                    ChannelOrder::Bgr => (px[2], px[1], px[0]),
                    ChannelOrder::Rgb => (px[0], px[1], px[2]),
                };
                let luma = LUMA_R * r as f64 + LUMA_G * g as f64 + LUMA_B * b as f64;
                luma.round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}

/// Mean intensity of a grayscale buffer on the 0-255 scale.
pub fn mean_intensity(gray: &[u8]) -> f64 {
    if gray.is_empty() {
        return 0.0;
    }
    let sum: u64 = gray.iter().map(|&v| v as u64).sum();
    sum as f64 / gray.len() as f64
}

/// Mirrors an out-of-range index back into `0..len` without repeating the edge
/// sample (`gfedcb|abcdefgh|gfedcba`).
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = index;
    while i < 0 || i > last {
        if i < 0 {
            i = -i;
        }
        if i > last {
            i = 2 * last - i;
        }
    }
    i as usize
}

/// Variance of the 4-neighbour Laplacian response over a grayscale buffer.
///
/// Sharp images have strong, varied edge responses; defocused or motion-blurred
/// images produce a flat response with low variance.
pub fn laplacian_variance(gray: &[u8], width: usize, height: usize) -> f64 {
    let n = width * height;
    if n == 0 || gray.len() < n {
        return 0.0;
    }

    let at = |x: isize, y: isize| -> f64 {
        let xi = reflect_101(x, width);
        let yi = reflect_101(y, height);
        gray[yi * width + xi] as f64
    };

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..height as isize {
        for x in 0..width as isize {
            let response = at(x, y - 1) + at(x - 1, y) + at(x + 1, y) + at(x, y + 1) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0)
}
