use crate::core_modules::frame::{ChannelOrder, Frame};

/// Reorders a capture-native BGR frame into the RGB layout the model expects.
///
/// Grayscale and already-RGB frames come back as an unmodified copy. A frame
/// whose buffer cannot be interpreted is logged and returned as-is; the quality
/// gate is responsible for rejecting it.
pub fn preprocess(frame: &Frame) -> Frame {
    if frame.channels != 3 || frame.order == ChannelOrder::Rgb {
        return frame.clone();
    }

    if frame.data.len() % 3 != 0 {
        tracing::warn!(
            len = frame.data.len(),
            "cannot reorder channels of a malformed frame, passing it through"
        );
        return frame.clone();
    }

    let mut data = frame.data.clone();
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }

    Frame {
        data,
        order: ChannelOrder::Rgb,
        ..*frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_blue_and_red() {
        let frame = Frame::bgr(2, 1, vec![1, 2, 3, 4, 5, 6]);
        let out = preprocess(&frame);
        assert_eq!(out.data, vec![3, 2, 1, 6, 5, 4]);
        assert_eq!(out.order, ChannelOrder::Rgb);
        assert_eq!((out.width, out.height, out.channels), (2, 1, 3));
    }

    #[test]
    fn grayscale_is_copied_unchanged() {
        let frame = Frame::gray(2, 2, vec![9, 8, 7, 6]);
        assert_eq!(preprocess(&frame), frame);
    }

    #[test]
    fn rgb_is_not_swapped_twice() {
        let once = preprocess(&Frame::bgr(1, 1, vec![10, 20, 30]));
        assert_eq!(preprocess(&once), once);
    }

    #[test]
    fn malformed_buffer_passes_through() {
        let frame = Frame::bgr(1, 1, vec![1, 2]);
        assert_eq!(preprocess(&frame), frame);
    }
}
