// OpenCV-backed camera devices. Only built with the `opencv` feature, since it
// needs the system OpenCV libraries.

use crate::camera::{CameraBackend, CameraDevice, CameraError, CameraSettings};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use pehechan::Frame;
use std::time::Duration;

fn backend_error(err: opencv::Error) -> CameraError {
    CameraError::Backend(err.to_string())
}

/// Opens local cameras by index through whichever OpenCV capture API is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvBackend;

impl CameraBackend for OpenCvBackend {
    fn open(&self, settings: &CameraSettings) -> Result<Box<dyn CameraDevice>, CameraError> {
        let mut capture = VideoCapture::new(settings.index, videoio::CAP_ANY).map_err(backend_error)?;
        if !capture.is_opened().map_err(backend_error)? {
            return Err(CameraError::OpenFailed);
        }

        let properties = [
            (videoio::CAP_PROP_FRAME_WIDTH, f64::from(settings.width)),
            (videoio::CAP_PROP_FRAME_HEIGHT, f64::from(settings.height)),
            (videoio::CAP_PROP_FPS, settings.fps),
            (videoio::CAP_PROP_BUFFERSIZE, f64::from(settings.buffer_size)),
        ];
        for (property, value) in properties {
            // Drivers may ignore a property; the camera is still usable.
            if !capture.set(property, value).map_err(backend_error)? {
                tracing::debug!(property, value, "camera ignored property");
            }
        }

        std::thread::sleep(Duration::from_millis(settings.warmup_ms));

        let mut camera = OpenCvCamera { capture };
        match camera.read_frame() {
            Ok(Some(frame)) => {
                tracing::info!(index = settings.index, width = frame.width, height = frame.height, "camera opened");
                Ok(Box::new(camera))
            }
            Ok(None) => Err(CameraError::NoFrames),
            Err(err) => {
                tracing::warn!(error = %err, "test read failed");
                Err(CameraError::NoFrames)
            }
        }
    }
}

pub struct OpenCvCamera {
    capture: VideoCapture,
}

impl CameraDevice for OpenCvCamera {
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        let mut mat = Mat::default();
        if !self.capture.read(&mut mat).map_err(backend_error)? || mat.empty() {
            return Ok(None);
        }
        mat_to_frame(mat).map(Some).map_err(backend_error)
    }
}

impl Drop for OpenCvCamera {
    fn drop(&mut self) {
        if let Err(err) = self.capture.release() {
            tracing::warn!(error = %err, "failed to release camera");
        }
    }
}

/// Copies an 8-bit OpenCV image into an owned `Frame`, keeping BGR order.
fn mat_to_frame(mat: Mat) -> opencv::Result<Frame> {
    if mat.depth() != core::CV_8U {
        return Err(opencv::Error::new(core::StsUnsupportedFormat, "expected an 8-bit camera image"));
    }

    let mat = match mat.channels() {
        4 => {
            let mut bgr = Mat::default();
            imgproc::cvt_color(&mat, &mut bgr, imgproc::COLOR_BGRA2BGR, 0)?;
            bgr
        }
        _ if !mat.is_continuous() => mat.try_clone()?,
        _ => mat,
    };

    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let data = mat.data_bytes()?.to_vec();
    Ok(match mat.channels() {
        1 => Frame::gray(width, height, data),
        _ => Frame::bgr(width, height, data),
    })
}
