use crate::{codec, model::Frame};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("could not open camera: {0}")]
    Open(String),

    #[error("could not capture frame: {0}")]
    Read(String),

    #[error("could not decode frame: {0}")]
    Decode(String),
}

/// Something that yields one RGB frame per call.
///
/// Calls block; the relay runs them on the blocking thread pool and never
/// invokes the same source concurrently.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<Frame, CaptureError>;

    /// Human-readable description for the startup log.
    fn describe(&self) -> String;
}

/// Re-reads an image file on every capture.
pub struct StillImageSource {
    path: PathBuf,
}

impl StillImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSource for StillImageSource {
    /// JPEG and PNG go through kornia-io; other formats through the codec.
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let kind = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match kind.as_deref() {
            Some("jpg" | "jpeg") => kornia_io::jpeg::read_image_jpeg_rgb8(&self.path)
                .map_err(|e| CaptureError::Read(e.to_string())),
            Some("png") => kornia_io::png::read_image_png_rgb8(&self.path)
                .map_err(|e| CaptureError::Read(e.to_string())),
            _ => {
                let bytes = std::fs::read(&self.path).map_err(|e| {
                    CaptureError::Read(format!("{}: {e}", self.path.display()))
                })?;
                codec::decode_image_bytes(&bytes)
                    .map_err(|e| CaptureError::Decode(format!("{}: {e}", self.path.display())))
            }
        }
    }

    fn describe(&self) -> String {
        format!("still image {}", self.path.display())
    }
}

#[cfg(feature = "camera")]
pub use camera::CameraSource;

#[cfg(feature = "camera")]
mod camera {
    use super::{CaptureError, FrameSource};
    use crate::model::Frame;
    use kornia_image::{Image, ImageSize, allocator::CpuAllocator};
    use nokhwa::{
        Camera,
        pixel_format::RgbFormat,
        utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    };

    /// Grabs a single frame from a local camera per capture.
    ///
    /// The device is opened and released inside each call so no handle
    /// outlives a request.
    pub struct CameraSource {
        index: u32,
    }

    impl CameraSource {
        pub fn new(index: u32) -> Self {
            Self { index }
        }
    }

    /// Stops the stream on every exit path, errors included.
    struct OpenStream(Camera);

    impl Drop for OpenStream {
        fn drop(&mut self) {
            if let Err(e) = self.0.stop_stream() {
                log::warn!("Failed to release camera: {e}");
            }
        }
    }

    impl FrameSource for CameraSource {
        fn capture(&mut self) -> Result<Frame, CaptureError> {
            let format =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            let mut camera = Camera::new(CameraIndex::Index(self.index), format)
                .map_err(|e| CaptureError::Open(e.to_string()))?;
            camera
                .open_stream()
                .map_err(|e| CaptureError::Open(e.to_string()))?;
            let mut stream = OpenStream(camera);

            let buffer = stream
                .0
                .frame()
                .map_err(|e| CaptureError::Read(e.to_string()))?;
            let decoded = buffer
                .decode_image::<RgbFormat>()
                .map_err(|e| CaptureError::Decode(e.to_string()))?;
            drop(stream);

            let size = ImageSize {
                width: decoded.width() as usize,
                height: decoded.height() as usize,
            };
            Image::new(size, decoded.into_raw(), CpuAllocator)
                .map_err(|e| CaptureError::Decode(e.to_string()))
        }

        fn describe(&self) -> String {
            format!("camera #{}", self.index)
        }
    }
}
