use kornia_image::{Image, ImageSize, allocator::CpuAllocator};

/// An RGB8 raster as consumed by the vision-language models.
pub type Frame = Image<u8, 3, CpuAllocator>;

/// Trait for vision-language models that can be driven by the [`crate::QueryEngine`].
///
/// Implementors hold the loaded weights; the engine moves the model into its
/// worker thread and calls it sequentially, so methods take `&mut self`.
pub trait VisualQueryModel {
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Produces a short free-form description of the image.
    fn caption(&mut self, image: &Frame) -> Result<String, Self::Error>;

    /// Answers `prompt` against the image.
    fn query(&mut self, image: &Frame, prompt: &str) -> Result<String, Self::Error>;
}

/// A visual query: a prompt paired with the image it refers to.
pub struct QueryRequest {
    pub prompt: String,
    pub image: Frame,
}

/// Lightweight description of a [`QueryRequest`] that survives the request
/// being consumed by the model.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryMetadata {
    pub prompt: String,
    pub image_size: ImageSize,
}

impl QueryRequest {
    pub fn new(prompt: impl Into<String>, image: Frame) -> Self {
        Self {
            prompt: prompt.into(),
            image,
        }
    }

    /// Extracts the metadata without cloning the image.
    pub fn metadata(&self) -> QueryMetadata {
        QueryMetadata {
            prompt: self.prompt.clone(),
            image_size: self.image.size(),
        }
    }
}
