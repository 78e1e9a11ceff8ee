use crate::{AreaSpec, Frame, InputError, Point, Region, TextLine, VisionError};
use async_trait::async_trait;
use std::sync::Arc;

/// Produces timestamped frames of the game window.
#[async_trait]
pub trait ScreenCapturer: Send + Sync {
    async fn capture(&self) -> Result<Frame, VisionError>;
}

/// Pure recognition queries over a captured frame.
///
/// Implementations wrap whatever template-matching/OCR backend the host
/// application ships; none of these calls may mutate engine-visible state.
#[async_trait]
pub trait GameVision: Send + Sync {
    /// Look up the configuration entry for a named area, if one exists.
    fn area_config(&self, name: &str) -> Option<AreaSpec>;

    /// Locate a configured area in the frame, returning its click point.
    async fn locate_area(
        &self,
        frame: &Frame,
        spec: &AreaSpec,
    ) -> Result<Option<Point>, VisionError>;

    /// Recognize text lines in the frame, optionally cropped to a region.
    async fn read_text(
        &self,
        frame: &Frame,
        region: Option<Region>,
    ) -> Result<Vec<TextLine>, VisionError>;

    /// Identify the named screen the frame is showing, if recognizable.
    async fn identify_screen(&self, frame: &Frame) -> Result<Option<String>, VisionError>;
}

/// Injects input into the game window.
#[async_trait]
pub trait InputDriver: Send + Sync {
    /// Perform a click; `false` means the click was attempted but not
    /// accepted by the window.
    async fn click(&self, point: Point) -> Result<bool, InputError>;
}

pub type SharedScreenCapturer = Arc<dyn ScreenCapturer>;
pub type SharedGameVision = Arc<dyn GameVision>;
pub type SharedInputDriver = Arc<dyn InputDriver>;
