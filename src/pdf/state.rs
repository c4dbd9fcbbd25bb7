//! Render state reported to callers

/// Message shown in place of a document that could not be rendered
pub const FAILED_MESSAGE: &str = "Failed to load PDF";

/// Coarse progress of a render cycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RenderState {
    /// Document is being fetched or pages are being rasterized
    #[default]
    Loading,
    /// Every page has been appended to the render surface
    Ready,
    /// The cycle stopped; the message is safe to show to a user
    Failed(String),
}

impl RenderState {
    #[must_use]
    pub fn failed() -> Self {
        Self::Failed(FAILED_MESSAGE.to_string())
    }

    /// True for states that end a cycle
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Loading)
    }
}
