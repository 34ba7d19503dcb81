use thiserror::Error;

/// Errors surfaced by measurement hosts and the export pipeline.
///
/// Packing and table chunking never fail; malformed input there yields
/// degenerate pages instead of an error.
#[derive(Debug, Error)]
pub enum PrintError {
    /// The layout engine rejected a tree operation.
    #[error("layout error: {0}")]
    Layout(String),
    /// An image could not be read or decoded.
    #[error("asset error: {0}")]
    Asset(String),
    /// A font file could not be parsed.
    #[error("font error: {0}")]
    Font(String),
    /// Page capture to a bitmap failed.
    #[error("raster error: {0}")]
    Raster(String),
    /// PDF assembly failed.
    #[error("pdf error: {0}")]
    Pdf(String),
    /// Export was requested before pagination converged.
    #[error("pagination is not ready yet")]
    NotReady,
    /// Export was requested while another export is still running.
    #[error("an export is already running")]
    Busy,
    /// The frame loop gave up before the controller became ready.
    #[error("pagination did not become ready after {frames} frames")]
    Stalled { frames: u32 },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<taffy::TaffyError> for PrintError {
    fn from(value: taffy::TaffyError) -> Self {
        PrintError::Layout(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_name_the_failure() {
        assert_eq!(
            PrintError::Stalled { frames: 600 }.to_string(),
            "pagination did not become ready after 600 frames"
        );
        assert_eq!(PrintError::Busy.to_string(), "an export is already running");
        assert_eq!(
            PrintError::InvalidConfiguration("gapPx must be finite".into()).to_string(),
            "invalid configuration: gapPx must be finite"
        );
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err: PrintError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "letterhead.png").into();
        assert!(matches!(err, PrintError::Io(_)));
        assert_eq!(err.to_string(), "io error: letterhead.png");
        assert!(err.source().is_some());
        assert!(PrintError::NotReady.source().is_none());
    }
}
