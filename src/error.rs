pub type WitsResult<T> = Result<T, WitsError>;

#[derive(thiserror::Error, Debug)]
pub enum WitsError {
    /// Invalid configuration or input data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Failure while producing the text-overlay frame.
    #[error("render error: {0}")]
    Render(String),

    /// Failure while assembling or encoding the output video.
    #[error("assembly error: {0}")]
    Assembly(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WitsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            WitsError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(WitsError::render("x").to_string().contains("render error:"));
        assert!(
            WitsError::assembly("x")
                .to_string()
                .contains("assembly error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = WitsError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
