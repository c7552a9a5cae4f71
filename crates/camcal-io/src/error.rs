use camcal_core::BoardSpecError;

#[derive(thiserror::Error, Debug)]
pub enum ResultIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("not an image list: {0}")]
    MalformedInputList(String),
    #[error(transparent)]
    Board(#[from] BoardSpecError),
}
