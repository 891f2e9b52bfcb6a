use serde::Serialize;

/// JSON envelope returned on every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}
