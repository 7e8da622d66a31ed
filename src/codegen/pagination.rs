use super::file_header;

/// Render the shared pagination module. Every table and query module leans
/// on this one file; the cursor is the URL-safe base64 of the 16 raw UUID
/// bytes, without padding.
pub fn render_pagination_module(package_name: &str) -> String {
    let mut out = String::new();
    out.push_str(&file_header("shared pagination support", package_name));

    out.push_str(
        r#"use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use uuid::Uuid;

/// Page size used when the caller passes `limit == 0`.
pub const DEFAULT_PAGE_LIMIT: i64 = 20;
/// Hard upper bound on the page size.
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Parameters for cursor-based pagination. An empty cursor starts from the
/// beginning.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct PaginationParams {
    pub cursor: String,
    pub limit: i64,
}

/// One page of results. `next_cursor` is empty when there is no next page.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PaginationResult<T> {
    pub items: Vec<T>,
    pub next_cursor: String,
    pub has_more: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    #[error("empty cursor")]
    EmptyCursor,
    #[error("invalid cursor format: {0}")]
    InvalidCursor(#[from] base64::DecodeError),
    #[error("invalid cursor length: expected 16 bytes, got {0}")]
    InvalidCursorLength(usize),
    #[error("limit cannot be negative")]
    NegativeLimit,
    #[error("limit cannot exceed 100")]
    LimitTooLarge,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub(crate) fn encode_cursor(id: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(id.as_bytes())
}

pub(crate) fn decode_cursor(cursor: &str) -> Result<Uuid, PaginationError> {
    if cursor.is_empty() {
        return Err(PaginationError::EmptyCursor);
    }
    let bytes = URL_SAFE_NO_PAD.decode(cursor)?;
    if bytes.len() != 16 {
        return Err(PaginationError::InvalidCursorLength(bytes.len()));
    }
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&bytes);
    Ok(Uuid::from_bytes(raw))
}

pub(crate) fn validate_pagination_params(
    params: &PaginationParams,
) -> Result<(), PaginationError> {
    if params.limit < 0 {
        return Err(PaginationError::NegativeLimit);
    }
    if params.limit > MAX_PAGE_LIMIT {
        return Err(PaginationError::LimitTooLarge);
    }
    if !params.cursor.is_empty() {
        decode_cursor(&params.cursor)?;
    }
    Ok(())
}
"#,
    );

    out
}
