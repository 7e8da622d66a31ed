use std::future::Future;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use thiserror::Error;
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

#[derive(Debug, Error)]
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

/// Rows that can act as a pagination anchor.
pub trait HasId {
    fn get_id(&self) -> Uuid;
}

/// Encode a primary-key UUID as an opaque cursor: URL-safe base64 of the 16
/// raw bytes, no padding.
pub fn encode_cursor(id: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(id.as_bytes())
}

/// Decode an opaque cursor back to a UUID. Rejects empty strings, invalid
/// base64 and anything that is not exactly 16 bytes.
pub fn decode_cursor(cursor: &str) -> Result<Uuid, PaginationError> {
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

/// Reject out-of-range limits and unparseable cursors before any query runs.
pub fn validate_pagination_params(params: &PaginationParams) -> Result<(), PaginationError> {
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

/// The limit actually applied to a page: 0 means the default, anything else
/// is capped at the maximum.
pub fn effective_limit(limit: i64) -> i64 {
    if limit == 0 {
        DEFAULT_PAGE_LIMIT
    } else {
        limit.min(MAX_PAGE_LIMIT)
    }
}

/// Run one page of a cursor query. `query_fn` receives the decoded cursor
/// (or `None` for the first page) and a limit already bumped by one; the
/// extra row only signals that another page exists and is trimmed off.
pub async fn paginate<T, F, Fut>(
    params: PaginationParams,
    query_fn: F,
) -> Result<PaginationResult<T>, PaginationError>
where
    T: HasId,
    F: FnOnce(Option<Uuid>, i64) -> Fut,
    Fut: Future<Output = Result<Vec<T>, sqlx::Error>>,
{
    validate_pagination_params(&params)?;

    let cursor_id = if params.cursor.is_empty() {
        None
    } else {
        Some(decode_cursor(&params.cursor)?)
    };

    let limit = effective_limit(params.limit);
    let mut items = query_fn(cursor_id, limit + 1).await?;

    let has_more = items.len() as i64 > limit;
    if has_more {
        items.truncate(limit as usize);
    }

    let next_cursor = if has_more {
        items
            .last()
            .map(|item| encode_cursor(item.get_id()))
            .unwrap_or_default()
    } else {
        String::new()
    };

    Ok(PaginationResult {
        items,
        next_cursor,
        has_more,
    })
}
