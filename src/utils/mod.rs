pub mod error;
pub mod jwt;
pub mod sanitize;

pub use error::{ApiError, ApiResult};
pub use jwt::JwtUtil;
pub use sanitize::sanitize_prompt_text;
