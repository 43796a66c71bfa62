pub mod event;
pub mod price_change;
pub mod product;
pub mod session_status;

// Re-exports for convenience
pub use event::*;
pub use price_change::*;
pub use product::*;
pub use session_status::*;

/// Random identifier for sessions started without a caller-supplied id.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
