//! # costlens-core
//!
//! Core errors and logging for the CostLens cost analytics system.
//!
//! This crate provides:
//! - [`CoreError`] - Setup and environment errors
//! - [`logging`] - Tracing setup and the `log_analysis_event!` macro
//!
//! ## Example
//!
//! ```no_run
//! use costlens_core::logging;
//!
//! fn main() -> costlens_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!     tracing::info!("CostLens started");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::{CoreError, Result};
pub use logging::{LogGuard, init_logging};
