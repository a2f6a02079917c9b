//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! `store` owns persistence and the version-bump invariants, `optimize` owns
//! the untrusted generator round trip, and `diagram` coordinates the two so
//! route handlers stay focused on protocol translation.

pub mod diagram;
pub mod optimize;
pub mod store;
