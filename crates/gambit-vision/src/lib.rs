//! Collaborator interfaces between the gambit engine and the game window.
//!
//! The engine never touches the screen directly: it consumes the narrow
//! traits defined here (capture, area/text/screen recognition, input
//! injection) plus two pure query helpers, the LCS fuzzy matcher and the
//! screen route map. Production backends live outside this workspace;
//! `testing` ships scripted in-memory implementations for tests and dry
//! runs.

pub mod errors;
pub mod fuzzy;
pub mod routes;
pub mod testing;
pub mod traits;
pub mod types;

pub use errors::*;
pub use routes::*;
pub use traits::*;
pub use types::*;
