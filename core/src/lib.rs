//! Measurement-to-verdict core for rotating-object magnetic cleanliness screening.
//!
//! Multi-sensor recordings live in a self-describing [`table::Table`]. The
//! [`processing`] stages turn each sensor's rotation-synchronous field
//! variation into a per-distance dipole estimate, fit a single moment across
//! all distances, and classify the projected stray field. Completed runs are
//! appended to the [`ledger`].

pub mod ledger;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod table;
pub mod telemetry;

pub use prelude::{AnalysisConfig, AnalysisStage, ScreenError, ScreenResult};
