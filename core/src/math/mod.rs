pub mod fft;
pub mod lsq;
pub mod matrix;
pub mod stats;

pub use fft::FftHelper;
pub use lsq::{CurveFit, FitModel, FitSolution};
pub use matrix::MatrixHelper;
pub use stats::StatsHelper;
