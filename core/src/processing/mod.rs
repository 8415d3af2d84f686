pub mod calibrate;
pub mod classify;
pub mod dipole;
pub mod pipeline;
pub mod record;
pub mod spectral;

pub use calibrate::{inverse_cube_adjust, GeometricCalibrator};
pub use classify::{Classification, StrayFieldClassifier, StrayFieldVerdict};
pub use dipole::{DipoleFit, DipoleFitStage, DistanceEstimate, FitPoint, MU_0};
pub use pipeline::{DatasetSpectra, FitResult, ScreeningPipeline, ScreeningReport};
pub use record::SensorRecord;
pub use spectral::{AmplitudeSpectrum, AxisSpectrum, SpectralPeak, SpectralStage};
