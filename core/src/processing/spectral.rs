use crate::math::fft::FftHelper;
use crate::math::stats::StatsHelper;
use crate::prelude::{AnalysisConfig, AnalysisStage, ScreenError, ScreenResult};
use crate::telemetry::log::LogManager;
use serde::Serialize;
use std::f64::consts::PI;

/// One-sided amplitude spectrum (square root of the averaged power per bin).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmplitudeSpectrum {
    pub frequencies: Vec<f64>,
    pub amplitudes: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpectralPeak {
    pub bin: usize,
    pub frequency: f64,
    pub amplitude: f64,
}

impl AmplitudeSpectrum {
    /// Largest non-DC bin; the DC bin only counts when it is the sole bin.
    pub fn peak(&self) -> Option<SpectralPeak> {
        let first = if self.amplitudes.len() > 1 { 1 } else { 0 };
        self.amplitudes
            .iter()
            .enumerate()
            .skip(first)
            .fold(None, |best: Option<(usize, f64)>, (bin, &amp)| match best {
                Some((_, top)) if top >= amp => best,
                _ => Some((bin, amp)),
            })
            .map(|(bin, amplitude)| SpectralPeak {
                bin,
                frequency: self.frequencies[bin],
                amplitude,
            })
    }
}

/// Periodic Hann window (the DFT-even form).
fn hann(length: usize) -> Vec<f64> {
    if length == 1 {
        return vec![1.0];
    }
    (0..length)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / length as f64).cos())
        .collect()
}

/// Welch estimate with half-overlapping Hann segments of at most `segment_cap`
/// samples, mean-detrended, scaled as a power spectrum.
pub fn welch_amplitude(
    samples: &[f64],
    sample_rate_hz: f64,
    segment_cap: usize,
) -> ScreenResult<AmplitudeSpectrum> {
    if samples.is_empty() {
        return Err(ScreenError::DataConsistency(
            "cannot estimate a spectrum from zero samples".into(),
        ));
    }
    if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
        return Err(ScreenError::DataConsistency(format!(
            "invalid sampling rate {}",
            sample_rate_hz
        )));
    }

    let segment = segment_cap.max(1).min(samples.len());
    let overlap = segment / 2;
    let step = segment - overlap;
    let segments = (samples.len() - overlap) / step;

    let window = hann(segment);
    let window_sum: f64 = window.iter().sum();
    let scale = 1.0 / (window_sum * window_sum);
    let bins = segment / 2 + 1;

    let mut fft = FftHelper::new(segment);
    let mut power = vec![0.0; bins];
    let mut windowed = vec![0.0; segment];

    for index in 0..segments {
        let chunk = &samples[index * step..index * step + segment];
        let mean = StatsHelper::mean(chunk);
        for ((slot, &value), &w) in windowed.iter_mut().zip(chunk).zip(&window) {
            *slot = (value - mean) * w;
        }
        for (bin, value) in fft.forward(&windowed).iter().take(bins).enumerate() {
            power[bin] += value.norm_sqr() * scale;
        }
    }

    // fold negative frequencies, leaving DC and (for even lengths) Nyquist alone
    let fold_end = if segment % 2 == 0 { bins - 1 } else { bins };
    for value in power.iter_mut().take(fold_end).skip(1) {
        *value *= 2.0;
    }

    let frequencies = (0..bins)
        .map(|bin| bin as f64 * sample_rate_hz / segment as f64)
        .collect();
    let amplitudes = power
        .iter()
        .map(|p| (p / segments as f64).sqrt())
        .collect();

    Ok(AmplitudeSpectrum {
        frequencies,
        amplitudes,
    })
}

/// Sampling rate from a time-offset sequence; every spacing must stay within
/// `tolerance` (fractional) of the mean spacing.
pub fn derive_sample_rate(times: &[f64], tolerance: f64) -> ScreenResult<f64> {
    if times.len() < 2 {
        return Err(ScreenError::DataConsistency(format!(
            "{} time sample(s) cannot define a sampling rate",
            times.len()
        )));
    }
    let mean = (times[times.len() - 1] - times[0]) / (times.len() - 1) as f64;
    if !(mean.is_finite() && mean > 0.0) {
        return Err(ScreenError::DataConsistency(
            "time offsets are not increasing".into(),
        ));
    }
    for (index, pair) in times.windows(2).enumerate() {
        let spacing = pair[1] - pair[0];
        if (spacing - mean).abs() > tolerance * mean {
            return Err(ScreenError::DataConsistency(format!(
                "sample spacing {:.6} s after sample {} deviates more than {:.0}% from the mean {:.6} s (dropped samples?)",
                spacing,
                index,
                tolerance * 100.0,
                mean
            )));
        }
    }
    Ok(1.0 / mean)
}

pub struct SpectralInput {
    pub label: String,
    pub samples: Vec<f64>,
    pub sample_rate_hz: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AxisSpectrum {
    pub label: String,
    pub spectrum: AmplitudeSpectrum,
    pub peak: SpectralPeak,
}

/// Stage estimating one variable's amplitude spectrum and its peak.
pub struct SpectralStage {
    config: Option<AnalysisConfig>,
    logger: LogManager,
}

impl SpectralStage {
    pub fn new() -> Self {
        Self {
            config: None,
            logger: LogManager::new("spectral"),
        }
    }
}

impl Default for SpectralStage {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisStage for SpectralStage {
    type Input = SpectralInput;
    type Output = AxisSpectrum;

    fn initialize(&mut self, config: &AnalysisConfig) -> ScreenResult<()> {
        if config.segment_cap == 0 {
            return Err(ScreenError::DataConsistency(
                "segment cap must be positive".into(),
            ));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn execute(&mut self, input: SpectralInput) -> ScreenResult<AxisSpectrum> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| ScreenError::DataConsistency("spectral stage not initialized".into()))?;

        if input.samples.len() < config.segment_cap {
            self.logger.detail(&format!(
                "{}: short record of {} samples, coarser resolution",
                input.label,
                input.samples.len()
            ));
        }
        let spectrum = welch_amplitude(&input.samples, input.sample_rate_hz, config.segment_cap)?;
        let peak = spectrum.peak().ok_or_else(|| {
            ScreenError::DataConsistency(format!("{}: empty spectrum", input.label))
        })?;
        self.logger.record(&format!(
            "{} peak {:.4} at {:.4} Hz (bin {})",
            input.label, peak.amplitude, peak.frequency, peak.bin
        ));

        Ok(AxisSpectrum {
            label: input.label,
            spectrum,
            peak,
        })
    }

    fn cleanup(&mut self) {
        self.config = None;
    }
}
