// Acoustic weighting of amplitudes
//
// Weighting curves approximate the frequency dependent loudness perception
// and are used when averaging harmonics. Curves are normalized to 1 at
// 1000 Hz.

use serde::{Deserialize, Serialize};

/// Frequency dependent scaling of amplitudes
pub trait AcousticWeighting: Send + Sync {
    fn apply_to_amplitude(&self, amplitude: f32, frequency: f32) -> f32;
}

/// Leaves amplitudes untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroWeighting;

impl AcousticWeighting for ZeroWeighting {
    fn apply_to_amplitude(&self, amplitude: f32, _frequency: f32) -> f32 {
        amplitude
    }
}

const F1_SQR: f64 = 20.6 * 20.6;
const F2_SQR: f64 = 107.7 * 107.7;
const F3_SQR: f64 = 737.9 * 737.9;
const F4_SQR: f64 = 12194.0 * 12194.0;

fn a_weighting_non_normalized(frequency: f64) -> f64 {
    let f_sqr = frequency * frequency;
    (F4_SQR * f_sqr * f_sqr)
        / ((f_sqr + F1_SQR) * ((f_sqr + F2_SQR) * (f_sqr + F3_SQR)).sqrt() * (f_sqr + F4_SQR))
}

fn c_weighting_non_normalized(frequency: f64) -> f64 {
    let f_sqr = frequency * frequency;
    (F4_SQR * f_sqr) / ((f_sqr + F1_SQR) * (f_sqr + F4_SQR))
}

/// A-weighting (IEC 61672)
#[derive(Debug, Clone, Copy)]
pub struct AWeighting {
    normalization: f64,
}

impl Default for AWeighting {
    fn default() -> Self {
        Self {
            normalization: 1.0 / a_weighting_non_normalized(1000.0),
        }
    }
}

impl AcousticWeighting for AWeighting {
    fn apply_to_amplitude(&self, amplitude: f32, frequency: f32) -> f32 {
        (amplitude as f64 * a_weighting_non_normalized(frequency as f64) * self.normalization) as f32
    }
}

/// C-weighting (IEC 61672)
#[derive(Debug, Clone, Copy)]
pub struct CWeighting {
    normalization: f64,
}

impl Default for CWeighting {
    fn default() -> Self {
        Self {
            normalization: 1.0 / c_weighting_non_normalized(1000.0),
        }
    }
}

impl AcousticWeighting for CWeighting {
    fn apply_to_amplitude(&self, amplitude: f32, frequency: f32) -> f32 {
        (amplitude as f64 * c_weighting_non_normalized(frequency as f64) * self.normalization) as f32
    }
}

/// Weighting selected in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcousticWeightingKind {
    #[default]
    Zero,
    A,
    C,
}

impl AcousticWeightingKind {
    pub fn weighting(self) -> Box<dyn AcousticWeighting> {
        match self {
            AcousticWeightingKind::Zero => Box::new(ZeroWeighting),
            AcousticWeightingKind::A => Box::new(AWeighting::default()),
            AcousticWeightingKind::C => Box::new(CWeighting::default()),
        }
    }
}
