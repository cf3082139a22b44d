use std::fmt;
use std::str::FromStr;

use crate::error::RasterError;

/// Square, odd-width matrix of convolution weights stored row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    weights: Vec<f64>,
    width: u32,
}

impl Kernel {
    /// Builds a kernel, failing fast when `width` is even or zero, or when the
    /// weight count is not `width * width`.
    pub fn new(weights: Vec<f64>, width: u32) -> Result<Self, RasterError> {
        if width == 0 || width % 2 == 0 {
            return Err(RasterError::invalid(format!(
                "kernel width must be odd and >= 1, got {width}"
            )));
        }
        let expected = (width as usize) * (width as usize);
        if weights.len() != expected {
            return Err(RasterError::invalid(format!(
                "kernel of width {width} needs {expected} weights, got {}",
                weights.len()
            )));
        }
        Ok(Self { weights, width })
    }

    pub fn identity() -> Self {
        Self {
            weights: vec![1.0],
            width: 1,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Distance from the center tap to the kernel edge.
    pub fn radius(&self) -> u32 {
        (self.width - 1) / 2
    }

    pub fn weight(&self, kx: u32, ky: u32) -> Option<f64> {
        if kx >= self.width || ky >= self.width {
            return None;
        }
        self.weights
            .get(kx as usize + ky as usize * self.width as usize)
            .copied()
    }

    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// Commonly used 3x3 kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelPreset {
    Identity,
    BoxBlur,
    Sharpen,
    EdgeDetect,
    Emboss,
}

impl KernelPreset {
    pub fn kernel(self) -> Kernel {
        let weights = match self {
            KernelPreset::Identity => vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0],
            KernelPreset::BoxBlur => vec![1.0 / 9.0; 9],
            KernelPreset::Sharpen => vec![0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0],
            KernelPreset::EdgeDetect => vec![-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0],
            KernelPreset::Emboss => vec![-2.0, -1.0, 0.0, -1.0, 1.0, 1.0, 0.0, 1.0, 2.0],
        };
        Kernel { weights, width: 3 }
    }

    pub fn name(self) -> &'static str {
        match self {
            KernelPreset::Identity => "identity",
            KernelPreset::BoxBlur => "box-blur",
            KernelPreset::Sharpen => "sharpen",
            KernelPreset::EdgeDetect => "edge-detect",
            KernelPreset::Emboss => "emboss",
        }
    }
}

impl fmt::Display for KernelPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KernelPreset {
    type Err = RasterError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "identity" | "none" => Ok(KernelPreset::Identity),
            "box-blur" | "box" | "blur" => Ok(KernelPreset::BoxBlur),
            "sharpen" => Ok(KernelPreset::Sharpen),
            "edge-detect" | "edge" | "edges" => Ok(KernelPreset::EdgeDetect),
            "emboss" => Ok(KernelPreset::Emboss),
            other => Err(RasterError::invalid(format!(
                "unknown kernel preset '{other}'"
            ))),
        }
    }
}
