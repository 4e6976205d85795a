//! Magnetometer samples and their classification.
//!
//! A raw sample is a 3-axis field reading in microtesla. Classification turns it
//! into a magnitude (Euclidean norm) and a polarity taken from the sign of the
//! vertical (z) component.

use std::collections::VecDeque;

use serde::Serialize;

/// Vertical field strength (µT) that must be exceeded before a pole is named.
pub const POLE_THRESHOLD_UT: f32 = 20.0;

/// One raw magnetometer reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Monotonic timestamp in milliseconds
    pub timestamp_ms: u64,
}

impl Sample {
    pub fn new(x: f32, y: f32, z: f32, timestamp_ms: u64) -> Self {
        Self { x, y, z, timestamp_ms }
    }

    /// Field strength with `offset` removed on every axis.
    pub fn minus(&self, offset: [f32; 3]) -> Self {
        Self {
            x: self.x - offset[0],
            y: self.y - offset[1],
            z: self.z - offset[2],
            timestamp_ms: self.timestamp_ms,
        }
    }

    pub fn axes(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Which pole of the magnet faces the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    North,
    South,
    None,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::North => "N",
            Polarity::South => "S",
            Polarity::None => "-",
        }
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Magnitude and polarity of one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifiedSample {
    pub magnitude: f32,
    pub polarity: Polarity,
    pub timestamp_ms: u64,
}

/// Derive magnitude and polarity from a raw sample.
pub fn classify(sample: &Sample) -> ClassifiedSample {
    let Sample { x, y, z, timestamp_ms } = *sample;
    let magnitude = (x * x + y * y + z * z).sqrt();

    let polarity = if z > POLE_THRESHOLD_UT {
        Polarity::North
    } else if z < -POLE_THRESHOLD_UT {
        Polarity::South
    } else {
        Polarity::None
    };

    ClassifiedSample {
        magnitude,
        polarity,
        timestamp_ms,
    }
}

/// Moving average over the most recent magnitudes.
///
/// A window of 1 passes values through unchanged.
#[derive(Debug, Clone)]
pub struct MagnitudeFilter {
    window: VecDeque<f32>,
    size: usize,
}

impl MagnitudeFilter {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            window: VecDeque::with_capacity(size),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Change the window length, keeping the newest values.
    pub fn resize(&mut self, size: usize) {
        self.size = size.max(1);
        while self.window.len() > self.size {
            self.window.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }

    pub fn push(&mut self, magnitude: f32) -> f32 {
        if self.window.len() == self.size {
            self.window.pop_front();
        }
        self.window.push_back(magnitude);
        self.window.iter().sum::<f32>() / self.window.len() as f32
    }
}
