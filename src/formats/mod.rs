//! Format adapters and raw sample arrays.
//!
//! The core never decodes a file format itself. Readers are registered
//! by external crates through [`FormatRegistry::register`].

pub mod registry;

pub use registry::{FnAdapter, FormatAdapter, FormatRegistry};

use crate::models::Dtype;

/// Raw samples as returned by an adapter, tagged by element type.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleArray {
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl SampleArray {
    pub fn len(&self) -> usize {
        match self {
            SampleArray::Uint8(v) => v.len(),
            SampleArray::Int16(v) => v.len(),
            SampleArray::Int32(v) => v.len(),
            SampleArray::Float32(v) => v.len(),
            SampleArray::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            SampleArray::Uint8(_) => Dtype::Uint8,
            SampleArray::Int16(_) => Dtype::Int16,
            SampleArray::Int32(_) => Dtype::Int32,
            SampleArray::Float32(_) => Dtype::Float32,
            SampleArray::Float64(_) => Dtype::Float64,
        }
    }

    /// Widen every sample to `f64` for analysis code that does not care
    /// about the storage type.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            SampleArray::Uint8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            SampleArray::Int16(v) => v.iter().map(|&x| f64::from(x)).collect(),
            SampleArray::Int32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            SampleArray::Float32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            SampleArray::Float64(v) => v.clone(),
        }
    }

    /// Little-endian byte image of the samples.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.dtype().size_of());
        match self {
            SampleArray::Uint8(v) => out.extend_from_slice(v),
            SampleArray::Int16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            SampleArray::Int32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            SampleArray::Float32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            SampleArray::Float64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        }
        out
    }
}
