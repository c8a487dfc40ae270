//! 4×4 channel mix matrices
//!
//! Every matrix is applied to one time-aligned cross-channel vector, never
//! across time. All three are orthogonal, so mixing never adds energy.

use crate::{Frame, INTERNAL_CHANNELS};

const N: usize = INTERNAL_CHANNELS;

/// Which of the engine's matrices to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixKind {
    Householder,
    Hadamard,
    Permutation,
}

/// Fixed-coefficient N×N mix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixMatrix {
    coeffs: [[f64; N]; N],
}

/// Householder reflection I − (2/N)·11ᵀ: diagonal 0.5, off-diagonal −0.5
const HOUSEHOLDER_4: [[f64; N]; N] = [
    [0.5, -0.5, -0.5, -0.5],
    [-0.5, 0.5, -0.5, -0.5],
    [-0.5, -0.5, 0.5, -0.5],
    [-0.5, -0.5, -0.5, 0.5],
];

/// Sylvester Hadamard H₄ = H₂ ⊗ H₂, normalized by 1/√4
const HADAMARD_4: [[f64; N]; N] = [
    [0.5, 0.5, 0.5, 0.5],
    [0.5, -0.5, 0.5, -0.5],
    [0.5, 0.5, -0.5, -0.5],
    [0.5, -0.5, -0.5, 0.5],
];

/// Channel rotation with polarity flips on odd outputs
const PERMUTATION_4: [[f64; N]; N] = [
    [0.0, 0.0, 0.0, 1.0],
    [-1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, -1.0, 0.0],
];

impl MixMatrix {
    pub const fn from_coeffs(coeffs: [[f64; N]; N]) -> Self {
        Self { coeffs }
    }

    pub const fn householder() -> Self {
        Self::from_coeffs(HOUSEHOLDER_4)
    }

    pub const fn hadamard() -> Self {
        Self::from_coeffs(HADAMARD_4)
    }

    pub const fn permutation() -> Self {
        Self::from_coeffs(PERMUTATION_4)
    }

    pub const fn identity() -> Self {
        Self::from_coeffs([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    #[inline]
    pub fn coeffs(&self) -> &[[f64; N]; N] {
        &self.coeffs
    }

    /// y = M·x
    #[inline(always)]
    pub fn apply(&self, input: &Frame) -> Frame {
        let mut out = [0.0; N];
        for (row, y) in self.coeffs.iter().zip(out.iter_mut()) {
            *y = row.iter().zip(input).map(|(m, x)| m * x).sum();
        }
        out
    }

    /// Matrix product self·other (apply `other` first)
    pub fn then_after(&self, other: &MixMatrix) -> MixMatrix {
        let mut coeffs = [[0.0; N]; N];
        for (i, row) in coeffs.iter_mut().enumerate() {
            for (j, c) in row.iter_mut().enumerate() {
                *c = (0..N).map(|k| self.coeffs[i][k] * other.coeffs[k][j]).sum();
            }
        }
        MixMatrix { coeffs }
    }

    /// True when MᵀM = I within `tolerance`
    pub fn is_orthogonal(&self, tolerance: f64) -> bool {
        (0..N).all(|i| {
            (0..N).all(|j| {
                let dot: f64 = (0..N).map(|k| self.coeffs[k][i] * self.coeffs[k][j]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                (dot - expected).abs() <= tolerance
            })
        })
    }
}

/// The three matrices, computed once per prepare
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixBank {
    householder: MixMatrix,
    hadamard: MixMatrix,
    permutation: MixMatrix,
    /// Hadamard·Permutation, the diffusion stage's combined mix
    diffusion: MixMatrix,
}

impl MixBank {
    pub fn new() -> Self {
        let householder = MixMatrix::householder();
        let hadamard = MixMatrix::hadamard();
        let permutation = MixMatrix::permutation();
        Self {
            householder,
            hadamard,
            permutation,
            diffusion: hadamard.then_after(&permutation),
        }
    }

    #[inline]
    pub fn get(&self, kind: MixKind) -> &MixMatrix {
        match kind {
            MixKind::Householder => &self.householder,
            MixKind::Hadamard => &self.hadamard,
            MixKind::Permutation => &self.permutation,
        }
    }

    /// Apply one named matrix to a cross-channel vector
    #[inline(always)]
    pub fn apply(&self, kind: MixKind, input: &Frame) -> Frame {
        self.get(kind).apply(input)
    }

    /// Permutation followed by Hadamard in one pass
    #[inline(always)]
    pub fn diffuse(&self, input: &Frame) -> Frame {
        self.diffusion.apply(input)
    }
}

impl Default for MixBank {
    fn default() -> Self {
        Self::new()
    }
}
