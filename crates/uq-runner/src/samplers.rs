use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use thiserror::Error;
use uq_schemas::Sampler;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("dimension {index} has no assignments to sample")]
    EmptyDimension { index: usize },
    #[error("{method} sampling supports up to {max} dimensions, got {got}")]
    TooManyDimensions {
        method: &'static str,
        max: usize,
        got: usize,
    },
}

/// Draw sampled points from the expanded dimensions. Each point holds one
/// borrowed assignment per dimension, in dimension order.
pub fn sample<'a, T>(
    dimensions: &'a [Vec<T>],
    sampler: &Sampler,
) -> Result<Vec<Vec<&'a T>>, SampleError> {
    let lens: Vec<usize> = dimensions.iter().map(|d| d.len()).collect();
    let indices = sample_indices(&lens, sampler)?;
    Ok(indices
        .into_iter()
        .map(|point| {
            point
                .iter()
                .enumerate()
                .map(|(d, i)| &dimensions[d][*i])
                .collect()
        })
        .collect())
}

/// Index-space variant of [`sample`]: each returned point holds one index
/// into every dimension's assignment list.
pub fn sample_indices(lens: &[usize], sampler: &Sampler) -> Result<Vec<Vec<usize>>, SampleError> {
    for (index, len) in lens.iter().enumerate() {
        if *len == 0 {
            return Err(SampleError::EmptyDimension { index });
        }
    }
    let unit = match sampler {
        Sampler::CartesianProduct => return Ok(cartesian_indices(lens)),
        Sampler::LatinHypercube { n_samples, seed } => lhs_unit(*n_samples, lens.len(), *seed),
        Sampler::Sobol { n_samples } => sobol_unit(*n_samples, lens.len())?,
        Sampler::Halton { n_samples } => halton_unit(*n_samples, lens.len())?,
    };
    Ok(unit
        .into_iter()
        .map(|point| {
            point
                .iter()
                .zip(lens)
                .map(|(u, len)| unit_to_index(*u, *len))
                .collect()
        })
        .collect())
}

/// Full nested-loop product; the last dimension varies fastest.
fn cartesian_indices(lens: &[usize]) -> Vec<Vec<usize>> {
    let total: usize = lens.iter().product();
    let mut out = Vec::with_capacity(total);
    let mut point = vec![0usize; lens.len()];
    for _ in 0..total {
        out.push(point.clone());
        for d in (0..lens.len()).rev() {
            point[d] += 1;
            if point[d] < lens[d] {
                break;
            }
            point[d] = 0;
        }
    }
    out
}

/// Map a unit coordinate to an assignment index. `u == 1.0` clamps to the
/// last index instead of running off the end.
fn unit_to_index(u: f64, len: usize) -> usize {
    ((u * len as f64).floor() as usize).min(len - 1)
}

/// Latin hypercube: one stratified draw per stratum per dimension.
/// Randomized unless a seed is given.
fn lhs_unit(n_samples: usize, dims: usize, seed: Option<u64>) -> Vec<Vec<f64>> {
    let mut rng = match seed {
        Some(s) => Pcg64::seed_from_u64(s),
        None => Pcg64::from_entropy(),
    };
    let mut out = vec![vec![0.0; dims]; n_samples];
    for d in 0..dims {
        let mut strata: Vec<usize> = (0..n_samples).collect();
        strata.shuffle(&mut rng);
        for (i, stratum) in strata.iter().enumerate() {
            out[i][d] = (*stratum as f64 + rng.gen::<f64>()) / n_samples as f64;
        }
    }
    out
}

const HALTON_PRIMES: [usize; 25] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97,
];

/// Halton low-discrepancy sequence: the radical inverse of the sample
/// index in the d-th prime base, starting at index 1. Deterministic for
/// a fixed (dims, n_samples).
fn halton_unit(n_samples: usize, dims: usize) -> Result<Vec<Vec<f64>>, SampleError> {
    if dims > HALTON_PRIMES.len() {
        return Err(SampleError::TooManyDimensions {
            method: "halton",
            max: HALTON_PRIMES.len(),
            got: dims,
        });
    }
    Ok((0..n_samples)
        .map(|i| {
            (0..dims)
                .map(|d| radical_inverse(HALTON_PRIMES[d], i + 1))
                .collect()
        })
        .collect())
}

fn radical_inverse(base: usize, mut i: usize) -> f64 {
    let mut f = 1.0;
    let mut r = 0.0;
    while i > 0 {
        f /= base as f64;
        r += f * (i % base) as f64;
        i /= base;
    }
    r
}

/// Primitive-polynomial parameters (Joe & Kuo direction numbers) for the
/// Sobol dimensions after the first. `a` encodes the inner polynomial
/// coefficients; `m` the initial direction numbers.
struct SobolParams {
    a: u64,
    m: &'static [u64],
}

const SOBOL_PARAMS: [SobolParams; 20] = [
    SobolParams { a: 0, m: &[1] },
    SobolParams { a: 1, m: &[1, 3] },
    SobolParams { a: 1, m: &[1, 3, 1] },
    SobolParams { a: 2, m: &[1, 1, 1] },
    SobolParams { a: 1, m: &[1, 1, 3, 3] },
    SobolParams { a: 4, m: &[1, 3, 5, 13] },
    SobolParams { a: 2, m: &[1, 1, 5, 5, 17] },
    SobolParams { a: 4, m: &[1, 1, 5, 5, 5] },
    SobolParams { a: 7, m: &[1, 1, 7, 11, 19] },
    SobolParams { a: 11, m: &[1, 1, 5, 1, 1] },
    SobolParams { a: 13, m: &[1, 1, 1, 3, 11] },
    SobolParams { a: 14, m: &[1, 3, 5, 5, 31] },
    SobolParams { a: 1, m: &[1, 3, 3, 9, 7, 49] },
    SobolParams { a: 13, m: &[1, 1, 1, 15, 21, 21] },
    SobolParams { a: 16, m: &[1, 3, 1, 13, 27, 49] },
    SobolParams { a: 19, m: &[1, 1, 1, 15, 7, 5] },
    SobolParams { a: 22, m: &[1, 3, 1, 3, 25, 9] },
    SobolParams { a: 25, m: &[1, 1, 5, 5, 19, 61] },
    SobolParams { a: 1, m: &[1, 3, 7, 11, 23, 15, 103] },
    SobolParams { a: 4, m: &[1, 3, 7, 13, 55, 3, 113] },
];

const SOBOL_MAX_DIMS: usize = SOBOL_PARAMS.len() + 1;
const SOBOL_BITS: usize = 32;

/// Gray-code Sobol sequence, starting at the all-zeros point.
/// Deterministic for a fixed (dims, n_samples). Balance properties only
/// hold for power-of-two sample counts; this is not enforced.
fn sobol_unit(n_samples: usize, dims: usize) -> Result<Vec<Vec<f64>>, SampleError> {
    if dims > SOBOL_MAX_DIMS {
        return Err(SampleError::TooManyDimensions {
            method: "sobol",
            max: SOBOL_MAX_DIMS,
            got: dims,
        });
    }

    // Direction numbers scaled by 2^32.
    let mut v = vec![vec![0u64; SOBOL_BITS]; dims];
    for (j, directions) in v.iter_mut().enumerate() {
        if j == 0 {
            for (k, slot) in directions.iter_mut().enumerate() {
                *slot = 1u64 << (31 - k);
            }
            continue;
        }
        let params = &SOBOL_PARAMS[j - 1];
        let s = params.m.len();
        for k in 0..s.min(SOBOL_BITS) {
            directions[k] = params.m[k] << (31 - k);
        }
        for k in s..SOBOL_BITS {
            let mut value = directions[k - s] ^ (directions[k - s] >> s);
            for t in 1..s {
                if (params.a >> (s - 1 - t)) & 1 == 1 {
                    value ^= directions[k - t];
                }
            }
            directions[k] = value;
        }
    }

    let mut out = Vec::with_capacity(n_samples);
    let mut x = vec![0u64; dims];
    for i in 0..n_samples {
        if i > 0 {
            let c = (i - 1).trailing_ones() as usize;
            for (xj, vj) in x.iter_mut().zip(&v) {
                *xj ^= vj[c];
            }
        }
        out.push(x.iter().map(|xj| *xj as f64 / 4294967296.0).collect());
    }
    Ok(out)
}
