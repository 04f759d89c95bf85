use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterpError {
    #[error("need at least two grid points, got {got}")]
    NotEnoughPoints { got: usize },
    #[error("grid is not strictly increasing at index {index}")]
    NotIncreasing { index: usize },
    #[error("grid has {x_len} points but values have {y_len}")]
    LengthMismatch { x_len: usize, y_len: usize },
}

/// Piecewise-linear interpolation of `(x, y)` onto the points `xi`.
///
/// `x` must be strictly increasing. Query points outside `[x[0], x[n-1]]`
/// are clamped to the boundary values rather than extrapolated; profile
/// edges are noisy enough without inventing values beyond them.
pub fn interp_linear(x: &[f64], y: &[f64], xi: &[f64]) -> Result<Vec<f64>, InterpError> {
    if x.len() < 2 {
        return Err(InterpError::NotEnoughPoints { got: x.len() });
    }
    if x.len() != y.len() {
        return Err(InterpError::LengthMismatch {
            x_len: x.len(),
            y_len: y.len(),
        });
    }
    for i in 1..x.len() {
        if x[i] <= x[i - 1] {
            return Err(InterpError::NotIncreasing { index: i });
        }
    }

    let mut out = Vec::with_capacity(xi.len());
    for &q in xi {
        if q <= x[0] {
            out.push(y[0]);
            continue;
        }
        if q >= x[x.len() - 1] {
            out.push(y[y.len() - 1]);
            continue;
        }
        // partition_point returns the first index with x[i] > q, so the
        // bracketing interval is [i-1, i].
        let i = x.partition_point(|&v| v <= q);
        let (x0, x1) = (x[i - 1], x[i]);
        let (y0, y1) = (y[i - 1], y[i]);
        out.push(y0 + (y1 - y0) * (q - x0) / (x1 - x0));
    }
    Ok(out)
}

/// Elementwise mean and standard error over equally-long sample vectors.
///
/// The error is the population standard deviation divided by sqrt(N);
/// for two runs this reduces to `|a - b| / (2 * sqrt(2))`. All slices
/// must share a length (the caller rebases onto a common grid first).
pub fn mean_and_stderr(samples: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let n = samples.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }
    let len = samples[0].len();
    let mut mean = Vec::with_capacity(len);
    let mut stderr = Vec::with_capacity(len);
    for j in 0..len {
        let m = samples.iter().map(|s| s[j]).sum::<f64>() / n as f64;
        let var = samples.iter().map(|s| (s[j] - m).powi(2)).sum::<f64>() / n as f64;
        mean.push(m);
        stderr.push(var.sqrt() / (n as f64).sqrt());
    }
    (mean, stderr)
}
