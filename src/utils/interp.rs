/// Piecewise-linear interpolation of `(xp, fp)` at `x`, with `xp` ascending.
/// Values outside the table take the nearest end value.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    // first index with xp[idx] > x
    let idx = xp[..n].partition_point(|&v| v <= x);
    let (x0, x1) = (xp[idx - 1], xp[idx]);
    let (y0, y1) = (fp[idx - 1], fp[idx]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// Like `interp`, but values outside the table continue the line through the two end points
/// instead of taking the end value.
pub fn interp_extrapolate(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    let end_line = |a: usize, b: usize| {
        if xp[b] == xp[a] {
            fp[a]
        } else {
            fp[a] + (fp[b] - fp[a]) * (x - xp[a]) / (xp[b] - xp[a])
        }
    };
    if n < 2 {
        interp(x, xp, fp)
    } else if x < xp[0] {
        end_line(0, 1)
    } else if x > xp[n - 1] {
        end_line(n - 2, n - 1)
    } else {
        interp(x, xp, fp)
    }
}

/// Sorts the `(x, y)` pairs by `x` so the table can be handed to `interp`.
pub fn sorted_table(xs: &[f64], ys: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut pairs: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    pairs.into_iter().unzip()
}

/// Averages consecutive blocks of `factor` samples. The incomplete tail block is dropped.
pub fn rebin(values: &[f64], factor: usize) -> Vec<f64> {
    if factor <= 1 {
        return values.to_vec();
    }
    values
        .chunks_exact(factor)
        .map(|chunk| chunk.iter().sum::<f64>() / factor as f64)
        .collect()
}
