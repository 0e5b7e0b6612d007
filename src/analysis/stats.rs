//! Small descriptive and inferential statistics used by the cost report.

use serde::Serialize;

const BETA_MAX_ITERATIONS: usize = 300;
const BETA_EPSILON: f64 = 3.0e-14;
const BETA_FLOOR: f64 = 1.0e-300;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Unbiased (n - 1) sample variance.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some(sum_sq / (values.len() - 1) as f64)
}

/// Pearson correlation coefficient. `None` for mismatched lengths, fewer than
/// two pairs, or a constant series.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

/// Natural log of the gamma function for positive arguments.
pub fn ln_gamma(value: f64) -> f64 {
    if value <= 0.0 {
        return f64::NAN;
    }
    // Lanczos approximation (g=7, n=9)
    let lanczos_g = 7.0;
    #[allow(clippy::excessive_precision)]
    let coefficients = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_9,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if value < 0.5 {
        let pi = std::f64::consts::PI;
        return pi.ln() - (pi * value).sin().ln() - ln_gamma(1.0 - value);
    }

    let x_minus_one = value - 1.0;
    let mut base = coefficients[0];
    for (i, &c) in coefficients.iter().enumerate().skip(1) {
        base += c / (x_minus_one + i as f64);
    }
    let t = x_minus_one + lanczos_g + 0.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + t.ln() * (x_minus_one + 0.5) - t + base.ln()
}

/// Regularized incomplete beta function `I_x(a, b)`.
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    // The continued fraction converges fast only on this side of the mode.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

// Modified Lentz evaluation.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    let floor = |v: f64| if v.abs() < BETA_FLOOR { BETA_FLOOR } else { v };
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 / floor(1.0 - qab * x / qap);
    let mut h = d;
    for m in 1..=BETA_MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / floor(1.0 + even * d);
        c = floor(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / floor(1.0 + odd * d);
        c = floor(1.0 + odd / c);
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < BETA_EPSILON {
            break;
        }
    }
    h
}

/// Survival function `P(T > t)` of Student's t distribution.
pub fn student_t_sf(t: f64, degrees_of_freedom: f64) -> f64 {
    if t.is_nan() || degrees_of_freedom <= 0.0 {
        return f64::NAN;
    }
    let x = degrees_of_freedom / (degrees_of_freedom + t * t);
    let tail = 0.5 * regularized_incomplete_beta(degrees_of_freedom / 2.0, 0.5, x);
    if t >= 0.0 {
        tail
    } else {
        1.0 - tail
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alternative {
    /// Mean of the first sample is greater.
    Greater,
    Less,
    TwoSided,
}

impl std::fmt::Display for Alternative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Alternative::Greater => write!(f, "greater"),
            Alternative::Less => write!(f, "less"),
            Alternative::TwoSided => write!(f, "two-sided"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TTestResult {
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
    pub p_value: f64,
    pub alternative: Alternative,
}

/// Welch's unequal-variance two-sample t-test of `a` against `b`.
///
/// Returns `None` when either sample has fewer than two values or both
/// samples are constant, since the statistic is then undefined.
pub fn welch_t_test(a: &[f64], b: &[f64], alternative: Alternative) -> Option<TTestResult> {
    let (mean_a, mean_b) = (mean(a)?, mean(b)?);
    let se_a = sample_variance(a)? / a.len() as f64;
    let se_b = sample_variance(b)? / b.len() as f64;
    let se_sum = se_a + se_b;
    if se_sum <= 0.0 {
        return None;
    }

    let t_statistic = (mean_a - mean_b) / se_sum.sqrt();
    let degrees_of_freedom = se_sum * se_sum
        / (se_a * se_a / (a.len() - 1) as f64 + se_b * se_b / (b.len() - 1) as f64);
    let p_value = match alternative {
        Alternative::Greater => student_t_sf(t_statistic, degrees_of_freedom),
        Alternative::Less => student_t_sf(-t_statistic, degrees_of_freedom),
        Alternative::TwoSided => {
            (2.0 * student_t_sf(t_statistic.abs(), degrees_of_freedom)).min(1.0)
        }
    };

    Some(TTestResult {
        t_statistic,
        degrees_of_freedom,
        p_value,
        alternative,
    })
}
