//! Closed-form real-root extraction for low-degree polynomials.
//!
//! These are the numeric primitives behind the 7-point epipolar solver and
//! the P3P solvers. Keeping them here means the solvers themselves never
//! re-implement root-finding robustness.

use arrayvec::ArrayVec;

const COEFF_EPSILON: f64 = 1e-14;

/// Real roots of `a x^2 + b x + c = 0`.
///
/// Falls back to the linear solution when `a` vanishes. Uses the
/// numerically stable form that avoids cancellation between `-b` and the
/// discriminant root.
pub fn solve_quadratic_real(a: f64, b: f64, c: f64) -> ArrayVec<f64, 2> {
    let mut roots = ArrayVec::new();
    if a.abs() < COEFF_EPSILON {
        if b.abs() >= COEFF_EPSILON {
            roots.push(-c / b);
        }
        return roots;
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return roots;
    }
    let sq = disc.sqrt();
    let q = -0.5 * (b + b.signum() * sq);
    if q.abs() < COEFF_EPSILON {
        // b and the discriminant root cancelled; both roots coincide near zero.
        roots.push(0.0);
        return roots;
    }
    roots.push(q / a);
    roots.push(c / q);
    roots
}

/// Real roots of `a x^3 + b x^2 + c x + d = 0`.
///
/// Falls back to the quadratic solver when `a` vanishes. Uses Cardano's
/// formula for a single real root and the trigonometric method when all
/// three roots are real.
pub fn solve_cubic_real(a: f64, b: f64, c: f64, d: f64) -> ArrayVec<f64, 3> {
    let mut roots = ArrayVec::new();
    if a.abs() < COEFF_EPSILON {
        roots.extend(solve_quadratic_real(b, c, d));
        return roots;
    }
    // Normalize and depress: x = t - B/3 turns the cubic into t^3 + p t + q.
    let bn = b / a;
    let cn = c / a;
    let dn = d / a;
    let p = cn - bn * bn / 3.0;
    let q = 2.0 * bn * bn * bn / 27.0 - bn * cn / 3.0 + dn;
    let shift = -bn / 3.0;

    if p.abs() < COEFF_EPSILON && q.abs() < COEFF_EPSILON {
        roots.push(shift);
        return roots;
    }

    let half_q = 0.5 * q;
    let third_p = p / 3.0;
    let disc = half_q * half_q + third_p * third_p * third_p;
    if disc > 0.0 {
        // One real root.
        let sq = disc.sqrt();
        let t = (-half_q + sq).cbrt() + (-half_q - sq).cbrt();
        roots.push(t + shift);
    } else {
        // Three real roots (possibly repeated).
        let m = (-third_p).sqrt();
        let theta = (-half_q / (m * m * m)).clamp(-1.0, 1.0).acos() / 3.0;
        for k in 0..3 {
            let t = 2.0 * m * (theta - 2.0 * core::f64::consts::PI * k as f64 / 3.0).cos();
            roots.push(t + shift);
        }
    }
    roots
}

/// Real roots of `a x^4 + b x^3 + c x^2 + d x + e = 0` via Ferrari's method.
///
/// Falls back to the cubic solver when `a` vanishes.
pub fn solve_quartic_real(a: f64, b: f64, c: f64, d: f64, e: f64) -> ArrayVec<f64, 4> {
    let mut roots = ArrayVec::new();
    if a.abs() < COEFF_EPSILON {
        roots.extend(solve_cubic_real(b, c, d, e));
        return roots;
    }
    // Normalize and depress: x = y - B/4 turns the quartic into
    // y^4 + p y^2 + q y + r.
    let bn = b / a;
    let cn = c / a;
    let dn = d / a;
    let en = e / a;
    let p = cn - 3.0 * bn * bn / 8.0;
    let q = dn - bn * cn / 2.0 + bn * bn * bn / 8.0;
    let r = en - bn * dn / 4.0 + bn * bn * cn / 16.0 - 3.0 * bn * bn * bn * bn / 256.0;
    let shift = -bn / 4.0;

    if q.abs() < COEFF_EPSILON {
        // Biquadratic: solve z^2 + p z + r = 0 and take square roots.
        for z in solve_quadratic_real(1.0, p, r) {
            if z > 0.0 {
                let y = z.sqrt();
                roots.push(y + shift);
                roots.push(-y + shift);
            } else if z.abs() < COEFF_EPSILON {
                roots.push(shift);
            }
        }
        return roots;
    }

    // Resolvent cubic: m^3 + p m^2 + (p^2/4 - r) m - q^2/8 = 0. The product
    // of its roots is q^2/8 > 0, so a positive real root always exists.
    let m = solve_cubic_real(1.0, p, 0.25 * p * p - r, -q * q / 8.0)
        .into_iter()
        .filter(|&m| m > 0.0)
        .fold(f64::NAN, f64::max);
    if !m.is_finite() || m <= 0.0 {
        return roots;
    }
    let s = (2.0 * m).sqrt();
    let half = 0.5 * p + m;
    let offset = q / (2.0 * s);
    // (y^2 + p/2 + m)^2 = (s y - q/(2 s))^2 factors into two quadratics.
    for y in solve_quadratic_real(1.0, -s, half + offset) {
        roots.push(y + shift);
    }
    for y in solve_quadratic_real(1.0, s, half - offset) {
        roots.push(y + shift);
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(coeffs: &[f64], x: f64) -> f64 {
        coeffs.iter().fold(0.0, |acc, &c| acc * x + c)
    }

    #[test]
    fn quadratic_known_roots() {
        // (x - 3)(x + 5)
        let mut roots: Vec<f64> = solve_quadratic_real(1.0, 2.0, -15.0).into_iter().collect();
        roots.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(roots.len(), 2);
        assert_relative_eq!(roots[0], -5.0, epsilon = 1e-12);
        assert_relative_eq!(roots[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn quadratic_no_real_roots() {
        assert!(solve_quadratic_real(1.0, 0.0, 1.0).is_empty());
    }

    #[test]
    fn cubic_three_real_roots() {
        // (x - 1)(x - 2)(x + 4) = x^3 + x^2 - 10x + 8
        let coeffs = [1.0, 1.0, -10.0, 8.0];
        let roots = solve_cubic_real(coeffs[0], coeffs[1], coeffs[2], coeffs[3]);
        assert_eq!(roots.len(), 3);
        for root in roots {
            assert!(eval(&coeffs, root).abs() < 1e-9, "root {} not on curve", root);
        }
    }

    #[test]
    fn cubic_single_real_root() {
        // x^3 + x + 1 has a single real root near -0.6823
        let roots = solve_cubic_real(1.0, 0.0, 1.0, 1.0);
        assert_eq!(roots.len(), 1);
        assert_relative_eq!(roots[0], -0.6823278038280193, epsilon = 1e-9);
    }

    #[test]
    fn quartic_four_real_roots() {
        // (x - 1)(x + 1)(x - 2)(x + 3) = x^4 + x^3 - 7x^2 - x + 6
        let coeffs = [1.0, 1.0, -7.0, -1.0, 6.0];
        let mut roots: Vec<f64> =
            solve_quartic_real(coeffs[0], coeffs[1], coeffs[2], coeffs[3], coeffs[4])
                .into_iter()
                .collect();
        roots.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(roots.len(), 4);
        let expected = [-3.0, -1.0, 1.0, 2.0];
        for (root, want) in roots.iter().zip(expected) {
            assert_relative_eq!(*root, want, epsilon = 1e-9);
        }
    }

    #[test]
    fn quartic_biquadratic() {
        // x^4 - 5x^2 + 4 = (x^2 - 1)(x^2 - 4)
        let mut roots: Vec<f64> = solve_quartic_real(1.0, 0.0, -5.0, 0.0, 4.0)
            .into_iter()
            .collect();
        roots.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(roots.len(), 4);
        for (root, want) in roots.iter().zip([-2.0, -1.0, 1.0, 2.0]) {
            assert_relative_eq!(*root, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn degenerate_leading_coefficients_fall_through() {
        let roots = solve_quartic_real(0.0, 0.0, 1.0, 2.0, -15.0);
        assert_eq!(roots.len(), 2);
        let roots = solve_cubic_real(0.0, 0.0, 2.0, -4.0);
        assert_eq!(roots.len(), 1);
        assert_relative_eq!(roots[0], 2.0, epsilon = 1e-12);
    }
}
