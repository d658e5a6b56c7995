//! The five-point relative orientation solver of Nister, using the
//! Groebner basis formulation from Stewenius, Engels and Nister,
//! "Recent developments on direct relative orientation".

use crate::{linear::Spectrum, EssentialMatrix};
use arrayvec::ArrayVec;
use mvg_core::{
    nalgebra::{
        dimension::{U10, U20, U4, U9},
        Matrix3, OMatrix, OVector, Point2, Vector3, Vector4,
    },
    FeatureMatch, GeometryError, HypothesisEstimator,
};

// Monomial ordering of the degree-3 polynomial ring in the nullspace
// coordinates (x, y, z). The action matrix construction below depends on
// this exact ordering.
const XXX: usize = 0;
const XXY: usize = 1;
const XYY: usize = 2;
const YYY: usize = 3;
const XXZ: usize = 4;
const XYZ: usize = 5;
const YYZ: usize = 6;
const XZZ: usize = 7;
const YZZ: usize = 8;
const ZZZ: usize = 9;
const XX: usize = 10;
const XY: usize = 11;
const YY: usize = 12;
const XZ: usize = 13;
const YZ: usize = 14;
const ZZ: usize = 15;
const X: usize = 16;
const Y: usize = 17;
const Z: usize = 18;
const ONE: usize = 19;

const SVD_CONVERGENCE: f64 = 1e-12;
const SVD_ITERATIONS: usize = 1000;
const NULL_THRESHOLD: f64 = 1e-12;

type Mono20 = OVector<f64, U20>;
type Nullspace = OMatrix<f64, U9, U4>;
type Constraints = OMatrix<f64, U10, U20>;
type Action = OMatrix<f64, U10, U10>;

/// Product of two degree-1 polynomials in (x, y, z, 1).
fn poly_product_1_1(a: Vector4<f64>, b: Vector4<f64>) -> Mono20 {
    let mut out = Mono20::zeros();
    out[XX] = a.x * b.x;
    out[XY] = a.x * b.y + a.y * b.x;
    out[XZ] = a.x * b.z + a.z * b.x;
    out[YY] = a.y * b.y;
    out[YZ] = a.y * b.z + a.z * b.y;
    out[ZZ] = a.z * b.z;
    out[X] = a.x * b.w + a.w * b.x;
    out[Y] = a.y * b.w + a.w * b.y;
    out[Z] = a.z * b.w + a.w * b.z;
    out[ONE] = a.w * b.w;
    out
}

/// Product of a degree-2 polynomial with a degree-1 polynomial.
fn poly_product_2_1(a: Mono20, b: Vector4<f64>) -> Mono20 {
    let mut out = Mono20::zeros();
    out[XXX] = a[XX] * b.x;
    out[XXY] = a[XX] * b.y + a[XY] * b.x;
    out[XXZ] = a[XX] * b.z + a[XZ] * b.x;
    out[XYY] = a[XY] * b.y + a[YY] * b.x;
    out[XYZ] = a[XY] * b.z + a[YZ] * b.x + a[XZ] * b.y;
    out[XZZ] = a[XZ] * b.z + a[ZZ] * b.x;
    out[YYY] = a[YY] * b.y;
    out[YYZ] = a[YY] * b.z + a[YZ] * b.y;
    out[YZZ] = a[YZ] * b.z + a[ZZ] * b.y;
    out[ZZZ] = a[ZZ] * b.z;
    out[XX] = a[XX] * b.w + a[X] * b.x;
    out[XY] = a[XY] * b.w + a[X] * b.y + a[Y] * b.x;
    out[XZ] = a[XZ] * b.w + a[X] * b.z + a[Z] * b.x;
    out[YY] = a[YY] * b.w + a[Y] * b.y;
    out[YZ] = a[YZ] * b.w + a[Y] * b.z + a[Z] * b.y;
    out[ZZ] = a[ZZ] * b.w + a[Z] * b.z;
    out[X] = a[X] * b.w + a[ONE] * b.x;
    out[Y] = a[Y] * b.w + a[ONE] * b.y;
    out[Z] = a[Z] * b.w + a[ONE] * b.z;
    out[ONE] = a[ONE] * b.w;
    out
}

/// Extract the four-dimensional nullspace of the epipolar constraint on the
/// five bearings, with the essential matrix unknowns laid out row-major.
fn epipolar_nullspace(
    a: &[Vector3<f64>; 5],
    b: &[Vector3<f64>; 5],
) -> Result<Nullspace, GeometryError> {
    let mut normal = OMatrix::<f64, U9, U9>::zeros();
    for (ap, bp) in a.iter().zip(b.iter()) {
        let mut row = OVector::<f64, U9>::zeros();
        for i in 0..3 {
            row.fixed_rows_mut::<3>(3 * i).copy_from(&(bp[i] * ap));
        }
        normal += &row * row.transpose();
    }
    let spectrum = Spectrum::new(normal).ok_or(GeometryError::DegenerateInput(
        "five-point normal matrix eigen decomposition failed",
    ))?;
    let nullity = (0..9)
        .map(|rank| spectrum.eigenvalue(rank))
        .take_while(|&e| e < NULL_THRESHOLD)
        .count();
    if nullity != 4 {
        return Err(GeometryError::DegenerateInput(
            "five-point sample does not span a four-dimensional nullspace",
        ));
    }
    let mut nullspace = Nullspace::zeros();
    for (rank, mut column) in nullspace.column_iter_mut().enumerate() {
        column.copy_from(&spectrum.eigenvector(rank));
    }
    Ok(nullspace)
}

/// Expand the rank and trace constraints of the essential manifold over the
/// nullspace parameterization, yielding 10 polynomial equations in the 20
/// degree-3 monomials.
fn manifold_constraints(nullspace: &Nullspace) -> Constraints {
    // Each entry of E is a degree-1 polynomial in the nullspace coordinates.
    let mut e = [[Vector4::zeros(); 3]; 3];
    for (i, row) in e.iter_mut().enumerate() {
        for (j, entry) in row.iter_mut().enumerate() {
            *entry = nullspace.row(3 * i + j).transpose();
        }
    }

    let mut constraints = Constraints::zeros();

    // det(E) = 0 expanded along the last row.
    constraints.row_mut(0).copy_from(
        &(poly_product_2_1(
            poly_product_1_1(e[0][1], e[1][2]) - poly_product_1_1(e[0][2], e[1][1]),
            e[2][0],
        ) + poly_product_2_1(
            poly_product_1_1(e[0][2], e[1][0]) - poly_product_1_1(e[0][0], e[1][2]),
            e[2][1],
        ) + poly_product_2_1(
            poly_product_1_1(e[0][0], e[1][1]) - poly_product_1_1(e[0][1], e[1][0]),
            e[2][2],
        ))
        .transpose(),
    );

    // E * E' as degree-2 polynomials; symmetric, so only the upper triangle
    // is computed.
    let mut gram = [[Mono20::zeros(); 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            if i <= j {
                gram[i][j] = poly_product_1_1(e[i][0], e[j][0])
                    + poly_product_1_1(e[i][1], e[j][1])
                    + poly_product_1_1(e[i][2], e[j][2]);
            } else {
                gram[i][j] = gram[j][i];
            }
        }
    }

    // (E E' - tr(E E') / 2 * I) * E = 0, one equation per entry.
    let half_trace = 0.5 * (gram[0][0] + gram[1][1] + gram[2][2]);
    let mut traceless = gram;
    for (i, row) in traceless.iter_mut().enumerate() {
        row[i] -= half_trace;
    }
    for i in 0..3 {
        for j in 0..3 {
            let entry = poly_product_2_1(traceless[i][0], e[0][j])
                + poly_product_2_1(traceless[i][1], e[1][j])
                + poly_product_2_1(traceless[i][2], e[2][j]);
            constraints.row_mut(1 + 3 * i + j).copy_from(&entry.transpose());
        }
    }

    constraints
}

/// The nullspace coordinate vector for a real eigenvalue of the action
/// matrix, taken from the nullspace of `A - lambda * I`.
fn action_eigenvector(action: &Action, lambda: f64) -> Option<OVector<f64, U10>> {
    (action - Action::from_diagonal_element(lambda))
        .try_svd(false, true, SVD_CONVERGENCE, SVD_ITERATIONS)
        .and_then(|svd| {
            if svd.singular_values[9] < NULL_THRESHOLD {
                Some(svd.v_t?.row(9).transpose())
            } else {
                None
            }
        })
}

fn essentials_from_action(action: Action, nullspace: Nullspace) -> ArrayVec<EssentialMatrix, 10> {
    let eigenvalues = action.complex_eigenvalues();
    let mut essentials = ArrayVec::new();
    for i in 0..eigenvalues.len() {
        let lambda = eigenvalues[i];
        if lambda.im != 0.0 {
            continue;
        }
        if let Some(coords) = action_eigenvector(&action, lambda.re) {
            // The last four entries are the (x, y, z, 1) nullspace weights.
            let weights = coords.fixed_rows::<4>(5).into_owned();
            let e = nullspace * weights;
            let mat = Matrix3::new(e[0], e[1], e[2], e[3], e[4], e[5], e[6], e[7], e[8]);
            let scale = mat.norm();
            if scale < NULL_THRESHOLD {
                continue;
            }
            essentials.push(EssentialMatrix(mat / scale));
        }
    }
    essentials
}

/// The minimal 5-point essential matrix solver.
///
/// Consumes the first 5 correspondences, which must be in normalized image
/// coordinates, and produces up to 10 essential matrix hypotheses. The
/// genuine 4-fold pose ambiguity of each hypothesis is resolved downstream
/// by cheirality testing; the hypothesis multiplicity here is resolved with
/// extra correspondences through [`mvg_core::Disambiguate`].
#[derive(Debug, Clone, Copy)]
pub struct EssentialNister5 {
    pub epsilon: f64,
    pub iterations: usize,
}

impl EssentialNister5 {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for EssentialNister5 {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            iterations: 1000,
        }
    }
}

impl HypothesisEstimator<FeatureMatch> for EssentialNister5 {
    type Model = EssentialMatrix;
    type ModelIter = ArrayVec<EssentialMatrix, 10>;

    fn min_samples(&self) -> usize {
        5
    }

    fn estimate(&self, data: &[FeatureMatch]) -> Result<Self::ModelIter, GeometryError> {
        if data.len() < 5 {
            return Err(GeometryError::DegenerateInput(
                "the 5-point algorithm requires 5 correspondences",
            ));
        }
        let bearing = |p: Point2<f64>| Vector3::new(p.x, p.y, 1.0).normalize();
        let mut a = [Vector3::zeros(); 5];
        let mut b = [Vector3::zeros(); 5];
        for (slot, m) in a.iter_mut().zip(data) {
            *slot = bearing(m.0);
        }
        for (slot, m) in b.iter_mut().zip(data) {
            *slot = bearing(m.1);
        }

        let nullspace = epipolar_nullspace(&a, &b)?;
        let constraints = manifold_constraints(&nullspace);

        // Gauss-Jordan elimination of the leading 10x10 block reduces the
        // system to the action of multiplication by x on the quotient ring.
        let reduced = constraints
            .fixed_slice::<10, 10>(0, 0)
            .full_piv_lu()
            .solve(&constraints.fixed_slice::<10, 10>(0, 10).into_owned())
            .ok_or(GeometryError::DegenerateInput(
                "five-point constraint system is rank deficient",
            ))?;

        let mut action = Action::zeros();
        action
            .fixed_slice_mut::<3, 10>(0, 0)
            .copy_from(&reduced.fixed_slice::<3, 10>(0, 0));
        action.row_mut(3).copy_from(&reduced.row(4));
        action.row_mut(4).copy_from(&reduced.row(5));
        action.row_mut(5).copy_from(&reduced.row(7));
        action[(6, 0)] = -1.0;
        action[(7, 1)] = -1.0;
        action[(8, 3)] = -1.0;
        action[(9, 6)] = -1.0;

        Ok(essentials_from_action(action, nullspace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_poly(v: Vector4<f64>) -> Mono20 {
        let mut out = Mono20::zeros();
        out[X] = v.x;
        out[Y] = v.y;
        out[Z] = v.z;
        out[ONE] = v.w;
        out
    }

    fn eval(p: Mono20, x: f64, y: f64, z: f64) -> f64 {
        p[XXX] * x * x * x
            + p[XXY] * x * x * y
            + p[XXZ] * x * x * z
            + p[XYY] * x * y * y
            + p[XYZ] * x * y * z
            + p[XZZ] * x * z * z
            + p[YYY] * y * y * y
            + p[YYZ] * y * y * z
            + p[YZZ] * y * z * z
            + p[ZZZ] * z * z * z
            + p[XX] * x * x
            + p[XY] * x * y
            + p[XZ] * x * z
            + p[YY] * y * y
            + p[YZ] * y * z
            + p[ZZ] * z * z
            + p[X] * x
            + p[Y] * y
            + p[Z] * z
            + p[ONE]
    }

    #[test]
    fn product_1_1_matches_pointwise_product() {
        let p1 = Vector4::new(0.4, -0.7, 0.3, 0.9);
        let p2 = Vector4::new(-0.2, 0.5, 0.85, 0.1);
        let product = poly_product_1_1(p1, p2);
        for &(x, y, z) in &[(0.0, 0.0, 0.0), (1.0, -2.0, 3.0), (-0.5, 0.25, 4.0)] {
            let direct = eval(constant_poly(p1), x, y, z) * eval(constant_poly(p2), x, y, z);
            assert!((eval(product, x, y, z) - direct).abs() < 1e-9);
        }
    }

    #[test]
    fn product_2_1_matches_pointwise_product() {
        let p1 = poly_product_1_1(
            Vector4::new(0.4, -0.7, 0.3, 0.9),
            Vector4::new(0.6, 0.2, -0.4, 0.35),
        );
        let p2 = Vector4::new(-0.2, 0.5, 0.85, 0.1);
        let product = poly_product_2_1(p1, p2);
        for &(x, y, z) in &[(1.0, 1.0, 1.0), (2.0, -1.0, 0.5), (-3.0, 0.1, 1.5)] {
            let direct = eval(p1, x, y, z) * eval(constant_poly(p2), x, y, z);
            assert!((eval(product, x, y, z) - direct).abs() < 1e-9);
        }
    }
}
