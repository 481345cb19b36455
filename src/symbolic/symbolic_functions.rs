use crate::symbolic::symbolic_engine::Expr;
use crate::symbolic::utils::matching_size;
use log::debug;
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};

///
/// calculate symbolic jacobian and split residuals into their affine parts
/// Example#
/// ```rust, ignore
/// use dae_reduce::symbolic::symbolic_functions::Jacobian;
/// let mut jacobian_instance = Jacobian::new();
/// // residuals affine in der(x), der(y)
/// jacobian_instance.set_funcvecor_from_str(vec!["der(x) - y", "2*der(y) + x"])?;
/// jacobian_instance.set_variables(vec!["der(x)", "der(y)"]);
/// jacobian_instance.calc_jacobian();
/// // J * [der(x), der(y)] + F0 = 0
/// let (j, f0) = jacobian_instance.affine_split()?;
/// let rhs: Vec<Expr> = f0.iter().map(|f| -f.clone()).collect();
/// let solution = solve_linear_system(&j, &rhs)?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct Jacobian {
    pub vector_of_functions: Vec<Expr>, // vector of symbolic functions/expressions
    pub vector_of_variables: Vec<Expr>, // vector of symbolic variables
    pub variable_string: Vec<String>,   // vector of string representation of variables
    pub symbolic_jacobian: Vec<Vec<Expr>>, // vector of symbolic jacobian
}

impl Jacobian {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vectors(vector_of_functions: Vec<Expr>, variable_string: Vec<String>) -> Self {
        let vector_of_variables = variable_string.iter().map(|v| Expr::Var(v.clone())).collect();
        Self {
            vector_of_functions,
            vector_of_variables,
            variable_string,
            symbolic_jacobian: Vec::new(),
        }
    }

    pub fn set_funcvecor_from_str(&mut self, value: Vec<&str>) -> Result<(), String> {
        self.vector_of_functions = Expr::parse_vector_expression(value)?;
        Ok(())
    }

    pub fn set_variables(&mut self, varvec: Vec<&str>) {
        self.variable_string = varvec.iter().map(|v| v.to_string()).collect();
        self.vector_of_variables = varvec.iter().map(|v| Expr::Var(v.to_string())).collect();
    }

    /// calculate the symbolic jacobian in parallel
    pub fn calc_jacobian(&mut self) {
        let variable_string_vec = &self.variable_string;
        let new_jac: Vec<Vec<Expr>> = self
            .vector_of_functions
            .par_iter()
            .map(|func| {
                variable_string_vec
                    .par_iter()
                    .map(|var| func.diff(var).simplify())
                    .collect()
            })
            .collect();
        self.symbolic_jacobian = new_jac;
    }

    pub fn readable_jacobian(&self) -> Vec<Vec<String>> {
        self.symbolic_jacobian
            .iter()
            .map(|row| row.iter().map(|e| e.to_string()).collect())
            .collect()
    }

    /// true when the jacobian is the identity matrix (explicit form can be read off)
    pub fn is_identity(&self) -> bool {
        self.symbolic_jacobian.len() == self.variable_string.len()
            && self.symbolic_jacobian.iter().enumerate().all(|(i, row)| {
                row.iter().enumerate().all(|(j, e)| if i == j { e.is_one() } else { e.is_zero() })
            })
    }

    /// Number of equations that can be paired with distinct variables through
    /// structurally non-zero entries.
    pub fn structural_rank(&self) -> usize {
        let adjacency: Vec<Vec<usize>> = self
            .symbolic_jacobian
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .filter(|(_, e)| !e.is_zero())
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect();
        matching_size(&adjacency, self.variable_string.len())
    }

    /// Splits every function as `F = J * v + F0` with `F0 = F(v = 0)`.
    ///
    /// Fails with `(row, variable)` for the first function whose jacobian row still
    /// depends on one of the variables, i.e. the function is not affine in them.
    pub fn affine_split(&self) -> Result<(Vec<Vec<Expr>>, Vec<Expr>), (usize, String)> {
        for (i, row) in self.symbolic_jacobian.iter().enumerate() {
            for entry in row {
                if let Some(var) = self
                    .variable_string
                    .iter()
                    .find(|v| entry.contains_variable(v))
                {
                    return Err((i, var.clone()));
                }
            }
        }
        let zeros: HashMap<String, f64> = self
            .variable_string
            .iter()
            .map(|v| (v.clone(), 0.0))
            .collect();
        let remainder = self
            .vector_of_functions
            .iter()
            .map(|f| f.set_variable_from_map(&zeros).simplify())
            .collect();
        Ok((self.symbolic_jacobian.clone(), remainder))
    }
}

/// smallest admissible ratio of pivots of a row-equilibrated LU factorization
const SINGULARITY_TOLERANCE: f64 = 1e-12;
/// random points where a symbolic matrix is checked for singularity
const SAMPLE_POINTS: usize = 3;
const SAMPLE_SEED: u64 = 42;

/// Solves `A * x = b` for symbolic `A` and `b`.
///
/// A matrix of numerical constants is factorized numerically with nalgebra and the
/// solution is assembled as `x = A^-1 * b`; otherwise symbolic Gauss-Jordan
/// elimination is used. A symbolic matrix is first evaluated at a few random points:
/// if it is numerically singular at every admissible point the system is rejected,
/// since cancellations like `1 - x*(1/x)` survive simplification. Fails on singular
/// matrices.
pub fn solve_linear_system(a: &[Vec<Expr>], b: &[Expr]) -> Result<Vec<Expr>, String> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(format!("linear system is not square: {} rows, {} unknowns", a.len(), n));
    }
    if n == 0 {
        return Ok(Vec::new());
    }
    let numeric: Option<Vec<f64>> = a.iter().flatten().map(|e| e.as_const()).collect();
    match numeric {
        Some(values) => solve_numeric_matrix(n, &values, b),
        None => {
            let samples = SampledMatrix::new(a);
            if samples.is_singular() {
                return Err("matrix is singular at every sample point".to_string());
            }
            solve_symbolic_gauss(a, b, &samples)
        }
    }
}

/// True when the matrix has a zero row, a non-finite entry, or when the pivots of
/// the LU factorization of the row-equilibrated matrix span more than
/// `1/SINGULARITY_TOLERANCE`.
fn is_numerically_singular(matrix: &DMatrix<f64>) -> bool {
    if matrix.iter().any(|v| !v.is_finite()) {
        return true;
    }
    let mut scaled = matrix.clone();
    for mut row in scaled.row_iter_mut() {
        let largest = row.amax();
        if largest == 0.0 {
            return true;
        }
        row /= largest;
    }
    let diagonal = scaled.lu().u().diagonal();
    let largest = diagonal.amax();
    largest == 0.0 || diagonal.amin() / largest < SINGULARITY_TOLERANCE
}

fn solve_numeric_matrix(n: usize, row_major: &[f64], b: &[Expr]) -> Result<Vec<Expr>, String> {
    let matrix = DMatrix::from_row_slice(n, n, row_major);
    if is_numerically_singular(&matrix) {
        return Err("matrix is singular".to_string());
    }
    let inverse = matrix
        .lu()
        .try_inverse()
        .filter(|inv| inv.iter().all(|v| v.is_finite()))
        .ok_or_else(|| "matrix is singular".to_string())?;
    let solution = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| inverse[(i, j)] != 0.0)
                .map(|j| Expr::Const(inverse[(i, j)]) * b[j].clone())
                .reduce(|acc, term| acc + term)
                .unwrap_or(Expr::Const(0.0))
                .simplify()
        })
        .collect();
    Ok(solution)
}

/// A symbolic matrix evaluated at seeded random points, values in `[0.5, 2)`.
/// Points where an entry cannot be evaluated or is not finite are dropped.
struct SampledMatrix {
    variables: Vec<String>,
    points: Vec<Vec<f64>>,
    matrices: Vec<DMatrix<f64>>,
}

impl SampledMatrix {
    fn new(a: &[Vec<Expr>]) -> Self {
        let n = a.len();
        let mut names = BTreeSet::new();
        for entry in a.iter().flatten() {
            entry.collect_variables(&mut names);
        }
        let variables: Vec<String> = names.into_iter().collect();
        let vars: Vec<&str> = variables.iter().map(|s| s.as_str()).collect();
        let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
        let mut points = Vec::with_capacity(SAMPLE_POINTS);
        let mut matrices = Vec::with_capacity(SAMPLE_POINTS);
        for _ in 0..SAMPLE_POINTS {
            let point: Vec<f64> = vars.iter().map(|_| rng.random_range(0.5..2.0)).collect();
            let values: Result<Vec<f64>, String> = a
                .iter()
                .flatten()
                .map(|e| e.eval_expression(&vars, &point))
                .collect();
            match values {
                Ok(values) if values.iter().all(|v| v.is_finite()) => {
                    matrices.push(DMatrix::from_row_slice(n, n, &values));
                    points.push(point);
                }
                _ => debug!("sample point {:?} dropped", point),
            }
        }
        Self {
            variables,
            points,
            matrices,
        }
    }

    /// singular at every admissible point; no admissible point proves nothing
    fn is_singular(&self) -> bool {
        !self.matrices.is_empty() && self.matrices.iter().all(is_numerically_singular)
    }

    /// `entry` does not vanish at any admissible point, relative to the scale of the
    /// matrix there
    fn is_nonzero(&self, entry: &Expr) -> bool {
        let vars: Vec<&str> = self.variables.iter().map(|s| s.as_str()).collect();
        self.points.iter().zip(&self.matrices).all(|(point, matrix)| {
            entry
                .eval_expression(&vars, point)
                .is_ok_and(|v| v.is_finite() && v.abs() > SINGULARITY_TOLERANCE * matrix.amax())
        })
    }
}

fn solve_symbolic_gauss(
    a: &[Vec<Expr>],
    b: &[Expr],
    samples: &SampledMatrix,
) -> Result<Vec<Expr>, String> {
    let n = b.len();
    // augmented matrix [A | b]
    let mut m: Vec<Vec<Expr>> = a
        .iter()
        .zip(b)
        .map(|(row, rhs)| {
            let mut r = row.clone();
            r.push(rhs.clone());
            r
        })
        .collect();
    for col in 0..n {
        // constant pivots first, then entries that do not vanish at the sample points
        let pivot = (col..n)
            .find(|&r| m[r][col].as_const().is_some_and(|v| v != 0.0))
            .or_else(|| (col..n).find(|&r| !m[r][col].is_zero() && samples.is_nonzero(&m[r][col])))
            .ok_or_else(|| format!("matrix is singular in column {}", col))?;
        m.swap(col, pivot);
        for r in 0..n {
            if r == col || m[r][col].is_zero() {
                continue;
            }
            let factor = (m[r][col].clone() / m[col][col].clone()).simplify();
            for k in col..=n {
                let updated = (m[r][k].clone() - factor.clone() * m[col][k].clone()).simplify();
                m[r][k] = updated;
            }
        }
    }
    Ok((0..n)
        .map(|i| (m[i][n].clone() / m[i][i].clone()).simplify())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn jacobian(funcs: Vec<&str>, vars: Vec<&str>) -> Jacobian {
        let mut jac = Jacobian::new();
        jac.set_funcvecor_from_str(funcs).unwrap();
        jac.set_variables(vars);
        jac.calc_jacobian();
        jac
    }

    #[test]
    fn test_calc_jacobian() {
        let jac = jacobian(vec!["2*x^3+y", "1"], vec!["x", "y"]);
        let d00 = jac.symbolic_jacobian[0][0]
            .eval_expression(&["x", "y"], &[10.0, 2.0])
            .unwrap();
        assert_relative_eq!(d00, 600.0);
        assert_eq!(jac.symbolic_jacobian[0][1], Expr::Const(1.0));
        assert_eq!(jac.symbolic_jacobian[1][0], Expr::Const(0.0));
        assert_eq!(jac.readable_jacobian()[1][1], "0");
    }

    #[test]
    fn test_identity_and_affine_split() {
        let jac = jacobian(vec!["der(x) - y", "der(y) + x*y"], vec!["der(x)", "der(y)"]);
        assert!(jac.is_identity());
        let (_, f0) = jac.affine_split().unwrap();
        assert_eq!(f0[0], Expr::Const(-1.0) * Expr::Var("y".to_string()));
        assert_eq!(jac.structural_rank(), 2);
    }

    #[test]
    fn test_affine_split_rejects_nonlinear() {
        let jac = jacobian(vec!["der(x)", "der(y)^2 - x"], vec!["der(x)", "der(y)"]);
        assert_eq!(jac.affine_split().unwrap_err(), (1, "der(y)".to_string()));
    }

    #[test]
    fn test_structural_rank_deficient() {
        let jac = jacobian(vec!["a + b", "2*a + 2*b", "x"], vec!["a", "b", "c"]);
        assert_eq!(jac.structural_rank(), 2);
    }

    #[test]
    fn test_solve_numeric_system() {
        // x + y = p, x - y = q
        let jac = jacobian(vec!["x + y - p", "x - y - q"], vec!["x", "y"]);
        let (a, f0) = jac.affine_split().unwrap();
        let rhs: Vec<Expr> = f0.into_iter().map(|f| -f).collect();
        let sol = solve_linear_system(&a, &rhs).unwrap();
        let x = sol[0].eval_expression(&["p", "q"], &[3.0, 1.0]).unwrap();
        let y = sol[1].eval_expression(&["p", "q"], &[3.0, 1.0]).unwrap();
        assert_relative_eq!(x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_symbolic_system() {
        // k*x + y = 1, x + k*y = 0
        let jac = jacobian(vec!["k*x + y - 1", "x + k*y"], vec!["x", "y"]);
        let (a, f0) = jac.affine_split().unwrap();
        let rhs: Vec<Expr> = f0.into_iter().map(|f| -f).collect();
        let sol = solve_linear_system(&a, &rhs).unwrap();
        let k = 3.0;
        let x = sol[0].eval_expression(&["k"], &[k]).unwrap();
        let y = sol[1].eval_expression(&["k"], &[k]).unwrap();
        assert_relative_eq!(x, k / (k * k - 1.0), epsilon = 1e-12);
        assert_relative_eq!(y, -1.0 / (k * k - 1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_solve_singular() {
        let a = vec![
            vec![Expr::Const(1.0), Expr::Const(2.0)],
            vec![Expr::Const(2.0), Expr::Const(4.0)],
        ];
        let b = vec![Expr::Const(1.0), Expr::Const(1.0)];
        assert!(solve_linear_system(&a, &b).is_err());
        let a = vec![vec![Expr::Const(0.0)]];
        assert!(solve_linear_system(&a, &[Expr::Var("p".to_string())]).is_err());
    }

    #[test]
    fn test_solve_nearly_singular_numeric() {
        // z1 = 49*z2 + p, z2 = z1/49: rows are dependent up to rounding
        let jac = jacobian(vec!["z1 - 49*z2 - p", "z2 - z1/49"], vec!["z1", "z2"]);
        let (a, f0) = jac.affine_split().unwrap();
        assert!(a.iter().flatten().all(|e| e.as_const().is_some()));
        let rhs: Vec<Expr> = f0.into_iter().map(|f| -f).collect();
        assert!(solve_linear_system(&a, &rhs).is_err());
        // badly scaled but regular rows are fine
        let a = vec![
            vec![Expr::Const(1e-9), Expr::Const(0.0)],
            vec![Expr::Const(0.0), Expr::Const(1e6)],
        ];
        let b = vec![Expr::Const(1e-9), Expr::Const(2e6)];
        let sol = solve_linear_system(&a, &b).unwrap();
        assert_relative_eq!(sol[0].as_const().unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(sol[1].as_const().unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_solve_symbolic_singular() {
        // z1 = x*z2, z2 = z1/x: 1 - x*(1/x) does not simplify to zero
        let jac = jacobian(vec!["z1 - x*z2", "z2 - z1/x"], vec!["z1", "z2"]);
        let (a, f0) = jac.affine_split().unwrap();
        let rhs: Vec<Expr> = f0.into_iter().map(|f| -f).collect();
        assert!(solve_linear_system(&a, &rhs).is_err());
        // dependent rows with symbolic coefficients
        let jac = jacobian(vec!["k*a + b - x", "2*k*a + 2*b - y"], vec!["a", "b"]);
        let (a, f0) = jac.affine_split().unwrap();
        let rhs: Vec<Expr> = f0.into_iter().map(|f| -f).collect();
        assert!(solve_linear_system(&a, &rhs).is_err());
    }
}
