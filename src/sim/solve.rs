use crate::error::{Error, Result};

/// Solves a dense linear system `A * x = b` using Gaussian elimination with
/// partial pivoting.
///
/// Intended for small systems (one unknown per mesh segment).
pub fn solve_dense(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = a.len();
    if n == 0 {
        return Ok(vec![]);
    }
    let mut problems = Vec::new();
    if b.len() != n {
        problems.push(format!("b has {} entries, expected {n}", b.len()));
    }
    for (i, row) in a.iter().enumerate() {
        if row.len() != n {
            problems.push(format!("A row {i} has {} entries, expected {n}", row.len()));
        }
    }
    if !problems.is_empty() {
        return Err(Error::ConfigValidation { problems });
    }

    // Forward elimination
    for col in 0..n {
        // Pivot selection
        let mut pivot_row = col;
        let mut pivot_val = a[col][col].abs();
        for (r, row) in a.iter().enumerate().skip(col + 1) {
            let v = row[col].abs();
            if v > pivot_val {
                pivot_val = v;
                pivot_row = r;
            }
        }

        if !(pivot_val > 1e-14) {
            return Err(Error::SingularSystem { column: col });
        }

        if pivot_row != col {
            a.swap(pivot_row, col);
            b.swap(pivot_row, col);
        }

        let pivot = a[col][col];
        for r in (col + 1)..n {
            let factor = a[r][col] / pivot;
            if factor == 0.0 {
                continue;
            }
            a[r][col] = 0.0;
            for c in (col + 1)..n {
                a[r][c] -= factor * a[col][c];
            }
            b[r] -= factor * b[col];
        }
    }

    // Back substitution
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut rhs = b[i];
        for j in (i + 1)..n {
            rhs -= a[i][j] * x[j];
        }
        x[i] = rhs / a[i][i];
    }

    for (i, xi) in x.iter().enumerate() {
        if !xi.is_finite() {
            return Err(Error::NumericalDomain {
                segment: i,
                time: f64::NAN,
                value: *xi,
                reason: "non-finite linear solution",
            });
        }
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_2x2() -> anyhow::Result<()> {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve_dense(a, vec![3.0, 5.0])?;
        assert_relative_eq!(x[0], 0.8, epsilon = 1e-12);
        assert_relative_eq!(x[1], 1.4, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_solve_needs_pivoting() -> anyhow::Result<()> {
        let a = vec![
            vec![0.0, 1.0, 1.0],
            vec![2.0, 0.0, 1.0],
            vec![1.0, 1.0, 0.0],
        ];
        let x = solve_dense(a, vec![5.0, 5.0, 3.0])?;
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[2], 3.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_singular_matrix() {
        let a = vec![vec![1.0, -1.0], vec![-1.0, 1.0]];
        assert!(matches!(
            solve_dense(a, vec![0.0, 0.0]),
            Err(Error::SingularSystem { column: 1 })
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = vec![vec![1.0, 0.0], vec![0.0]];
        assert!(matches!(
            solve_dense(a, vec![1.0]),
            Err(Error::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_empty_system() -> anyhow::Result<()> {
        assert!(solve_dense(vec![], vec![])?.is_empty());
        Ok(())
    }
}
