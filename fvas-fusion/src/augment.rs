//! Polynomial feature augmentation

use crate::matrix::ScoreMatrix;

/// Width after augmenting `d` columns
pub fn augmented_width(d: usize) -> usize {
    d + d * (d + 1) / 2
}

/// Input columns followed by every product `x_i * x_j` with `i <= j`, `i` outer
pub fn augment(matrix: &ScoreMatrix) -> ScoreMatrix {
    let d = matrix.n_cols();
    let width = augmented_width(d);
    let mut data = Vec::with_capacity(matrix.n_rows() * width);
    for row in matrix.rows() {
        data.extend_from_slice(row);
        for i in 0..d {
            for j in i..d {
                data.push(row[i] * row[j]);
            }
        }
    }
    ScoreMatrix::from_raw(data, width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_and_prefix() {
        let m = ScoreMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![-1.0, 0.5, 2.0]]).unwrap();
        let aug = augment(&m);
        assert_eq!(aug.n_cols(), 3 + 6);
        assert_eq!(&aug.row(0)[..3], m.row(0));
        assert_eq!(&aug.row(1)[..3], m.row(1));
    }

    #[test]
    fn test_product_order() {
        let m = ScoreMatrix::from_rows(&[vec![2.0, 3.0]]).unwrap();
        // x0, x1, x0*x0, x0*x1, x1*x1
        assert_eq!(augment(&m).row(0), &[2.0, 3.0, 4.0, 6.0, 9.0]);
    }

    #[test]
    fn test_augmented_width() {
        assert_eq!(augmented_width(1), 2);
        assert_eq!(augmented_width(2), 5);
        assert_eq!(augmented_width(4), 14);
    }
}
