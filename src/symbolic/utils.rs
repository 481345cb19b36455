use std::collections::VecDeque;

/// `num_values` evenly spaced points from `start` to `end`, both included.
pub fn linspace(start: f64, end: f64, num_values: usize) -> Vec<f64> {
    if num_values == 1 {
        return vec![start];
    }
    let mut values = Vec::with_capacity(num_values);
    let step = (end - start) / (num_values as f64 - 1.0);

    for i in 0..num_values {
        let value = start + (i as f64 * step);
        values.push(value);
    }
    // pin the last point against rounding
    if let Some(last) = values.last_mut() {
        *last = end;
    }
    values
}

/// Maximum matching of a bipartite graph given as row -> admissible columns.
///
/// Returns, for every row, the column it is matched to. Augmenting paths are
/// searched breadth-first, so the recursion depth does not grow with the size
/// of the system.
pub fn max_bipartite_matching(adjacency: &[Vec<usize>], n_cols: usize) -> Vec<Option<usize>> {
    let mut row_match: Vec<Option<usize>> = vec![None; adjacency.len()];
    let mut col_match: Vec<Option<usize>> = vec![None; n_cols];

    for root in 0..adjacency.len() {
        // came_from[col] = row through which the search reached col
        let mut came_from: Vec<Option<usize>> = vec![None; n_cols];
        let mut queue = VecDeque::from([root]);
        let mut free_col = None;
        'search: while let Some(row) = queue.pop_front() {
            for &col in &adjacency[row] {
                if col >= n_cols || came_from[col].is_some() {
                    continue;
                }
                came_from[col] = Some(row);
                match col_match[col] {
                    None => {
                        free_col = Some(col);
                        break 'search;
                    }
                    Some(next_row) => queue.push_back(next_row),
                }
            }
        }
        // flip the augmenting path
        let mut col = free_col;
        while let Some(c) = col {
            let Some(row) = came_from[c] else { break };
            let previous = row_match[row];
            row_match[row] = Some(c);
            col_match[c] = Some(row);
            col = previous;
        }
    }
    row_match
}

/// Size of a maximum matching.
pub fn matching_size(adjacency: &[Vec<usize>], n_cols: usize) -> usize {
    max_bipartite_matching(adjacency, n_cols)
        .iter()
        .filter(|m| m.is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linspace() {
        let grid = linspace(0.0, 1.0, 5);
        assert_eq!(grid, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(2.0, 3.0, 1), vec![2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(*linspace(0.0, 0.3, 4).last().unwrap(), 0.3);
    }

    #[test]
    fn test_matching_needs_augmenting_path() {
        // row 0 can take 0 or 1, row 1 only 0: greedy choice must be undone
        let adjacency = vec![vec![0, 1], vec![0]];
        let m = max_bipartite_matching(&adjacency, 2);
        assert_eq!(m, vec![Some(1), Some(0)]);
    }

    #[test]
    fn test_matching_deficient() {
        let adjacency = vec![vec![0], vec![0], vec![1, 2]];
        assert_eq!(matching_size(&adjacency, 3), 2);
        let empty: Vec<Vec<usize>> = vec![vec![], vec![]];
        assert_eq!(matching_size(&empty, 2), 0);
    }
}
