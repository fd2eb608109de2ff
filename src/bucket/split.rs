use std::collections::BTreeMap;

/// Chooses bucket widths for a set of sequence lengths.
///
/// Returns at most `max_buckets` strictly increasing widths whose last entry
/// covers the longest sequence, minimizing the padded cell count
/// `Σ width × members`. Zero lengths are treated as one so every bucket has a
/// usable width.
pub fn split_widths<I: IntoIterator<Item = usize>>(lengths: I, max_buckets: usize) -> Vec<usize> {
    let mut histogram = BTreeMap::<usize, usize>::new();
    for len in lengths {
        *histogram.entry(len.max(1)).or_default() += 1;
    }
    let distinct: Vec<(usize, usize)> = histogram.into_iter().collect();
    if distinct.is_empty() {
        return vec![1];
    }

    let m = distinct.len();
    let k = max_buckets.clamp(1, m);
    let mut prefix = vec![0usize; m + 1];
    for (i, (_, count)) in distinct.iter().enumerate() {
        prefix[i + 1] = prefix[i] + count;
    }
    // Cost of one bucket spanning distinct lengths `i..=j`.
    let cost = |i: usize, j: usize| distinct[j].0 * (prefix[j + 1] - prefix[i]);

    // best[b][j]: cheapest cover of `0..=j` with `b + 1` buckets ending at `j`.
    // start[b][j]: first distinct length of that last bucket.
    let mut best = vec![vec![usize::MAX; m]; k];
    let mut start = vec![vec![0usize; m]; k];
    for j in 0..m {
        best[0][j] = cost(0, j);
    }
    for b in 1..k {
        for j in b..m {
            for i in b..=j {
                let prev = best[b - 1][i - 1];
                if prev == usize::MAX {
                    continue;
                }
                let total = prev + cost(i, j);
                if total < best[b][j] {
                    best[b][j] = total;
                    start[b][j] = i;
                }
            }
        }
    }

    // Fewest buckets among the cheapest covers.
    let mut n_buckets = 0;
    for b in 1..k {
        if best[b][m - 1] < best[n_buckets][m - 1] {
            n_buckets = b;
        }
    }

    let mut widths = Vec::with_capacity(n_buckets + 1);
    let mut j = m - 1;
    for b in (0..=n_buckets).rev() {
        widths.push(distinct[j].0);
        if b > 0 {
            j = start[b][j] - 1;
        }
    }
    widths.reverse();
    widths
}

/// Padded cell count of `lengths` under `widths`.
pub fn padded_cells<I: IntoIterator<Item = usize>>(lengths: I, widths: &[usize]) -> usize {
    lengths
        .into_iter()
        .map(|len| {
            let b = widths.partition_point(|w| *w < len.max(1));
            widths.get(b).copied().unwrap_or(len)
        })
        .sum()
}
