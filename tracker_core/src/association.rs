//! Data association: bipartite graph construction, connected-component
//! partitioning (union-find), and Hungarian assignment.
//!
//! # Algorithm pipeline
//! 1. For each (track, detection) pair that passed gating, add an edge
//!    to the sparse bipartite graph.
//! 2. Partition the graph into **connected components** using union-find.
//!    Components share no candidate pair, so solving each one optimally
//!    solves the whole frame optimally.
//! 3. Solve each component with the **Hungarian algorithm** (Jonker-Volgenant
//!    style O(n³) implementation), maximizing the number of matched pairs
//!    first and minimizing their summed cost second.
//!
//! # Determinism
//! Rows are tracks in ascending identity order and columns are detections in
//! input order. After the optimum is known, rows are pinned one at a time in
//! ascending order to the lowest column that still admits an optimal
//! matching, so equal-cost alternatives resolve toward the lowest track,
//! then the lowest detection.

use nalgebra::DMatrix;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Bipartite graph
// ---------------------------------------------------------------------------

/// A gate-passing association candidate.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignEdge {
    pub track_idx: usize,
    pub det_idx: usize,
    /// Gating cost (Euclidean or Mahalanobis distance)
    pub cost: f64,
}

/// Sparse bipartite graph: edges between track rows and detection indices.
#[derive(Clone, Debug, Default)]
pub struct BipartiteGraph {
    pub edges: Vec<AssignEdge>,
    pub n_tracks: usize,
    pub n_dets: usize,
}

impl BipartiteGraph {
    pub fn new(n_tracks: usize, n_dets: usize) -> Self {
        Self {
            edges: Vec::new(),
            n_tracks,
            n_dets,
        }
    }

    /// Add an edge (gate-passed association candidate).
    pub fn add_edge(&mut self, track_idx: usize, det_idx: usize, cost: f64) {
        debug_assert!(track_idx < self.n_tracks && det_idx < self.n_dets);
        self.edges.push(AssignEdge {
            track_idx,
            det_idx,
            cost,
        });
    }

    /// True if no edges exist: nothing can be matched.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Union-Find (path compression + union by rank)
// ---------------------------------------------------------------------------

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]]; // path halving
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, x: usize, y: usize) {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return;
        }
        match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => self.parent[rx] = ry,
            std::cmp::Ordering::Greater => self.parent[ry] = rx,
            std::cmp::Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
            }
        }
    }
}

/// A single connected component in the bipartite graph.
#[derive(Clone, Debug, Default)]
pub struct Component {
    /// Sorted, deduplicated track rows
    pub track_indices: Vec<usize>,
    /// Sorted, deduplicated detection indices
    pub det_indices: Vec<usize>,
    pub edges: Vec<AssignEdge>,
}

/// Partition the bipartite graph into connected components.
///
/// We treat tracks and detections as nodes in a combined graph:
/// - Track i     → node i
/// - Detection j → node n_tracks + j
///
/// Components come back ordered by their lowest track row.
pub fn partition_components(graph: &BipartiteGraph) -> Vec<Component> {
    let n_total = graph.n_tracks + graph.n_dets;
    let mut uf = UnionFind::new(n_total);

    for e in &graph.edges {
        uf.union(e.track_idx, graph.n_tracks + e.det_idx);
    }

    // Group edges by component root
    let mut comp_map: BTreeMap<usize, Component> = BTreeMap::new();
    for e in &graph.edges {
        let root = uf.find(e.track_idx);
        comp_map.entry(root).or_default().edges.push(e.clone());
    }

    let mut components: Vec<Component> = comp_map
        .into_values()
        .map(|mut comp| {
            comp.track_indices = comp.edges.iter().map(|e| e.track_idx).collect();
            comp.track_indices.sort_unstable();
            comp.track_indices.dedup();
            comp.det_indices = comp.edges.iter().map(|e| e.det_idx).collect();
            comp.det_indices.sort_unstable();
            comp.det_indices.dedup();
            comp
        })
        .collect();
    components.sort_by_key(|c| c.track_indices[0]);
    components
}

// ---------------------------------------------------------------------------
// Hungarian algorithm: O(n³) Kuhn-Munkres
// ---------------------------------------------------------------------------

/// Optimal assignment over a cost matrix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Matching {
    /// (row, col) pairs, ascending by row
    pub pairs: Vec<(usize, usize)>,
    /// Sum of the matched entries
    pub total_cost: f64,
}

/// Solve the rectangular assignment problem over `cost`.
///
/// Non-finite entries are forbidden pairs. Among all matchings that use only
/// permitted entries, the result has the largest possible number of pairs
/// and, among those, the smallest total cost. Among equally good matchings
/// it returns the lexicographically smallest one: row 0 takes the lowest
/// column it can while staying optimal, then row 1, and so on.
pub fn solve_assignment(cost: &DMatrix<f64>) -> Matching {
    let best = solve_unordered(cost);
    if best.pairs.is_empty() {
        return best;
    }
    let tolerance = 1e-9 * best.total_cost.abs().max(1.0);
    let is_optimal =
        |m: &Matching| m.pairs.len() == best.pairs.len() && m.total_cost <= best.total_cost + tolerance;

    let (rows, cols) = cost.shape();
    let mut work = cost.clone();
    // Optimal matching consistent with every pin made so far
    let mut current = best.clone();
    let mut pairs = Vec::with_capacity(best.pairs.len());

    for r in 0..rows {
        let held = current.pairs.iter().find(|&&(pr, _)| pr == r).map(|&(_, c)| c);
        let mut pinned = None;
        // Columns above the one `current` already holds cannot beat it
        for c in 0..held.unwrap_or(cols) {
            if !work[(r, c)].is_finite() {
                continue;
            }
            let trial = pin(&work, r, c);
            let m = solve_unordered(&trial);
            if is_optimal(&m) {
                work = trial;
                current = m;
                pinned = Some(c);
                break;
            }
        }
        match pinned.or(held) {
            Some(c) => {
                if pinned.is_none() {
                    work = pin(&work, r, c);
                }
                pairs.push((r, c));
            }
            None => work.row_mut(r).fill(f64::INFINITY),
        }
    }

    Matching {
        total_cost: pairs.iter().map(|&(r, c)| cost[(r, c)]).sum(),
        pairs,
    }
}

/// Copy of `cost` where row `r` may only take column `c`.
fn pin(cost: &DMatrix<f64>, r: usize, c: usize) -> DMatrix<f64> {
    let mut out = cost.clone();
    let keep = out[(r, c)];
    out.row_mut(r).fill(f64::INFINITY);
    out.column_mut(c).fill(f64::INFINITY);
    out[(r, c)] = keep;
    out
}

/// Some optimal matching over `cost`, without a tie-break guarantee.
fn solve_unordered(cost: &DMatrix<f64>) -> Matching {
    let (rows, cols) = cost.shape();
    let finite = || cost.iter().copied().filter(|c| c.is_finite());
    let (Some(lo), Some(hi)) = (
        finite().min_by(f64::total_cmp),
        finite().max_by(f64::total_cmp),
    ) else {
        return Matching::default();
    };

    // A forbidden cell must be worse than any difference real cells can make:
    // F > hi + (m − 1)·(hi − lo) for m real cells in a complete assignment.
    let n = rows.max(cols);
    let m = rows.min(cols) as f64;
    let forbidden = hi + m * (hi - lo) + 1.0;

    // Square n×n, row-major. Padding rows/cols cost 0 so they never bias the choice.
    let mut square = vec![0.0; n * n];
    for r in 0..rows {
        for c in 0..cols {
            let v = cost[(r, c)];
            square[r * n + c] = if v.is_finite() { v } else { forbidden };
        }
    }

    let row_assign = run_hungarian(&square, n);

    let mut matching = Matching::default();
    for (r, &c) in row_assign.iter().enumerate().take(rows) {
        if c < cols && cost[(r, c)].is_finite() {
            matching.pairs.push((r, c));
            matching.total_cost += cost[(r, c)];
        }
    }
    matching
}

/// Core Hungarian algorithm on a square n×n cost matrix (row-major).
/// Returns row_assignment[row] = assigned_column.
fn run_hungarian(cost: &[f64], n: usize) -> Vec<usize> {
    // Potentials for rows (u) and columns (v)
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    // p[j] = row assigned to column j (1-indexed, 0 = none)
    let mut p = vec![0usize; n + 1];
    // way[j] = previous column in augmenting path
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;
            for j in 1..=n {
                if !used[j] {
                    let val = cost[(i0 - 1) * n + (j - 1)] - u[i0] - v[j];
                    if val < minv[j] {
                        minv[j] = val;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Augment
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    // Decode: p[j] = row for column j (1-indexed)
    let mut row_assign = vec![0usize; n];
    for j in 1..=n {
        if p[j] != 0 {
            row_assign[p[j] - 1] = j - 1;
        }
    }
    row_assign
}

// ---------------------------------------------------------------------------
// Frame association
// ---------------------------------------------------------------------------

/// Outcome of associating one frame: three disjoint, ascending sets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Association {
    /// (track_idx, det_idx) matched pairs
    pub matches: Vec<(usize, usize)>,
    /// Track rows without a detection this frame
    pub unmatched_tracks: Vec<usize>,
    /// Detection indices not claimed by any track
    pub unmatched_detections: Vec<usize>,
}

/// Solve one component exactly, returning global (track_idx, det_idx) pairs.
pub fn solve_component(component: &Component) -> Vec<(usize, usize)> {
    let nt = component.track_indices.len();
    let nd = component.det_indices.len();
    let mut cost = DMatrix::from_element(nt, nd, f64::INFINITY);

    for e in &component.edges {
        if let (Ok(ri), Ok(ci)) = (
            component.track_indices.binary_search(&e.track_idx),
            component.det_indices.binary_search(&e.det_idx),
        ) {
            cost[(ri, ci)] = e.cost;
        }
    }

    solve_assignment(&cost)
        .pairs
        .into_iter()
        .map(|(ri, ci)| (component.track_indices[ri], component.det_indices[ci]))
        .collect()
}

/// Associate every track row with at most one detection over the gated graph.
pub fn associate(graph: &BipartiteGraph) -> Association {
    let mut matches: Vec<(usize, usize)> = partition_components(graph)
        .iter()
        .flat_map(solve_component)
        .collect();
    matches.sort_unstable();

    let mut track_used = vec![false; graph.n_tracks];
    let mut det_used = vec![false; graph.n_dets];
    for &(t, d) in &matches {
        track_used[t] = true;
        det_used[d] = true;
    }

    Association {
        matches,
        unmatched_tracks: (0..graph.n_tracks).filter(|&t| !track_used[t]).collect(),
        unmatched_detections: (0..graph.n_dets).filter(|&d| !det_used[d]).collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
