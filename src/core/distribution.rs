/// Piecewise-constant distributions used for table-driven importance sampling
/// (triangle areas, bitmap texel weights).

#[derive(Clone)]
#[derive(Debug)]
pub struct Distribution1D {
    pdf: Vec<f32>,
    cdf: Vec<f32>,
    total: f32,
}

impl Distribution1D {
    pub fn new(weights: Vec<f32>) -> Self {
        let n = weights.len();
        let mut cdf = Vec::with_capacity(n + 1);
        cdf.push(0.0);
        for (i, w) in weights.iter().enumerate() {
            cdf.push(cdf[i] + w);
        }
        let total = cdf[n];

        let mut pdf = weights;
        if total > 0.0 {
            let inv = 1.0 / total;
            for v in &mut pdf {
                *v *= inv;
            }
            for v in &mut cdf {
                *v *= inv;
            }
        } else {
            // Degenerate input. Fall back to a uniform table so warp stays total.
            let uniform = 1.0 / n as f32;
            for (i, v) in pdf.iter_mut().enumerate() {
                *v = uniform;
                cdf[i + 1] = (i + 1) as f32 * uniform;
            }
        }
        cdf[n] = 1.0;

        Self { pdf, cdf, total }
    }

    pub fn len(&self) -> usize {
        self.pdf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pdf.is_empty()
    }

    pub fn total(&self) -> f32 {
        self.total
    }

    /// Maps a uniform variate to a cell index and remaps `u` to be uniform
    /// within that cell.
    pub fn warp(&self, u: &mut f32) -> usize {
        let idx = self.find(*u);
        let lo = self.cdf[idx];
        let hi = self.cdf[idx + 1];
        if hi > lo {
            *u = (*u - lo) / (hi - lo);
        }
        idx
    }

    /// Discrete probability of the given cell.
    pub fn pdf(&self, idx: usize) -> f32 {
        self.pdf[idx]
    }

    fn find(&self, u: f32) -> usize {
        // Largest index with cdf[idx] <= u.
        let mut lo = 0;
        let mut hi = self.pdf.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.cdf[mid + 1] <= u {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo.min(self.pdf.len() - 1)
    }
}

/// Row-major 2D distribution: a marginal over rows and one conditional
/// distribution per row.
#[derive(Clone)]
#[derive(Debug)]
pub struct Distribution2D {
    conditional: Vec<Distribution1D>,
    marginal: Distribution1D,
    w: usize,
    h: usize,
}

impl Distribution2D {
    pub fn new(weights: Vec<f32>, w: usize, h: usize) -> Self {
        debug_assert_eq!(weights.len(), w * h);
        let conditional: Vec<Distribution1D> = weights
            .chunks(w)
            .map(|row| Distribution1D::new(row.to_vec()))
            .collect();
        let marginal = Distribution1D::new(conditional.iter().map(Distribution1D::total).collect());
        Self {
            conditional,
            marginal,
            w,
            h,
        }
    }

    pub fn width(&self) -> usize {
        self.w
    }

    pub fn height(&self) -> usize {
        self.h
    }

    /// Maps a uniform point on the unit square to a (row, column) cell,
    /// leaving `uv` uniform within the chosen cell.
    pub fn warp(&self, uv: &mut glam::Vec2) -> (usize, usize) {
        let row = self.marginal.warp(&mut uv.y);
        let col = self.conditional[row].warp(&mut uv.x);
        (row, col)
    }

    /// Discrete probability of one cell; sums to 1 over all cells.
    pub fn pdf(&self, row: usize, col: usize) -> f32 {
        let row = row.min(self.h - 1);
        let col = col.min(self.w - 1);
        self.marginal.pdf(row) * self.conditional[row].pdf(col)
    }
}
