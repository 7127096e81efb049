use crate::model::Object;

/// Affine transform `[a b c d e f]` in PDF column-vector convention.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub const fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    pub const fn translate(tx: f64, ty: f64) -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: tx,
            f: ty,
        }
    }

    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            b: 0.0,
            c: 0.0,
            d: sy,
            e: 0.0,
            f: 0.0,
        }
    }

    /// `self × other`: `other` is applied first, then `self`.
    pub fn multiply(self, other: Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }

    /// Moves the origin along the transformed x axis.
    pub fn advance(&mut self, distance: f64) {
        self.e += self.a * distance;
        self.f += self.b * distance;
    }

    pub fn from_operands(values: &[Object]) -> Option<Matrix> {
        if values.len() != 6 {
            return None;
        }
        Some(Matrix {
            a: values[0].as_f64().unwrap_or(1.0),
            b: values[1].as_f64().unwrap_or(0.0),
            c: values[2].as_f64().unwrap_or(0.0),
            d: values[3].as_f64().unwrap_or(1.0),
            e: values[4].as_f64().unwrap_or(0.0),
            f: values[5].as_f64().unwrap_or(0.0),
        })
    }

    pub fn to_array(self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectF {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl RectF {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    /// Reads a `[x0 y0 x1 y1]` array in any corner order.
    pub fn from_array(obj: &Object) -> Option<Self> {
        let arr = obj.as_array()?;
        if arr.len() < 4 {
            return None;
        }
        Some(Self::new(
            arr[0].as_f64()?,
            arr[1].as_f64()?,
            arr[2].as_f64()?,
            arr[3].as_f64()?,
        ))
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn intersects(&self, other: &RectF) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn union(&self, other: &RectF) -> RectF {
        RectF {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn expand(&self, dx: f64, dy: f64) -> RectF {
        RectF {
            min_x: self.min_x - dx,
            min_y: self.min_y - dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    /// Bounding box of this rectangle after `m`.
    pub fn transform(&self, m: Matrix) -> RectF {
        let corners = [
            m.apply(self.min_x, self.min_y),
            m.apply(self.max_x, self.min_y),
            m.apply(self.max_x, self.max_y),
            m.apply(self.min_x, self.max_y),
        ];
        let mut out = RectF::new(corners[0].0, corners[0].1, corners[0].0, corners[0].1);
        for (x, y) in corners.into_iter().skip(1) {
            out = out.union(&RectF::new(x, y, x, y));
        }
        out
    }

    /// Horizontal and vertical gap to `other`; zero on an axis where they overlap.
    pub fn gap_to(&self, other: &RectF) -> (f64, f64) {
        let gx = (other.min_x - self.max_x).max(self.min_x - other.max_x).max(0.0);
        let gy = (other.min_y - self.max_y).max(self.min_y - other.max_y).max(0.0);
        (gx, gy)
    }
}

/// Matrix that maps `bbox` onto `rect`, scaling each axis independently.
pub fn map_bbox_to_rect(bbox: RectF, rect: RectF) -> Matrix {
    let sx = if bbox.width() != 0.0 {
        rect.width() / bbox.width()
    } else {
        1.0
    };
    let sy = if bbox.height() != 0.0 {
        rect.height() / bbox.height()
    } else {
        1.0
    };
    Matrix {
        a: sx,
        b: 0.0,
        c: 0.0,
        d: sy,
        e: rect.min_x - bbox.min_x * sx,
        f: rect.min_y - bbox.min_y * sy,
    }
}

#[derive(Debug)]
enum Node {
    Leaf { bbox: RectF, items: Vec<usize> },
    Internal { bbox: RectF, children: Vec<usize> },
}

impl Node {
    fn bbox(&self) -> RectF {
        match self {
            Node::Leaf { bbox, .. } | Node::Internal { bbox, .. } => *bbox,
        }
    }
}

/// Static packed R-tree over a set of rectangles, bulk-loaded by `min_x`.
#[derive(Debug)]
pub struct RTree {
    rects: Vec<RectF>,
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl RTree {
    pub fn build(rects: Vec<RectF>, max_entries: usize) -> Self {
        let max_entries = max_entries.max(4);
        let mut indices: Vec<usize> = (0..rects.len()).collect();
        indices.sort_by(|&a, &b| rects[a].min_x.total_cmp(&rects[b].min_x));

        let mut nodes: Vec<Node> = Vec::new();
        let mut level: Vec<usize> = Vec::new();
        for chunk in indices.chunks(max_entries) {
            let bbox = chunk
                .iter()
                .skip(1)
                .fold(rects[chunk[0]], |acc, &idx| acc.union(&rects[idx]));
            level.push(nodes.len());
            nodes.push(Node::Leaf {
                bbox,
                items: chunk.to_vec(),
            });
        }

        while level.len() > 1 {
            level.sort_by(|&a, &b| nodes[a].bbox().min_x.total_cmp(&nodes[b].bbox().min_x));
            let mut next_level = Vec::with_capacity(level.len() / max_entries + 1);
            for chunk in level.chunks(max_entries) {
                let bbox = chunk
                    .iter()
                    .skip(1)
                    .fold(nodes[chunk[0]].bbox(), |acc, &idx| acc.union(&nodes[idx].bbox()));
                next_level.push(nodes.len());
                nodes.push(Node::Internal {
                    bbox,
                    children: chunk.to_vec(),
                });
            }
            level = next_level;
        }

        Self {
            root: level.first().copied(),
            rects,
            nodes,
        }
    }

    pub fn rect(&self, index: usize) -> Option<&RectF> {
        self.rects.get(index)
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Indices of every rectangle touching `query`, in ascending order.
    pub fn search(&self, query: &RectF) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        while let Some(idx) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { bbox, items } => {
                    if bbox.intersects(query) {
                        out.extend(
                            items
                                .iter()
                                .copied()
                                .filter(|&item| self.rects[item].intersects(query)),
                        );
                    }
                }
                Node::Internal { bbox, children } => {
                    if bbox.intersects(query) {
                        stack.extend(children.iter().copied());
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiply_applies_right_operand_first() {
        let scale = Matrix::scale(2.0, 2.0);
        let shift = Matrix::translate(10.0, 0.0);
        assert_eq!(scale.multiply(shift).apply(1.0, 1.0), (22.0, 2.0));
        assert_eq!(shift.multiply(scale).apply(1.0, 1.0), (12.0, 2.0));
    }

    #[test]
    fn bbox_maps_onto_rect() {
        let m = map_bbox_to_rect(
            RectF::new(0.0, 0.0, 100.0, 20.0),
            RectF::new(50.0, 700.0, 250.0, 720.0),
        );
        assert_eq!(m.apply(0.0, 0.0), (50.0, 700.0));
        assert_eq!(m.apply(100.0, 20.0), (250.0, 720.0));
    }

    #[test]
    fn gap_is_zero_when_overlapping() {
        let a = RectF::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(a.gap_to(&RectF::new(5.0, 5.0, 20.0, 20.0)), (0.0, 0.0));
        assert_eq!(a.gap_to(&RectF::new(30.0, 25.0, 40.0, 30.0)), (20.0, 15.0));
    }

    #[test]
    fn rtree_finds_only_touching_rects() {
        let rects: Vec<RectF> = (0..50)
            .map(|i| {
                let x = (i % 10) as f64 * 20.0;
                let y = (i / 10) as f64 * 20.0;
                RectF::new(x, y, x + 10.0, y + 10.0)
            })
            .collect();
        let tree = RTree::build(rects, 4);
        assert_eq!(tree.search(&RectF::new(21.0, 21.0, 29.0, 29.0)), vec![11]);
        assert!(tree.search(&RectF::new(500.0, 500.0, 600.0, 600.0)).is_empty());
        assert_eq!(tree.search(&RectF::new(0.0, 0.0, 200.0, 200.0)).len(), 50);
    }

    #[test]
    fn empty_tree_searches_cleanly() {
        let tree = RTree::build(Vec::new(), 8);
        assert!(tree.is_empty());
        assert!(tree.search(&RectF::new(0.0, 0.0, 1.0, 1.0)).is_empty());
    }
}
