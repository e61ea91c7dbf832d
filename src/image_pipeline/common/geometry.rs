//! Integer points and rectangles in (vertical, horizontal) image space.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Point {
    pub v: i32,
    pub h: i32,
}

impl Point {
    pub const fn new(v: i32, h: i32) -> Self {
        Self { v, h }
    }
}

/// Half-open rectangle `[top, bottom) x [left, right)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rect {
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
}

impl Rect {
    pub const fn new(top: i32, left: i32, bottom: i32, right: i32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    pub fn from_size(height: u32, width: u32) -> Self {
        Self::new(0, 0, height as i32, width as i32)
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn size(&self) -> Point {
        Point::new(self.height() as i32, self.width() as i32)
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.top >= self.top
            && other.left >= self.left
            && other.bottom <= self.bottom
            && other.right <= self.right
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let r = Rect::new(
            self.top.max(other.top),
            self.left.max(other.left),
            self.bottom.min(other.bottom),
            self.right.min(other.right),
        );
        if r.is_empty() { Rect::default() } else { r }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_disjoint_is_empty() {
        let a = Rect::new(0, 0, 4, 4);
        let b = Rect::new(4, 4, 8, 8);
        assert!(a.intersect(&b).is_empty());
        assert_eq!(a.intersect(&Rect::new(2, 1, 10, 3)), Rect::new(2, 1, 4, 3));
    }
}
