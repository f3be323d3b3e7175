//! Contact axis masks

use bitflags::bitflags;

bitflags! {
    /// World axes along which a tracked contact is active
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AxesMask: u8 {
        /// X axis
        const X = 1 << 0;
        /// Y axis
        const Y = 1 << 1;
        /// Z axis
        const Z = 1 << 2;
    }
}

impl AxesMask {
    /// Iterate the numeric axis indices (0 = x, 1 = y, 2 = z) set in the mask
    pub fn indices(self) -> impl Iterator<Item = usize> {
        [Self::X, Self::Y, Self::Z]
            .into_iter()
            .enumerate()
            .filter(move |(_, axis)| self.contains(*axis))
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices() {
        let mask = AxesMask::X | AxesMask::Z;
        let indices: Vec<usize> = mask.indices().collect();
        assert_eq!(indices, vec![0, 2]);
    }
}
