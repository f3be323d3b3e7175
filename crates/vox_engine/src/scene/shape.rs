//! Renderable voxel shape payload
//!
//! A transform node may carry a shape: local-space bounds plus a pending
//! geometry transaction. Edits made during a tick are buffered in the
//! transaction and only become visible when the commit pass applies them,
//! which may change the node's collider.

use crate::spatial::Aabb;

/// Renderable payload attached to a transform node
#[derive(Debug, Clone)]
pub struct Shape {
    /// Current local-space bounds
    bounds: Aabb,
    /// Buffered bounds edit, applied at commit
    pending_bounds: Option<Aabb>,
    /// Geometry buffers need regeneration
    buffers_dirty: bool,
}

impl Shape {
    /// Create a shape with the given local-space bounds
    pub fn new(bounds: Aabb) -> Self {
        Self {
            bounds,
            pending_bounds: None,
            buffers_dirty: true,
        }
    }

    /// Current local-space bounds
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Buffer a bounds change for the next commit pass
    pub fn set_pending_bounds(&mut self, bounds: Aabb) {
        self.pending_bounds = Some(bounds);
    }

    /// Whether an edit is waiting for commit
    pub fn has_pending_transaction(&self) -> bool {
        self.pending_bounds.is_some()
    }

    /// Apply the buffered edit; returns whether the bounds changed
    ///
    /// With `force`, buffers are marked for regeneration even without a
    /// pending edit (used by the standalone refresh path).
    pub fn apply_transaction(&mut self, force: bool) -> bool {
        if let Some(bounds) = self.pending_bounds.take() {
            let changed = bounds != self.bounds;
            self.bounds = bounds;
            self.buffers_dirty = true;
            changed
        } else {
            if force {
                self.buffers_dirty = true;
            }
            false
        }
    }

    /// Whether geometry buffers need regeneration
    pub fn buffers_dirty(&self) -> bool {
        self.buffers_dirty
    }

    /// Regenerate geometry buffers (deep-first, commit pass)
    pub fn refresh_buffers(&mut self) {
        if self.buffers_dirty {
            log::trace!("shape buffers refreshed");
            self.buffers_dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_transaction_applies_at_commit() {
        let mut shape = Shape::new(Aabb::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0)));
        let bigger = Aabb::new(Vec3::zeros(), Vec3::new(2.0, 2.0, 2.0));

        shape.set_pending_bounds(bigger);
        assert!(shape.has_pending_transaction());
        // Bounds unchanged until applied
        assert_ne!(shape.bounds(), bigger);

        assert!(shape.apply_transaction(false));
        assert_eq!(shape.bounds(), bigger);
        assert!(!shape.has_pending_transaction());

        // No pending edit: nothing changes
        assert!(!shape.apply_transaction(false));
    }

    #[test]
    fn test_refresh_buffers_clears_dirty() {
        let mut shape = Shape::new(Aabb::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0)));
        assert!(shape.buffers_dirty());
        shape.refresh_buffers();
        assert!(!shape.buffers_dirty());

        shape.apply_transaction(true);
        assert!(shape.buffers_dirty());
    }
}
