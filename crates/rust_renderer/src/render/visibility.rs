//! Per-object view and distance eligibility

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// Identifies a view: a window or an offscreen render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u32);

impl ViewId {
    /// View id used by offscreen renders
    pub const OFFSCREEN: Self = Self(u32::MAX);
}

/// Windows are views
pub type WindowId = ViewId;

/// Which views draw an object, and at what camera distances
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityInfo {
    /// Eligible views; empty means every view
    pub views: BTreeSet<ViewId>,
    /// Closer than this, the object is skipped
    pub min_distance: f32,
    /// Farther than this, the object is skipped
    pub max_distance: f32,
}

impl Default for VisibilityInfo {
    fn default() -> Self {
        Self {
            views: BTreeSet::new(),
            min_distance: 0.0,
            max_distance: f32::INFINITY,
        }
    }
}

impl Hash for VisibilityInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.views.hash(state);
        self.min_distance.to_bits().hash(state);
        self.max_distance.to_bits().hash(state);
    }
}

impl VisibilityInfo {
    /// Visible in every view at every distance
    pub fn everywhere() -> Self {
        Self::default()
    }

    /// Visible only in the given views
    pub fn only_in(views: impl IntoIterator<Item = ViewId>) -> Self {
        Self {
            views: views.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Builder-style distance range
    #[must_use]
    pub fn with_distance_range(mut self, min_distance: f32, max_distance: f32) -> Self {
        self.min_distance = min_distance;
        self.max_distance = max_distance;
        self
    }

    /// Whether `view` may draw this object at all
    pub fn in_view(&self, view: ViewId) -> bool {
        self.views.is_empty() || self.views.contains(&view)
    }

    /// Whether `distance` lies in the eligible range
    pub fn in_range(&self, distance: f32) -> bool {
        distance >= self.min_distance && distance <= self.max_distance
    }

    /// Whether `view` draws this object at `distance`
    pub fn applies(&self, view: ViewId, distance: f32) -> bool {
        self.in_view(view) && self.in_range(distance)
    }
}
