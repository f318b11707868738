use std::fmt;

/// Stable identifier for one physical camera in the rig.
///
/// Identifiers are resolved once when calibration is loaded and carried
/// through every pipeline stage, so stages never rely on an implicit
/// array-position convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub usize);

impl CameraId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cam{}", self.0)
    }
}

/// Ordered roster of the rig's cameras.
///
/// Iteration order is the canonical feed order: every per-camera stage
/// of the pipeline processes cameras in this sequence.
#[derive(Debug, Clone)]
pub struct CameraRoster {
    ids: Vec<CameraId>,
}

impl CameraRoster {
    pub fn with_count(count: usize) -> Self {
        Self {
            ids: (0..count).map(CameraId).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CameraId> + '_ {
        self.ids.iter().copied()
    }

    pub fn ids(&self) -> &[CameraId] {
        &self.ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_preserves_order() {
        let roster = CameraRoster::with_count(4);
        let order: Vec<usize> = roster.iter().map(|id| id.index()).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn camera_id_display() {
        assert_eq!(CameraId(2).to_string(), "cam2");
    }
}
