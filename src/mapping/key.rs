use std::fmt;

/// Namespace of one local trajectory (one robot / UWB tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrajectoryId(pub u32);

impl fmt::Display for TrajectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// Pose variable key: trajectory namespace plus local sequence index.
///
/// Indices start at 1 for the first pose of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoseKey {
    pub trajectory: TrajectoryId,
    pub index: u32,
}

impl PoseKey {
    pub fn new(trajectory: TrajectoryId, index: u32) -> PoseKey {
        PoseKey { trajectory, index }
    }

    pub fn next(&self) -> PoseKey {
        PoseKey::new(self.trajectory, self.index + 1)
    }
}

impl fmt::Display for PoseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.trajectory, self.index)
    }
}
