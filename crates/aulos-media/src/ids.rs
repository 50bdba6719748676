/// Handle to a [`Period`](crate::Period) within its manifest.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PeriodId(pub u32);

/// Handle to an [`Adaptation`](crate::Adaptation) within its manifest.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AdaptationId(pub u32);

/// Handle to a [`Representation`](crate::Representation) within its manifest.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RepresentationId(pub u32);

impl std::fmt::Display for PeriodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "period#{}", self.0)
    }
}

impl std::fmt::Display for AdaptationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "adaptation#{}", self.0)
    }
}

impl std::fmt::Display for RepresentationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "representation#{}", self.0)
    }
}
