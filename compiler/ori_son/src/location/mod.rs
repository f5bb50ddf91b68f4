//! Memory location identities, kills and kill summaries.
//!
//! A [`LocationIdentity`] names a class of memory locations (for example
//! "field `next` of any object"). Two identities *overlap* when a write to
//! one may change the value read from the other. Two reserved identities
//! exist:
//!
//! - [`Immutable`](LocationIdentity::Immutable): never written after
//!   initialization, so it is never killed and overlaps nothing.
//! - [`Any`](LocationIdentity::Any): every mutable location. A kill of
//!   `Any` (a call, a safepoint) invalidates every mutable read.

use std::fmt;

use smallvec::{smallvec, SmallVec};

/// An opaque, overlap-testable token denoting a class of memory locations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocationIdentity {
    /// Every mutable location.
    Any,
    /// Locations that are never written after initialization.
    Immutable,
    /// A named class of mutable locations (a field, an array element kind).
    Field(u32),
}

impl LocationIdentity {
    /// Returns `true` for the reserved [`Any`](Self::Any) identity.
    #[inline]
    pub fn is_any(self) -> bool {
        self == Self::Any
    }

    /// Returns `true` for the reserved [`Immutable`](Self::Immutable) identity.
    #[inline]
    pub fn is_immutable(self) -> bool {
        self == Self::Immutable
    }

    /// Returns `true` if this location can be killed at all.
    #[inline]
    pub fn is_mutable(self) -> bool {
        !self.is_immutable()
    }

    /// Can a write to `self` change the value of a read from `other`?
    ///
    /// Immutable locations overlap nothing; `Any` overlaps every mutable
    /// location; named locations overlap only themselves.
    pub fn overlaps(self, other: LocationIdentity) -> bool {
        if self.is_immutable() || other.is_immutable() {
            return false;
        }
        self.is_any() || other.is_any() || self == other
    }
}

impl fmt::Display for LocationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("ANY"),
            Self::Immutable => f.write_str("IMMUTABLE"),
            Self::Field(id) => write!(f, "field#{id}"),
        }
    }
}

// ── Kills ───────────────────────────────────────────────────────────

/// The memory effect of a kill node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemoryKill {
    /// Kills a single location identity.
    Single(LocationIdentity),
    /// Kills several location identities at once.
    Multi(SmallVec<[LocationIdentity; 2]>),
}

impl MemoryKill {
    /// All killed location identities.
    pub fn locations(&self) -> &[LocationIdentity] {
        match self {
            Self::Single(location) => std::slice::from_ref(location),
            Self::Multi(locations) => locations,
        }
    }

    /// Does this kill invalidate reads of `location`?
    pub fn kills(&self, location: LocationIdentity) -> bool {
        self.locations().iter().any(|killed| killed.overlaps(location))
    }
}

// ── Kill summaries ──────────────────────────────────────────────────

/// Aggregated set of killed locations for a block, a loop, or a region
/// between two blocks.
///
/// Named locations are kept sorted and deduplicated so that iteration
/// (and therefore any dump of the set) is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum KillSet {
    /// Nothing is killed.
    #[default]
    None,
    /// The listed named locations are killed.
    Locations(SmallVec<[LocationIdentity; 4]>),
    /// Every mutable location is killed.
    Any,
}

impl KillSet {
    /// Returns `true` if no location is killed.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns `true` if every mutable location is killed.
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Record a kill of `location`.
    pub fn add(&mut self, location: LocationIdentity) {
        match location {
            LocationIdentity::Immutable => {}
            LocationIdentity::Any => *self = Self::Any,
            LocationIdentity::Field(_) => match self {
                Self::Any => {}
                Self::None => *self = Self::Locations(smallvec![location]),
                Self::Locations(locations) => {
                    if let Err(pos) = locations.binary_search(&location) {
                        locations.insert(pos, location);
                    }
                }
            },
        }
    }

    /// Record every location killed by `kill`.
    pub fn add_kill(&mut self, kill: &MemoryKill) {
        for &location in kill.locations() {
            self.add(location);
        }
    }

    /// Union `other` into `self`.
    pub fn add_all(&mut self, other: &KillSet) {
        match other {
            Self::None => {}
            Self::Any => *self = Self::Any,
            Self::Locations(locations) => {
                for &location in locations {
                    self.add(location);
                }
            }
        }
    }

    /// Can anything summarized by this set invalidate a read of `location`?
    pub fn can_kill(&self, location: LocationIdentity) -> bool {
        if location.is_immutable() {
            return false;
        }
        match self {
            Self::None => false,
            Self::Any => true,
            Self::Locations(locations) => {
                location.is_any() || locations.binary_search(&location).is_ok()
            }
        }
    }
}

impl fmt::Display for KillSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("{}"),
            Self::Any => f.write_str("{ANY}"),
            Self::Locations(locations) => {
                f.write_str("{")?;
                for (i, location) in locations.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{location}")?;
                }
                f.write_str("}")
            }
        }
    }
}
