use std::collections::HashSet;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::str::FromStr;

use seahash::SeaHasher;

// ------------- Identity -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(u64);

pub type IdentityHasher = BuildHasherDefault<SeaHasher>;

pub const GENESIS: u64 = 0;

impl Identity {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
    pub const fn value(&self) -> u64 {
        self.0
    }
}
impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl FromStr for Identity {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Identity)
    }
}
impl From<u64> for Identity {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ------------- IdentityGenerator -------------
#[derive(Debug, Default)]
pub struct IdentityGenerator {
    lower_bound: u64,
    retained: HashSet<Identity, IdentityHasher>,
}

impl IdentityGenerator {
    pub fn new() -> Self {
        Self {
            lower_bound: GENESIS,
            retained: HashSet::default(),
        }
    }
    // Identities found in a restored store must be retained, so that
    // generation continues above the largest one seen.
    pub fn retain(&mut self, identity: Identity) {
        self.retained.insert(identity);
        if identity.0 > self.lower_bound {
            self.lower_bound = identity.0;
        }
    }
    pub fn check(&self, identity: Identity) -> bool {
        self.retained.contains(&identity)
    }
    // Identities are never handed out twice, not even after a delete, since
    // other documents may still hold them in foreign keys.
    pub fn generate(&mut self) -> Identity {
        self.lower_bound += 1;
        let identity = Identity(self.lower_bound);
        self.retained.insert(identity);
        identity
    }
    pub fn len(&self) -> usize {
        self.retained.len()
    }
    pub fn is_empty(&self) -> bool {
        self.retained.is_empty()
    }
}
