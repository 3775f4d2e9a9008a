use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// One of the two logical sides the bus bridges.
///
/// Naming is positional: whatever is published on one side is delivered to
/// subscribers on the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    North,
    South,
}

impl Side {
    /// Returns the side that receives messages published on `self`.
    #[inline]
    pub fn opposite(self) -> Side {
        match self {
            Side::North => Side::South,
            Side::South => Side::North,
        }
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            Side::North => 0,
            Side::South => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::North => "north",
            Side::South => "south",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which directions of the bridge are enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    #[default]
    Bidirectional,
    NorthToSouth,
    SouthToNorth,
}

impl Topology {
    /// Whether a publish originating on `origin` may be routed.
    pub fn allows(self, origin: Side) -> bool {
        match self {
            Topology::Bidirectional => true,
            Topology::NorthToSouth => origin == Side::North,
            Topology::SouthToNorth => origin == Side::South,
        }
    }
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "bidirectional" | "both" => Ok(Topology::Bidirectional),
            "north_to_south" => Ok(Topology::NorthToSouth),
            "south_to_north" => Ok(Topology::SouthToNorth),
            other => Err(format!("unknown topology '{other}'")),
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Topology::Bidirectional => "bidirectional",
            Topology::NorthToSouth => "north_to_south",
            Topology::SouthToNorth => "south_to_north",
        })
    }
}
