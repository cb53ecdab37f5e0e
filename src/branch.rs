use std::fmt;
use std::str::FromStr;

/// A monitored release channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Branch {
    Stable,
    Testflight,
}

impl Branch {
    /// All branches, in the order a full pass checks them
    pub const ALL: [Branch; 2] = [Branch::Stable, Branch::Testflight];

    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Stable => "stable",
            Branch::Testflight => "testflight",
        }
    }

    pub fn is_testflight(&self) -> bool {
        matches!(self, Branch::Testflight)
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Branch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stable" => Ok(Branch::Stable),
            "testflight" => Ok(Branch::Testflight),
            other => Err(format!("unknown branch '{}'", other)),
        }
    }
}
