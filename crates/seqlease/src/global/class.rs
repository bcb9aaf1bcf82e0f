use crate::Error;
use core::{fmt, str::FromStr};

/// Names one global counter row.
///
/// The well-known classes have names; any other class is addressed by its
/// number.
///
/// # Example
/// ```
/// use seqlease::CounterClass;
///
/// assert_eq!("room".parse::<CounterClass>().unwrap(), CounterClass::ROOM);
/// assert_eq!("17".parse::<CounterClass>().unwrap(), CounterClass::new(17));
/// assert!("lobby".parse::<CounterClass>().is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterClass(u32);

impl CounterClass {
    /// New session ids.
    pub const SESSION: Self = Self(0);
    /// New room ids.
    pub const ROOM: Self = Self(1);

    pub const fn new(class: u32) -> Self {
        Self(class)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for CounterClass {
    fn from(class: u32) -> Self {
        Self(class)
    }
}

impl fmt::Display for CounterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SESSION => f.write_str("session"),
            Self::ROOM => f.write_str("room"),
            Self(class) => write!(f, "{class}"),
        }
    }
}

impl FromStr for CounterClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "session" => Ok(Self::SESSION),
            "room" => Ok(Self::ROOM),
            other => other
                .parse::<u32>()
                .map(Self)
                .map_err(|_| Error::InvalidRequest {
                    reason: format!("unknown counter class `{other}`"),
                }),
        }
    }
}
