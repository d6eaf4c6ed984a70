/// Memory units as the scheduler prints them, and conversion to megabytes.
///
/// Usage lines say `2 Mbytes` or `512 Kbytes` (openlava sometimes `MBytes`), while memory
/// reservations in `rusage[mem=N]` are bare numbers whose unit is the cluster-wide
/// LSF_UNIT_FOR_LIMITS setting.  Everything we store is in MB, rounded to one decimal.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemUnit {
    KB,
    MB,
    GB,
    TB,
}

impl MemUnit {
    /// Parse "KB", "MB", "GB", "TB" in any case.

    pub fn parse(s: &str) -> Option<MemUnit> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KB" => Some(MemUnit::KB),
            "MB" => Some(MemUnit::MB),
            "GB" => Some(MemUnit::GB),
            "TB" => Some(MemUnit::TB),
            _ => None,
        }
    }

    /// Parse the single-letter prefix of a `Kbytes`-style suffix.

    pub fn from_prefix(c: &str) -> Option<MemUnit> {
        match c {
            "K" | "k" => Some(MemUnit::KB),
            "M" | "m" => Some(MemUnit::MB),
            "G" | "g" => Some(MemUnit::GB),
            "T" | "t" => Some(MemUnit::TB),
            _ => None,
        }
    }

    pub fn to_mb(self, value: f64) -> f64 {
        let mb = match self {
            MemUnit::KB => value / 1024.0,
            MemUnit::MB => value,
            MemUnit::GB => value * 1024.0,
            MemUnit::TB => value * 1024.0 * 1024.0,
        };
        round1(mb)
    }
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[test]
fn test_to_mb() {
    assert!(MemUnit::MB.to_mb(2048.0) == 2048.0);
    assert!(MemUnit::KB.to_mb(2048.0) == 2.0);
    assert!(MemUnit::KB.to_mb(100.0) == 0.1);
    assert!(MemUnit::GB.to_mb(1.5) == 1536.0);
    assert!(MemUnit::TB.to_mb(1.0) == 1048576.0);
}

#[test]
fn test_parse_unit() {
    assert!(MemUnit::parse("kb") == Some(MemUnit::KB));
    assert!(MemUnit::parse(" GB ") == Some(MemUnit::GB));
    assert!(MemUnit::parse("PB").is_none());
    assert!(MemUnit::from_prefix("T") == Some(MemUnit::TB));
    assert!(MemUnit::from_prefix("X").is_none());
}
