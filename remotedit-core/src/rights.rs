use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RightsError {
    #[error("invalid permission string: {0}")]
    Invalid(String),
}

/// Unix permission triples of a remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rights {
    pub user: u8,
    pub group: u8,
    pub other: u8,
}

impl Rights {
    pub fn from_octal(mode: u32) -> Self {
        Self {
            user: ((mode >> 6) & 0o7) as u8,
            group: ((mode >> 3) & 0o7) as u8,
            other: (mode & 0o7) as u8,
        }
    }

    pub fn to_octal(&self) -> u32 {
        (u32::from(self.user) << 6) | (u32::from(self.group) << 3) | u32::from(self.other)
    }
}

fn triple(bits: u8) -> [char; 3] {
    [
        if bits & 0o4 != 0 { 'r' } else { '-' },
        if bits & 0o2 != 0 { 'w' } else { '-' },
        if bits & 0o1 != 0 { 'x' } else { '-' },
    ]
}

fn parse_triple(chunk: &[u8]) -> Option<u8> {
    let mut bits = 0u8;
    for (ch, (expected, flag)) in chunk.iter().zip([(b'r', 0o4), (b'w', 0o2), (b'x', 0o1)]) {
        match *ch {
            c if c == expected => bits |= flag,
            b'-' => {}
            // setuid/setgid/sticky still imply execute.
            b's' | b't' if expected == b'x' => bits |= 0o1,
            b'S' | b'T' if expected == b'x' => {}
            _ => return None,
        }
    }
    Some(bits)
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bits in [self.user, self.group, self.other] {
            for ch in triple(bits) {
                write!(f, "{ch}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Rights {
    type Err = RightsError;

    /// Accepts `rwxr-xr-x` or an octal string such as `755` / `0644`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if !value.is_empty() && value.len() <= 4 && value.chars().all(|c| c.is_digit(8)) {
            let mode = u32::from_str_radix(value, 8)
                .map_err(|_| RightsError::Invalid(value.to_string()))?;
            return Ok(Self::from_octal(mode));
        }
        let bytes = value.as_bytes();
        if bytes.len() != 9 {
            return Err(RightsError::Invalid(value.to_string()));
        }
        let mut parts = bytes.chunks(3).map(parse_triple);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Some(user)), Some(Some(group)), Some(Some(other))) => {
                Ok(Self { user, group, other })
            }
            _ => Err(RightsError::Invalid(value.to_string())),
        }
    }
}

impl TryFrom<String> for Rights {
    type Error = RightsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rights> for String {
    fn from(value: Rights) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octal_and_symbolic_forms_agree() {
        let rights = Rights::from_octal(0o754);
        assert_eq!(rights.to_string(), "rwxr-xr--");
        assert_eq!("rwxr-xr--".parse::<Rights>().unwrap(), rights);
        assert_eq!(rights.to_octal(), 0o754);
    }

    #[test]
    fn parses_octal_strings() {
        assert_eq!("644".parse::<Rights>().unwrap().to_string(), "rw-r--r--");
        assert_eq!("0755".parse::<Rights>().unwrap().to_octal(), 0o755);
    }

    #[test]
    fn sticky_and_setuid_markers_keep_execute() {
        let rights: Rights = "rwsr-xr-t".parse().unwrap();
        assert_eq!(rights.to_octal(), 0o755);
    }

    #[test]
    fn rejects_garbage() {
        assert!("rwxrwx".parse::<Rights>().is_err());
        assert!("abcdefghi".parse::<Rights>().is_err());
    }
}
