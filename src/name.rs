//! Bounded-length cluster-wide identity for queues and groups (C1, spec.md §3).

use std::fmt;

use crate::error::MsgError;

/// Maximum number of bytes a [`Name`] may hold, per spec.md §3.
pub const NAME_MAX_LEN: usize = 256;

/// A bounded byte string used as the cluster-wide key for queues and groups.
///
/// Two names are equal iff their lengths match and their bytes match; this
/// falls out of the derived `PartialEq` since `value` never holds trailing
/// garbage past `length`.
#[derive(Clone)]
pub struct Name {
    length: u16,
    value: Vec<u8>,
}

impl Name {
    pub fn new(bytes: &[u8]) -> Result<Self, MsgError> {
        if bytes.len() > NAME_MAX_LEN {
            return Err(MsgError::InvalidParam(format!(
                "name length {} exceeds max {}",
                bytes.len(),
                NAME_MAX_LEN
            )));
        }
        Ok(Name {
            length: bytes.len() as u16,
            value: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.value[..self.length as usize]
    }

    pub fn len(&self) -> usize {
        self.length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Wire layout: `length: u16` followed by `length` raw bytes, matching
    /// every record body in spec.md §6 that embeds a `Name`.
    pub fn write_to_wire(&self, buf: &mut Vec<u8>) {
        use byteorder::{LittleEndian, WriteBytesExt};
        buf.write_u16::<LittleEndian>(self.length).expect("Vec writes never fail");
        buf.extend_from_slice(self.as_bytes());
    }

    pub fn read_from_wire(cursor: &mut std::io::Cursor<&[u8]>) -> Result<Self, MsgError> {
        use byteorder::{LittleEndian, ReadBytesExt};
        let length = cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| MsgError::Library)?;
        if length as usize > NAME_MAX_LEN {
            return Err(MsgError::InvalidParam("name length exceeds max on wire".into()));
        }
        let mut value = vec![0u8; length as usize];
        std::io::Read::read_exact(cursor, &mut value).map_err(|_| MsgError::Library)?;
        Ok(Name { length, value })
    }
}

impl TryFrom<&str> for Name {
    type Error = MsgError;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Name::new(s.as_bytes())
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}
impl Eq for Name {}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(self.as_bytes()) {
            Ok(s) => write!(f, "Name({s:?})"),
            Err(_) => write!(f, "Name({:?})", self.as_bytes()),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(self.as_bytes()) {
            Ok(s) => write!(f, "{s}"),
            Err(_) => write!(f, "{:?}", self.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_names_have_equal_bytes_and_length() {
        let a = Name::try_from("Q1").unwrap();
        let b = Name::try_from("Q1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn differing_length_is_unequal() {
        let a = Name::try_from("Q1").unwrap();
        let b = Name::try_from("Q1x").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn over_length_name_is_rejected() {
        let bytes = vec![b'a'; NAME_MAX_LEN + 1];
        assert!(Name::new(&bytes).is_err());
    }

    #[test]
    fn max_length_name_is_accepted() {
        let bytes = vec![b'a'; NAME_MAX_LEN];
        assert!(Name::new(&bytes).is_ok());
    }
}
