//! Tagged state blobs carried across a same-image warm restart.
//!
//! Records are packed back to back as `[tag u16 LE, version u8, len u8,
//! payload]`. A blob that fails to parse is discarded as a whole and the
//! cold path is taken.

use core::fmt;

use heapless::Vec;

use crate::power::PowerState;

/// Power-button pulse setting.
pub const BUTTON_JUMP_TAG: u16 = 0x5042;
pub const BUTTON_JUMP_VERSION: u8 = 1;

/// Last known chipset state.
pub const CHIPSET_JUMP_TAG: u16 = 0x4353;
pub const CHIPSET_JUMP_VERSION: u8 = 1;

const HEADER_LEN: usize = 4;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JumpDataError {
    /// A record header or payload runs past the end of the blob.
    Truncated,
    /// No room left for another record.
    Full,
    /// Payload longer than a one-byte length can describe.
    Oversize,
}

impl fmt::Display for JumpDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpDataError::Truncated => f.write_str("jump data truncated"),
            JumpDataError::Full => f.write_str("jump data full"),
            JumpDataError::Oversize => f.write_str("jump record too large"),
        }
    }
}

/// Fixed-capacity tagged blob.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JumpTags<const N: usize> {
    bytes: Vec<u8, N>,
}

impl<const N: usize> JumpTags<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Appends a record.
    ///
    /// # Errors
    ///
    /// [`JumpDataError::Oversize`] for payloads over 255 bytes,
    /// [`JumpDataError::Full`] when the record does not fit.
    pub fn add(&mut self, tag: u16, version: u8, payload: &[u8]) -> Result<(), JumpDataError> {
        let len = u8::try_from(payload.len()).map_err(|_| JumpDataError::Oversize)?;
        if self.bytes.len() + HEADER_LEN + payload.len() > N {
            return Err(JumpDataError::Full);
        }

        let [lo, hi] = tag.to_le_bytes();
        self.bytes
            .extend_from_slice(&[lo, hi, version, len])
            .map_err(|_| JumpDataError::Full)?;
        self.bytes
            .extend_from_slice(payload)
            .map_err(|_| JumpDataError::Full)
    }

    /// Finds the first record with `tag`, returning its version and payload.
    #[must_use]
    pub fn find(&self, tag: u16) -> Option<(u8, &[u8])> {
        Records {
            bytes: self.bytes.as_slice(),
        }
        .map_while(Result::ok)
        .find(|record| record.0 == tag)
        .map(|(_, version, payload)| (version, payload))
    }

    /// Raw encoded blob.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Parses and validates an encoded blob.
    ///
    /// # Errors
    ///
    /// [`JumpDataError::Truncated`] when any record is cut short,
    /// [`JumpDataError::Full`] when `bytes` exceeds the capacity.
    pub fn decode(bytes: &[u8]) -> Result<Self, JumpDataError> {
        for record in (Records { bytes }) {
            record?;
        }
        let bytes = Vec::from_slice(bytes).map_err(|_| JumpDataError::Full)?;
        Ok(Self { bytes })
    }
}

struct Records<'a> {
    bytes: &'a [u8],
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<(u16, u8, &'a [u8]), JumpDataError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.is_empty() {
            return None;
        }
        let Some((header, rest)) = self.bytes.split_at_checked(HEADER_LEN) else {
            self.bytes = &[];
            return Some(Err(JumpDataError::Truncated));
        };
        let tag = u16::from_le_bytes([header[0], header[1]]);
        let version = header[2];
        let Some((payload, rest)) = rest.split_at_checked(usize::from(header[3])) else {
            self.bytes = &[];
            return Some(Err(JumpDataError::Truncated));
        };
        self.bytes = rest;
        Some(Ok((tag, version, payload)))
    }
}

/// Power-button settings that survive a warm restart.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ButtonJumpState {
    pub pulse_enabled: bool,
}

impl ButtonJumpState {
    /// Stores the record in `tags`.
    ///
    /// # Errors
    ///
    /// Propagates [`JumpTags::add`] failures.
    pub fn save<const N: usize>(self, tags: &mut JumpTags<N>) -> Result<(), JumpDataError> {
        tags.add(
            BUTTON_JUMP_TAG,
            BUTTON_JUMP_VERSION,
            &[u8::from(self.pulse_enabled)],
        )
    }

    /// Restores the record; wrong versions or sizes are ignored.
    #[must_use]
    pub fn restore<const N: usize>(tags: &JumpTags<N>) -> Option<Self> {
        match tags.find(BUTTON_JUMP_TAG)? {
            (BUTTON_JUMP_VERSION, [flag]) => Some(Self {
                pulse_enabled: *flag != 0,
            }),
            _ => None,
        }
    }
}

/// Chipset state hint that survives a warm restart.
///
/// The hint only narrows what the live signals are checked against; it is
/// never trusted on its own.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChipsetJumpState {
    pub state: PowerState,
}

impl ChipsetJumpState {
    /// Stores the record in `tags`.
    ///
    /// # Errors
    ///
    /// Propagates [`JumpTags::add`] failures.
    pub fn save<const N: usize>(self, tags: &mut JumpTags<N>) -> Result<(), JumpDataError> {
        tags.add(CHIPSET_JUMP_TAG, CHIPSET_JUMP_VERSION, &[self.state.code()])
    }

    #[must_use]
    pub fn restore<const N: usize>(tags: &JumpTags<N>) -> Option<Self> {
        match tags.find(CHIPSET_JUMP_TAG)? {
            (CHIPSET_JUMP_VERSION, [code]) => {
                PowerState::from_code(*code).map(|state| Self { state })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_use_tag_version_length_layout() {
        let mut tags = JumpTags::<16>::new();
        ButtonJumpState {
            pulse_enabled: false,
        }
        .save(&mut tags)
        .expect("room");
        assert_eq!(tags.as_bytes(), &[0x42, 0x50, 1, 1, 0]);
    }

    #[test]
    fn restores_both_blobs_after_decode() {
        let mut tags = JumpTags::<16>::new();
        ButtonJumpState {
            pulse_enabled: true,
        }
        .save(&mut tags)
        .expect("room");
        ChipsetJumpState {
            state: PowerState::S0,
        }
        .save(&mut tags)
        .expect("room");

        let decoded = JumpTags::<16>::decode(tags.as_bytes()).expect("valid blob");
        assert_eq!(
            ButtonJumpState::restore(&decoded),
            Some(ButtonJumpState {
                pulse_enabled: true
            })
        );
        assert_eq!(
            ChipsetJumpState::restore(&decoded).map(|hint| hint.state),
            Some(PowerState::S0)
        );
    }

    #[test]
    fn rejects_truncated_and_oversized_records() {
        assert_eq!(
            JumpTags::<16>::decode(&[0x42, 0x50, 1, 4, 0]),
            Err(JumpDataError::Truncated)
        );
        assert_eq!(JumpTags::<16>::decode(&[0x42]), Err(JumpDataError::Truncated));

        let mut tags = JumpTags::<8>::new();
        assert_eq!(tags.add(1, 1, &[0; 5]), Err(JumpDataError::Full));
        let mut large = JumpTags::<512>::new();
        assert_eq!(large.add(1, 1, &[0; 300]), Err(JumpDataError::Oversize));
    }

    #[test]
    fn ignores_unknown_versions() {
        let mut tags = JumpTags::<16>::new();
        tags.add(BUTTON_JUMP_TAG, 2, &[1]).expect("room");
        assert_eq!(ButtonJumpState::restore(&tags), None);
    }
}
