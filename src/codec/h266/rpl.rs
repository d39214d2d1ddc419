// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reference picture lists as signalled in the bitstream.

use thiserror::Error;

/// Maximum number of entries of a reference picture list.
pub const MAX_NUM_REF_PICS: usize = 29;
/// Maximum number of active entries of a reference picture list.
pub const MAX_NUM_REF: usize = 16;

/// One of the two reference picture lists of a slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefList {
    L0 = 0,
    L1 = 1,
}

impl RefList {
    pub const ALL: [RefList; 2] = [RefList::L0, RefList::L1];
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RplError {
    #[error("reference picture lists are limited to {max} entries")]
    TooManyEntries { max: usize },
    #[error("{active} active entries requested, but the list only has {len}")]
    ActiveExceedsEntries { active: usize, len: usize },
    #[error("{active} active entries requested, at most {max} are allowed")]
    TooManyActiveEntries { active: usize, max: usize },
    #[error("entry {0} is not a long-term entry")]
    NotLongTerm(usize),
}

/// An entry of a reference picture list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RplEntry {
    /// A short-term reference picture `delta_poc` before the current picture.
    ShortTerm { delta_poc: i32 },
    /// A long-term reference picture identified by its POC LSBs and, when present, by the
    /// number of MSB cycles it lies before the current picture.
    LongTerm {
        poc_lsb_lt: u32,
        delta_poc_msb_cycle_lt: Option<u32>,
    },
    /// The picture of the same access unit in the `ilrp_idx`-th direct reference layer.
    InterLayer { ilrp_idx: u8 },
}

impl RplEntry {
    pub fn is_short_term(&self) -> bool {
        matches!(self, RplEntry::ShortTerm { .. })
    }

    pub fn is_long_term(&self) -> bool {
        matches!(self, RplEntry::LongTerm { .. })
    }

    pub fn is_inter_layer(&self) -> bool {
        matches!(self, RplEntry::InterLayer { .. })
    }
}

/// POC targeted by a long-term entry, as seen from the picture with POC `cur_poc`.
///
/// Without MSB information only the LSBs are meaningful and the result must be compared against
/// masked POCs, see [`long_term_poc_matches`]. MSB cycles may reach far below any POC, so the
/// result is wider than a POC and saturates.
pub fn long_term_poc(
    poc_lsb_lt: u32,
    delta_poc_msb_cycle_lt: Option<u32>,
    cur_poc: i32,
    bits_for_poc: u8,
) -> i64 {
    let poc_mask = i64::from(poc_mask(bits_for_poc));
    let mut poc = i64::from(poc_lsb_lt) & poc_mask;

    if let Some(cycle) = delta_poc_msb_cycle_lt {
        let cur_poc = i64::from(cur_poc);
        poc += cur_poc - (cur_poc & poc_mask);
        poc = poc.saturating_sub(i64::from(cycle).saturating_mul(poc_mask + 1));
    }

    poc
}

/// Whether a picture with POC `pic_poc` is the target `ltrp_poc` of a long-term entry.
pub fn long_term_poc_matches(ltrp_poc: i64, has_msb: bool, pic_poc: i32, bits_for_poc: u8) -> bool {
    if has_msb {
        i64::from(pic_poc) == ltrp_poc
    } else {
        i64::from(pic_poc & poc_mask(bits_for_poc)) == ltrp_poc
    }
}

/// POCs are 32-bit values, so at most 31 LSBs are signalled.
pub(crate) fn poc_mask(bits_for_poc: u8) -> i32 {
    ((1i64 << bits_for_poc.min(31)) - 1) as i32
}

/// A reference picture list: an ordered set of entries of which the first `num_active` are used
/// for inter prediction of the current slice, the rest being kept only for later pictures.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferencePictureList {
    entries: Vec<RplEntry>,
    /// Number of active entries, all of them if `None`.
    num_active: Option<usize>,
    /// Whether the POC LSBs of long-term entries are signalled in the slice header.
    pub ltrp_in_slice_header_flag: bool,
}

impl ReferencePictureList {
    pub fn new() -> Self {
        Default::default()
    }

    /// Builds a list from `entries`, all of them active.
    pub fn from_entries(entries: &[RplEntry]) -> Result<Self, RplError> {
        let mut rpl = Self::new();
        for entry in entries {
            rpl.push(*entry)?;
        }
        Ok(rpl)
    }

    pub fn push(&mut self, entry: RplEntry) -> Result<(), RplError> {
        if self.entries.len() >= MAX_NUM_REF_PICS {
            return Err(RplError::TooManyEntries {
                max: MAX_NUM_REF_PICS,
            });
        }

        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[RplEntry] {
        &self.entries
    }

    pub fn entry(&self, idx: usize) -> Option<&RplEntry> {
        self.entries.get(idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn num_short_term(&self) -> usize {
        self.entries.iter().filter(|e| e.is_short_term()).count()
    }

    pub fn num_long_term(&self) -> usize {
        self.entries.iter().filter(|e| e.is_long_term()).count()
    }

    pub fn num_inter_layer(&self) -> usize {
        self.entries.iter().filter(|e| e.is_inter_layer()).count()
    }

    pub fn num_active(&self) -> usize {
        self.num_active.unwrap_or(self.entries.len())
    }

    pub fn set_num_active(&mut self, num_active: usize) -> Result<(), RplError> {
        if num_active > MAX_NUM_REF {
            return Err(RplError::TooManyActiveEntries {
                active: num_active,
                max: MAX_NUM_REF,
            });
        }

        if num_active > self.entries.len() {
            return Err(RplError::ActiveExceedsEntries {
                active: num_active,
                len: self.entries.len(),
            });
        }

        self.num_active = Some(num_active);
        Ok(())
    }

    /// The active entries.
    pub fn active_entries(&self) -> &[RplEntry] {
        &self.entries[..self.num_active()]
    }

    /// Sets the MSB cycle of the long-term entry at `idx`, as signalled in a slice header.
    pub fn set_delta_poc_msb_cycle_lt(
        &mut self,
        idx: usize,
        cycle: Option<u32>,
    ) -> Result<(), RplError> {
        match self.entries.get_mut(idx) {
            Some(RplEntry::LongTerm {
                delta_poc_msb_cycle_lt,
                ..
            }) => {
                *delta_poc_msb_cycle_lt = cycle;
                Ok(())
            }
            _ => Err(RplError::NotLongTerm(idx)),
        }
    }

    /// Whether any entry designates the picture with POC `poc` as seen from `cur_poc`.
    ///
    /// Long-term entries are compared by their raw identifier and inter-layer entries match the
    /// current POC.
    pub fn contains_poc(&self, poc: i32, cur_poc: i32) -> bool {
        self.entries.iter().any(|entry| match *entry {
            RplEntry::ShortTerm { delta_poc } => cur_poc - delta_poc == poc,
            RplEntry::LongTerm { poc_lsb_lt, .. } => poc_lsb_lt as i32 == poc,
            RplEntry::InterLayer { .. } => cur_poc == poc,
        })
    }
}
