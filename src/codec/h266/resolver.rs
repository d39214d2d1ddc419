// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reference picture list construction.
//!
//! Turns the active entries of the two reference picture lists of a slice into pictures of the
//! DPB. Construction only reads the DPB: the long-term or short-term classification it decides
//! for each picture is returned as a set of [`MarkingIntent`]s, which the owner of the DPB
//! applies with [`Dpb::apply_intents`] once the lists are built.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use thiserror::Error;

use crate::codec::h266::conformance::PictureLoss;
use crate::codec::h266::dpb::Dpb;
use crate::codec::h266::dpb::DpbEntry;
use crate::codec::h266::parameter_sets::Vps;
use crate::codec::h266::picture::PictureData;
use crate::codec::h266::picture::RefPicHandle;
use crate::codec::h266::picture::Reference;
use crate::codec::h266::rpl::long_term_poc;
use crate::codec::h266::rpl::MAX_NUM_REF;
use crate::codec::h266::rpl::RefList;
use crate::codec::h266::rpl::RplEntry;
use crate::codec::h266::rpl::RplError;
use crate::codec::h266::slice::Slice;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    PictureLoss(#[from] PictureLoss),
    #[error("inter-layer reference used without an active VPS")]
    MissingVps,
    #[error("layer {layer_id} has no direct reference layer with index {ilrp_idx}")]
    InvalidIlrpIdx { layer_id: u8, ilrp_idx: u8 },
    #[error(transparent)]
    Rpl(#[from] RplError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Change of marking requested for a picture of the DPB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkingAction {
    /// Use as a long-term reference.
    Promote,
    /// Use as a short-term reference.
    Demote,
    /// Mark as unused for reference.
    Drop,
}

#[derive(Clone, Debug)]
pub struct MarkingIntent {
    pub pic: Rc<RefCell<PictureData>>,
    pub action: MarkingAction,
}

impl MarkingIntent {
    /// Marking of a picture currently marked as `reference` once this intent is applied.
    /// Pictures that are unused for reference stay so unless explicitly dropped.
    pub fn apply_to(&self, reference: Reference) -> Reference {
        match (self.action, reference) {
            (MarkingAction::Drop, _) | (_, Reference::None) => Reference::None,
            (MarkingAction::Promote, _) => Reference::LongTerm,
            (MarkingAction::Demote, _) => Reference::ShortTerm,
        }
    }
}

/// An entry of a constructed reference picture list.
#[derive(Clone, Debug)]
pub struct RefPicListEntry<T> {
    pub pic: DpbEntry<T>,
    /// Whether the picture is used as a long-term reference by this entry.
    pub is_long_term: bool,
}

/// The reference picture lists of a slice. Points into the pictures stored in the DPB.
#[derive(Clone, Debug)]
pub struct ReferencePicLists<T> {
    ref_pic_list0: Vec<RefPicListEntry<T>>,
    ref_pic_list1: Vec<RefPicListEntry<T>>,
    /// For each entry of list 1, the index of the entry of list 0 with the same POC.
    list1_idx_to_list0_idx: Vec<Option<usize>>,
}

impl<T> Default for ReferencePicLists<T> {
    fn default() -> Self {
        Self {
            ref_pic_list0: Default::default(),
            ref_pic_list1: Default::default(),
            list1_idx_to_list0_idx: Default::default(),
        }
    }
}

impl<T> ReferencePicLists<T> {
    pub fn list(&self, list: RefList) -> &[RefPicListEntry<T>] {
        match list {
            RefList::L0 => &self.ref_pic_list0,
            RefList::L1 => &self.ref_pic_list1,
        }
    }

    fn list_mut(&mut self, list: RefList) -> &mut Vec<RefPicListEntry<T>> {
        match list {
            RefList::L0 => &mut self.ref_pic_list0,
            RefList::L1 => &mut self.ref_pic_list1,
        }
    }

    pub fn get(&self, list: RefList, ref_idx: usize) -> Option<&RefPicListEntry<T>> {
        self.list(list).get(ref_idx)
    }

    pub fn num_ref_idx(&self, list: RefList) -> usize {
        self.list(list).len()
    }

    pub fn is_used_as_long_term(&self, list: RefList, ref_idx: usize) -> bool {
        self.get(list, ref_idx).map_or(false, |e| e.is_long_term)
    }

    pub fn ref_poc(&self, list: RefList, ref_idx: usize) -> Option<i32> {
        self.get(list, ref_idx)
            .map(|e| e.pic.0.borrow().pic_order_cnt_val)
    }

    /// The POCs of all the entries of `list`, for consumers that must not touch the DPB.
    pub fn ref_pocs(&self, list: RefList) -> Vec<i32> {
        self.list(list)
            .iter()
            .map(|e| e.pic.0.borrow().pic_order_cnt_val)
            .collect()
    }

    pub fn list1_idx_to_list0_idx(&self, ref_idx: usize) -> Option<usize> {
        self.list1_idx_to_list0_idx.get(ref_idx).copied().flatten()
    }

    /// Iterates over the entries of both lists.
    pub fn iter(&self) -> impl Iterator<Item = &RefPicListEntry<T>> {
        self.ref_pic_list0.iter().chain(self.ref_pic_list1.iter())
    }

    /// Whether any entry points to `pic`.
    pub fn contains(&self, pic: &Rc<RefCell<PictureData>>) -> bool {
        self.iter().any(|e| Rc::ptr_eq(&e.pic.0, pic))
    }

    fn set_list1_idx_to_list0_idx(&mut self) {
        let pocs0 = self.ref_pocs(RefList::L0);
        self.list1_idx_to_list0_idx = self
            .ref_pocs(RefList::L1)
            .into_iter()
            .map(|poc| pocs0.iter().position(|&poc0| poc0 == poc))
            .collect();
    }
}

/// Records `action` for `pic`, replacing any previous intent for the same picture.
fn push_intent(
    intents: &mut Vec<MarkingIntent>,
    pic: &Rc<RefCell<PictureData>>,
    action: MarkingAction,
) {
    intents.retain(|i| !Rc::ptr_eq(&i.pic, pic));
    intents.push(MarkingIntent {
        pic: Rc::clone(pic),
        action,
    });
}

/// Marking of `pic` with the pending `intents` applied.
fn pending_reference(pic: &Rc<RefCell<PictureData>>, intents: &[MarkingIntent]) -> Reference {
    let reference = *pic.borrow().reference();
    intents
        .iter()
        .find(|i| Rc::ptr_eq(&i.pic, pic))
        .map_or(reference, |i| i.apply_to(reference))
}

/// Builds the reference picture lists of `slice` from the pictures of `dpb`.
///
/// Entries are resolved in order, short-term entries by POC difference, long-term entries by
/// (possibly masked) POC and inter-layer entries through the direct reference layers of `vps`.
/// The border of every resolved picture is extended. A missing picture is reported as a
/// [`PictureLoss`].
pub fn construct_ref_pic_lists<T: RefPicHandle>(
    slice: &Slice,
    bits_for_poc: u8,
    vps: Option<&Vps>,
    dpb: &Dpb<T>,
) -> Result<(ReferencePicLists<T>, Vec<MarkingIntent>), ResolveError> {
    let mut lists = ReferencePicLists::default();
    let mut intents = vec![];

    if slice.slice_type.is_i() {
        return Ok((lists, intents));
    }

    let cur_poc = slice.pic_order_cnt_val;

    for list in RefList::ALL {
        let rpl = slice.ref_pic_list(list);
        let num_ref_idx = slice.num_ref_idx(list);
        if num_ref_idx > MAX_NUM_REF {
            return Err(RplError::TooManyActiveEntries {
                active: num_ref_idx,
                max: MAX_NUM_REF,
            }
            .into());
        }

        let entries = rpl
            .entries()
            .get(..num_ref_idx)
            .ok_or(RplError::ActiveExceedsEntries {
                active: num_ref_idx,
                len: rpl.len(),
            })?;

        for (ref_idx, entry) in entries.iter().enumerate() {
            let loss = |poc: i32, long_term: bool| PictureLoss {
                cur_poc,
                poc,
                ref_idx,
                long_term,
            };

            let (pic, action) = match *entry {
                RplEntry::InterLayer { ilrp_idx } => {
                    let vps = vps.ok_or(ResolveError::MissingVps)?;
                    let ref_layer_id = vps.direct_ref_layer_id(slice.layer_id, ilrp_idx).ok_or(
                        ResolveError::InvalidIlrpIdx {
                            layer_id: slice.layer_id,
                            ilrp_idx,
                        },
                    )?;

                    let pic = dpb
                        .find_ref_pic(cur_poc, ref_layer_id)
                        .ok_or_else(|| loss(cur_poc, true))?;
                    (pic, MarkingAction::Promote)
                }
                RplEntry::ShortTerm { delta_poc } => {
                    let poc = cur_poc - delta_poc;
                    let pic = dpb
                        .find_ref_pic(poc, slice.layer_id)
                        .ok_or_else(|| loss(poc, false))?;
                    (pic, MarkingAction::Demote)
                }
                RplEntry::LongTerm {
                    poc_lsb_lt,
                    delta_poc_msb_cycle_lt,
                } => {
                    let ltrp_poc =
                        long_term_poc(poc_lsb_lt, delta_poc_msb_cycle_lt, cur_poc, bits_for_poc);
                    let pic = dpb
                        .find_long_term_ref_pic_with(
                            ltrp_poc,
                            delta_poc_msb_cycle_lt.is_some(),
                            cur_poc,
                            slice.layer_id,
                            bits_for_poc,
                            |e| pending_reference(&e.0, &intents),
                        )
                        .ok_or_else(|| {
                            let poc = ltrp_poc.clamp(i32::MIN.into(), i32::MAX.into());
                            loss(poc as i32, true)
                        })?;
                    (pic, MarkingAction::Promote)
                }
            };

            pic.1.extend_border().with_context(|| {
                format!(
                    "extending the border of POC {}",
                    pic.0.borrow().pic_order_cnt_val
                )
            })?;

            log::trace!(
                "{:?}[{}] -> POC {} ({:?})",
                list,
                ref_idx,
                pic.0.borrow().pic_order_cnt_val,
                action
            );

            push_intent(&mut intents, &pic.0, action);
            lists.list_mut(list).push(RefPicListEntry {
                pic,
                is_long_term: action == MarkingAction::Promote,
            });
        }
    }

    lists.set_list1_idx_to_list0_idx();

    Ok((lists, intents))
}
