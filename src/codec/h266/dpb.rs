// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::cell::Ref;
use std::cell::RefCell;
use std::cell::RefMut;
use std::rc::Rc;

use thiserror::Error;

use crate::codec::h266::conformance::Violation;
use crate::codec::h266::nalu::NaluType;
use crate::codec::h266::picture::PictureData;
use crate::codec::h266::picture::RefPicHandle;
use crate::codec::h266::picture::Reference;
use crate::codec::h266::resolver::MarkingIntent;
use crate::codec::h266::resolver::ReferencePicLists;
use crate::codec::h266::rpl::long_term_poc;
use crate::codec::h266::rpl::long_term_poc_matches;
use crate::codec::h266::rpl::ReferencePictureList;
use crate::codec::h266::rpl::RplEntry;

/// Maximum number of pictures the DPB can hold.
pub const MAX_DPB_SIZE: usize = 16;

// Shortcut to refer to a DPB entry.
//
// The first member of the tuple is the `PictureData` for the frame.
//
// The second member is the client handle of the frame.
#[derive(Clone, Debug)]
pub struct DpbEntry<T>(pub Rc<RefCell<PictureData>>, pub T);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorePictureError {
    #[error("DPB is full ({0} pictures)")]
    DpbIsFull(usize),
}

/// Decoding refresh state carried from one picture to the next.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshState {
    /// POC of the latest CRA picture.
    pub poc_cra: i32,
    /// POC of the latest IDR picture.
    pub last_idr_poc: i32,
    /// Whether the pictures preceding the latest random access point still have to be marked as
    /// unused for reference.
    pub pending: bool,
}

/// Whether `pic` is the picture with POC `poc` in layer `layer_id`.
fn is_picture(pic: &PictureData, poc: i32, layer_id: u8) -> bool {
    pic.pic_order_cnt_val == poc && pic.layer_id == layer_id
}

/// Whether `pic` is a target of the long-term entry (`poc_lsb_lt`, `msb_cycle`) of picture
/// `cur_poc`, using the POC width of `pic` itself.
pub(crate) fn matches_long_term(
    pic: &PictureData,
    poc_lsb_lt: u32,
    msb_cycle: Option<u32>,
    cur_poc: i32,
) -> bool {
    let ltrp_poc = long_term_poc(poc_lsb_lt, msb_cycle, cur_poc, pic.bits_for_poc);
    long_term_poc_matches(ltrp_poc, msb_cycle.is_some(), pic.pic_order_cnt_val, pic.bits_for_poc)
}

pub struct Dpb<T> {
    /// List of `PictureData` and client handles to decoded pictures.
    entries: Vec<DpbEntry<T>>,
    /// The maximum number of pictures that can be stored.
    max_num_pics: usize,
}

impl<T: Clone> Dpb<T> {
    pub fn new(max_num_pics: usize) -> Self {
        Self {
            entries: Default::default(),
            max_num_pics,
        }
    }

    /// Returns an iterator over the underlying H266 pictures stored in the
    /// DPB.
    pub fn pictures(&self) -> impl Iterator<Item = Ref<'_, PictureData>> {
        self.entries.iter().map(|h| h.0.borrow())
    }

    /// Returns a mutable iterator over the underlying H266 pictures stored in
    /// the DPB.
    pub fn pictures_mut(&mut self) -> impl Iterator<Item = RefMut<'_, PictureData>> {
        self.entries.iter().map(|h| h.0.borrow_mut())
    }

    /// Returns the length of the DPB.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a reference to the whole DPB entries.
    pub fn entries(&self) -> &Vec<DpbEntry<T>> {
        &self.entries
    }

    /// Set the dpb's max num pics.
    pub fn set_max_num_pics(&mut self, max_num_pics: usize) {
        self.max_num_pics = max_num_pics;
    }

    /// Get a reference to the dpb's max num pics.
    pub fn max_num_pics(&self) -> usize {
        self.max_num_pics
    }

    /// Mark all pictures in the DPB as unused for reference.
    pub fn mark_all_as_unused_for_ref(&mut self) {
        for mut picture in self.pictures_mut() {
            picture.set_reference(Reference::None);
        }
    }

    /// Gets the position of `needle` in the DPB, if any.
    fn get_position(&self, needle: &Rc<RefCell<PictureData>>) -> Option<usize> {
        self.entries
            .iter()
            .position(|handle| Rc::ptr_eq(&handle.0, needle))
    }

    /// Whether `pic` is stored in the DPB.
    pub fn contains(&self, pic: &Rc<RefCell<PictureData>>) -> bool {
        self.get_position(pic).is_some()
    }

    /// Finds the picture with POC `poc` in layer `layer_id`. A picture used for
    /// reference is preferred over one that is not, as POCs restart at every IDR.
    pub fn find_ref_pic(&self, poc: i32, layer_id: u8) -> Option<DpbEntry<T>> {
        let matches = || {
            self.entries
                .iter()
                .filter(move |e| is_picture(&e.0.borrow(), poc, layer_id))
        };
        let found = matches()
            .find(|e| e.0.borrow().is_ref())
            .or_else(|| matches().next());

        log::trace!(
            "find_ref_pic: {} (layer {}), found DON {:?}",
            poc,
            layer_id,
            found.map(|e| e.0.borrow().decoding_order_number)
        );
        found.cloned()
    }

    /// Finds the target of a long-term entry resolving to `ltrp_poc`.
    ///
    /// Only pictures of layer `layer_id` that are used for reference and are not the current
    /// picture `cur_poc` are considered. Without MSB information POCs are compared modulo
    /// 2^`bits_for_poc`. A long-term picture is preferred over a short-term one.
    pub fn find_long_term_ref_pic(
        &self,
        ltrp_poc: i64,
        has_msb: bool,
        cur_poc: i32,
        layer_id: u8,
        bits_for_poc: u8,
    ) -> Option<DpbEntry<T>> {
        self.find_long_term_ref_pic_with(ltrp_poc, has_msb, cur_poc, layer_id, bits_for_poc, |e| {
            *e.0.borrow().reference()
        })
    }

    /// Same as `find_long_term_ref_pic`, but with the marking of each entry given by
    /// `reference_of`.
    pub(crate) fn find_long_term_ref_pic_with<F>(
        &self,
        ltrp_poc: i64,
        has_msb: bool,
        cur_poc: i32,
        layer_id: u8,
        bits_for_poc: u8,
        reference_of: F,
    ) -> Option<DpbEntry<T>>
    where
        F: Fn(&DpbEntry<T>) -> Reference,
    {
        let mut short_term = None;

        for entry in &self.entries {
            let reference = reference_of(entry);
            let pic = entry.0.borrow();

            if pic.pic_order_cnt_val == cur_poc
                || pic.layer_id != layer_id
                || reference == Reference::None
                || !long_term_poc_matches(ltrp_poc, has_msb, pic.pic_order_cnt_val, bits_for_poc)
            {
                continue;
            }

            if reference == Reference::LongTerm {
                return Some(entry.clone());
            }

            if short_term.is_none() {
                short_term = Some(entry.clone());
            }
        }

        short_term
    }

    /// Drains the DPB by continuously invoking the bumping process.
    pub fn drain(&mut self) -> Vec<DpbEntry<T>> {
        log::debug!("Draining the DPB.");

        let mut pics = vec![];
        while let Some(pic) = self.bump(true) {
            pics.push(pic);
        }

        pics
    }

    /// Find the lowest POC in the DPB that can be bumped.
    fn find_lowest_poc_for_bumping(&self) -> Option<DpbEntry<T>> {
        self.entries
            .iter()
            .filter(|e| e.0.borrow().needed_for_output)
            .min_by_key(|e| e.0.borrow().pic_order_cnt_val)
            .cloned()
    }

    /// Hands out the picture pending output with the lowest POC and removes it
    /// from the DPB if it is no longer used for reference, or if `flush` is set.
    pub fn bump(&mut self, flush: bool) -> Option<DpbEntry<T>> {
        let handle = self.find_lowest_poc_for_bumping()?;
        let mut pic = handle.0.borrow_mut();

        pic.needed_for_output = false;
        log::debug!("Bumping picture POC {} from the dpb", pic.pic_order_cnt_val);

        if !pic.is_ref() || flush {
            if let Some(index) = self.get_position(&handle.0) {
                log::debug!("removed picture POC {} from dpb", pic.pic_order_cnt_val);
                self.entries.remove(index);
            }
        }

        drop(pic);
        Some(handle)
    }

    /// Clears the DPB, dropping all the pictures.
    pub fn clear(&mut self) {
        log::debug!("Clearing the DPB");

        let max_num_pics = self.max_num_pics;

        *self = Default::default();
        self.max_num_pics = max_num_pics;
    }

    /// Removes all pictures which are marked as "not needed for output" and
    /// "unused for reference".
    pub fn remove_unused(&mut self) {
        log::debug!("Removing unused pictures from DPB.");
        self.entries.retain(|e| {
            let pic = e.0.borrow();
            let retain = pic.needed_for_output || pic.is_ref();
            log::trace!("Retaining pic POC: {}: {}", pic.pic_order_cnt_val, retain);
            retain
        })
    }

    /// Store a picture and its client handle in the DPB.
    ///
    /// The picture being decoded is marked as used for short-term reference.
    pub fn store_picture(
        &mut self,
        picture: Rc<RefCell<PictureData>>,
        handle: T,
    ) -> Result<DpbEntry<T>, StorePictureError> {
        if self.entries.len() >= self.max_num_pics {
            return Err(StorePictureError::DpbIsFull(self.max_num_pics));
        }

        let mut pic = picture.borrow_mut();
        log::debug!(
            "Stored picture POC {:?}, the DPB length is {:?}",
            pic.pic_order_cnt_val,
            self.entries.len()
        );

        pic.needed_for_output = pic.pic_output_flag;
        pic.set_reference(Reference::ShortTerm);
        drop(pic);

        let entry = DpbEntry(picture, handle);
        self.entries.push(entry.clone());

        Ok(entry)
    }

    /// Returns all the references in the DPB.
    pub fn get_all_references(&self) -> Vec<DpbEntry<T>> {
        self.entries
            .iter()
            .filter(|e| e.0.borrow().is_ref())
            .cloned()
            .collect()
    }

    /// Applies the marking decided while resolving reference picture lists.
    /// Intents for pictures no longer in the DPB are ignored.
    pub fn apply_intents(&mut self, intents: &[MarkingIntent]) {
        for intent in intents {
            if !self.contains(&intent.pic) {
                continue;
            }

            match intent.pic.try_borrow_mut() {
                Ok(mut pic) => {
                    let reference = intent.apply_to(*pic.reference());
                    pic.set_reference(reference);
                }
                Err(_) => log::warn!("Marking intent for a picture that is being accessed"),
            }
        }
    }

    /// Marks the pictures of the current layer that the current picture no
    /// longer lists as unused for reference.
    ///
    /// Long-term entries first promote their short-term target if no long-term
    /// picture matches. Pictures referred to by any entry, active or not, are
    /// kept, and the pictures of the current access unit in other layers are
    /// kept as long-term if an inter-layer entry is present. After an IDR
    /// picture nothing but the current picture is kept.
    ///
    /// `cur_pic` may be stored in the DPB, the current picture is never modified.
    /// Pictures used by the current slice that belong to a higher temporal
    /// sub-layer are reported.
    pub fn apply_rpl_marking(
        &mut self,
        cur_pic: &Rc<RefCell<PictureData>>,
        rpls: [&ReferencePictureList; 2],
        used_by_curr: &ReferencePicLists<T>,
    ) -> Vec<Violation> {
        let cur = cur_pic.borrow().clone();
        let cur_poc = cur.pic_order_cnt_val;
        let need_to_check = !cur.nalu_type.is_idr();

        for rpl in rpls {
            for entry in rpl.entries() {
                if let RplEntry::LongTerm {
                    poc_lsb_lt,
                    delta_poc_msb_cycle_lt,
                } = *entry
                {
                    self.promote_long_term_target(
                        cur_pic,
                        &cur,
                        poc_lsb_lt,
                        delta_poc_msb_cycle_lt,
                    );
                }
            }
        }

        let mut violations = vec![];
        for dpb_entry in &self.entries {
            if Rc::ptr_eq(&dpb_entry.0, cur_pic) {
                continue;
            }

            let mut pic = dpb_entry.0.borrow_mut();
            if !pic.is_ref() {
                continue;
            }

            let kept_as = if need_to_check {
                rpls.iter()
                    .flat_map(|rpl| rpl.entries())
                    .find_map(|entry| match *entry {
                        RplEntry::InterLayer { .. } => (pic.pic_order_cnt_val == cur_poc
                            && pic.layer_id != cur.layer_id)
                            .then_some(Reference::LongTerm),
                        _ if pic.layer_id != cur.layer_id => None,
                        RplEntry::ShortTerm { delta_poc } => (pic.pic_order_cnt_val
                            == cur_poc - delta_poc)
                            .then_some(Reference::ShortTerm),
                        RplEntry::LongTerm {
                            poc_lsb_lt,
                            delta_poc_msb_cycle_lt,
                        } => (pic.is_long_term()
                            && matches_long_term(&pic, poc_lsb_lt, delta_poc_msb_cycle_lt, cur_poc))
                        .then_some(Reference::LongTerm),
                    })
            } else {
                None
            };

            match kept_as {
                Some(reference) => pic.set_reference(reference),
                None if pic.layer_id == cur.layer_id => pic.set_reference(Reference::None),
                None => (),
            }

            if pic.is_ref()
                && pic.temporal_id > cur.temporal_id
                && used_by_curr.contains(&dpb_entry.0)
            {
                violations.push(Violation::HigherSubLayerRef {
                    poc: cur_poc,
                    temporal_id: cur.temporal_id,
                    ref_poc: pic.pic_order_cnt_val,
                    ref_temporal_id: pic.temporal_id,
                });
            }
        }

        violations
    }

    /// Makes sure the target of a long-term entry is marked as long-term,
    /// promoting a short-term match if no long-term picture matches.
    fn promote_long_term_target(
        &self,
        cur_pic: &Rc<RefCell<PictureData>>,
        cur: &PictureData,
        poc_lsb_lt: u32,
        msb_cycle: Option<u32>,
    ) {
        let candidates = || {
            self.entries.iter().filter(|e| {
                if Rc::ptr_eq(&e.0, cur_pic) {
                    return false;
                }

                let pic = e.0.borrow();
                pic.is_ref()
                    && pic.layer_id == cur.layer_id
                    && pic.pic_order_cnt_val != cur.pic_order_cnt_val
                    && matches_long_term(&pic, poc_lsb_lt, msb_cycle, cur.pic_order_cnt_val)
            })
        };

        if candidates().any(|e| e.0.borrow().is_long_term()) {
            return;
        }

        if let Some(entry) = candidates().next() {
            entry.0.borrow_mut().set_reference(Reference::LongTerm);
        }
    }

    /// Flags the pictures of the temporal sub-layer of the STSA picture `cur_pic`
    /// so that pictures following it in that sub-layer may not refer to them.
    pub fn mark_stsa_sub_layer_non_reference(&mut self, cur_pic: &Rc<RefCell<PictureData>>) {
        let cur = cur_pic.borrow().clone();

        for entry in &self.entries {
            if Rc::ptr_eq(&entry.0, cur_pic) {
                continue;
            }

            {
                let pic = entry.0.borrow();
                if !pic.is_ref()
                    || pic.layer_id != cur.layer_id
                    || pic.temporal_id != cur.temporal_id
                {
                    continue;
                }
            }

            let mut pic = entry.0.borrow_mut();
            log::trace!(
                "POC {} is sub-layer non-reference due to STSA POC {}",
                pic.pic_order_cnt_val,
                cur.pic_order_cnt_val
            );
            pic.sub_layer_non_ref_due_to_stsa = true;
        }
    }
}

impl<T: RefPicHandle> Dpb<T> {
    /// Marks the pictures preceding a random access point as unused for reference.
    ///
    /// An IDR picture unmarks every other picture at once. A CRA picture defers
    /// this until the first picture following it in output order, so that its
    /// leading pictures may still refer to pictures preceding it. With
    /// `efficient_field_irap`, the same deferral applies to IDR pictures so that
    /// the second field of a field pair may refer to the first one.
    ///
    /// `cur` is told apart from older pictures with the same POC by identity, so
    /// it may or may not be stored in the DPB yet.
    pub fn decoding_refresh_marking(
        &mut self,
        cur: &Rc<RefCell<PictureData>>,
        associated_irap_type: NaluType,
        state: &mut RefreshState,
        efficient_field_irap: bool,
    ) {
        let (cur_poc, nalu_type) = {
            let cur = cur.borrow();
            (cur.pic_order_cnt_val, cur.nalu_type)
        };

        if nalu_type.is_idr() {
            log::debug!("IDR picture {}: marking all pictures as unused", cur_poc);
            self.unmark_all_except(cur, None);
            state.last_idr_poc = cur_poc;
            if efficient_field_irap {
                state.pending = true;
            }
            return;
        }

        if efficient_field_irap && associated_irap_type.is_idr() {
            if state.pending && cur_poc > state.last_idr_poc {
                log::debug!("Applying pending refresh of IDR picture {}", state.last_idr_poc);
                self.unmark_all_except(cur, Some(state.last_idr_poc));
                state.pending = false;
            }
        } else if state.pending && cur_poc > state.poc_cra {
            log::debug!("Applying pending refresh of CRA picture {}", state.poc_cra);
            self.unmark_all_except(cur, Some(state.poc_cra));
            state.pending = false;
        }

        if nalu_type.is_cra() {
            state.pending = true;
            state.poc_cra = cur_poc;
        }
    }

    fn unmark_all_except(&mut self, cur: &Rc<RefCell<PictureData>>, anchor_poc: Option<i32>) {
        for entry in &self.entries {
            let poc = entry.0.borrow().pic_order_cnt_val;
            if Rc::ptr_eq(&entry.0, cur) || Some(poc) == anchor_poc {
                continue;
            }

            entry.0.borrow_mut().set_reference(Reference::None);
            entry.1.clear_hash();
        }
    }
}

impl<T: Clone> Default for Dpb<T> {
    fn default() -> Self {
        Self::new(MAX_DPB_SIZE)
    }
}

impl<T: Clone> std::fmt::Debug for Dpb<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pics = self
            .entries
            .iter()
            .map(|h| &h.0)
            .enumerate()
            .collect::<Vec<_>>();
        f.debug_struct("Dpb")
            .field("pictures", &pics)
            .field("max_num_pics", &self.max_num_pics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h266::dummy::dpb_with;
    use crate::codec::h266::dummy::pic;
    use crate::codec::h266::dummy::pic_with;
    use crate::codec::h266::dummy::DummyHandle;

    fn references(dpb: &Dpb<DummyHandle>) -> Vec<(i32, Reference)> {
        dpb.pictures()
            .map(|p| (p.pic_order_cnt_val, *p.reference()))
            .collect()
    }

    #[test]
    fn store_marks_short_term() {
        let mut dpb = Dpb::new(1);
        let entry = dpb
            .store_picture(
                Rc::new(RefCell::new(pic_with(0, NaluType::IdrNLp, |p| p.pic_output_flag = true))),
                DummyHandle::default(),
            )
            .unwrap();

        assert_eq!(*entry.0.borrow().reference(), Reference::ShortTerm);
        assert!(entry.0.borrow().needed_for_output);
        assert_eq!(
            dpb.store_picture(
                Rc::new(RefCell::new(pic(1, NaluType::TrailNut))),
                DummyHandle::default()
            )
            .unwrap_err(),
            StorePictureError::DpbIsFull(1)
        );
    }

    #[test]
    fn bump_in_poc_order() {
        let mut dpb = dpb_with(&[
            pic_with(8, NaluType::TrailNut, |p| p.needed_for_output = true),
            pic_with(4, NaluType::TrailNut, |p| p.needed_for_output = true),
        ]);
        dpb.entries()[0].0.borrow_mut().set_reference(Reference::None);

        let first = dpb.bump(false).unwrap();
        assert_eq!(first.0.borrow().pic_order_cnt_val, 4);
        // Still a reference.
        assert_eq!(dpb.len(), 2);

        let second = dpb.bump(false).unwrap();
        assert_eq!(second.0.borrow().pic_order_cnt_val, 8);
        assert_eq!(dpb.len(), 1);
        assert!(dpb.bump(false).is_none());

        dpb.remove_unused();
        assert_eq!(dpb.len(), 1);
        dpb.mark_all_as_unused_for_ref();
        dpb.remove_unused();
        assert!(dpb.is_empty());
    }

    #[test]
    fn idr_unmarks_everything_else() {
        let mut dpb = dpb_with(&[
            pic(0, NaluType::IdrWRadl),
            pic(4, NaluType::TrailNut),
            pic(8, NaluType::TrailNut),
            pic(16, NaluType::IdrNLp),
        ]);
        dpb.entries()[1].0.borrow_mut().set_reference(Reference::LongTerm);
        let idr = dpb.entries()[3].0.clone();

        let mut state = RefreshState::default();
        dpb.decoding_refresh_marking(&idr, NaluType::IdrNLp, &mut state, false);

        assert_eq!(
            references(&dpb),
            vec![
                (0, Reference::None),
                (4, Reference::None),
                (8, Reference::None),
                (16, Reference::ShortTerm)
            ]
        );
        assert_eq!(state.last_idr_poc, 16);
        assert!(!state.pending);
        assert!(dpb.entries()[0].1.state().hash_clears > 0);
        assert_eq!(dpb.entries()[3].1.state().hash_clears, 0);
    }

    #[test]
    fn cra_refresh_is_deferred() {
        let mut dpb = dpb_with(&[pic(0, NaluType::IdrNLp), pic(8, NaluType::TrailNut)]);
        let mut state = RefreshState::default();

        let cra = Rc::new(RefCell::new(pic(16, NaluType::CraNut)));
        dpb.decoding_refresh_marking(&cra, NaluType::CraNut, &mut state, false);
        assert!(state.pending);
        assert_eq!(state.poc_cra, 16);

        dpb.store_picture(cra, DummyHandle::default()).unwrap();

        // A leading picture does not trigger the refresh.
        let rasl = Rc::new(RefCell::new(pic(12, NaluType::RaslNut)));
        dpb.decoding_refresh_marking(&rasl, NaluType::CraNut, &mut state, false);
        assert!(state.pending);
        assert!(dpb.pictures().all(|p| p.is_ref()));

        let trail = Rc::new(RefCell::new(pic(20, NaluType::TrailNut)));
        dpb.decoding_refresh_marking(&trail, NaluType::CraNut, &mut state, false);
        assert!(!state.pending);
        assert_eq!(
            references(&dpb),
            vec![
                (0, Reference::None),
                (8, Reference::None),
                (16, Reference::ShortTerm)
            ]
        );
    }

    #[test]
    fn efficient_field_idr_refresh() {
        let mut dpb = dpb_with(&[pic(0, NaluType::TrailNut)]);
        let mut state = RefreshState::default();

        let idr = Rc::new(RefCell::new(pic(10, NaluType::IdrNLp)));
        dpb.decoding_refresh_marking(&idr, NaluType::IdrNLp, &mut state, true);
        assert!(state.pending);
        dpb.store_picture(idr, DummyHandle::default()).unwrap();

        let second_field = Rc::new(RefCell::new(pic(11, NaluType::TrailNut)));
        dpb.store_picture(second_field.clone(), DummyHandle::default())
            .unwrap();
        dpb.decoding_refresh_marking(&second_field, NaluType::IdrNLp, &mut state, true);

        assert!(!state.pending);
        assert_eq!(
            references(&dpb),
            vec![
                (0, Reference::None),
                (10, Reference::ShortTerm),
                (11, Reference::ShortTerm)
            ]
        );
    }

    #[test]
    fn rpl_marking_keeps_listed_pictures() {
        let dpb_pics = [
            pic(0, NaluType::IdrNLp),
            pic(2, NaluType::TrailNut),
            pic(4, NaluType::TrailNut),
            pic(6, NaluType::TrailNut),
        ];
        let mut dpb = dpb_with(&dpb_pics);
        let cur = Rc::new(RefCell::new(pic(8, NaluType::TrailNut)));

        let rpl0 = ReferencePictureList::from_entries(&[
            RplEntry::ShortTerm { delta_poc: 2 },
            RplEntry::LongTerm {
                poc_lsb_lt: 0,
                delta_poc_msb_cycle_lt: None,
            },
        ])
        .unwrap();
        let rpl1 = ReferencePictureList::from_entries(&[RplEntry::ShortTerm { delta_poc: 4 }])
            .unwrap();

        let violations = dpb.apply_rpl_marking(&cur, [&rpl0, &rpl1], &ReferencePicLists::default());
        assert!(violations.is_empty());

        let expected = vec![
            (0, Reference::LongTerm),
            (2, Reference::None),
            (4, Reference::ShortTerm),
            (6, Reference::ShortTerm),
        ];
        assert_eq!(references(&dpb), expected);

        // Marking the same picture again changes nothing.
        dpb.apply_rpl_marking(&cur, [&rpl0, &rpl1], &ReferencePicLists::default());
        assert_eq!(references(&dpb), expected);
    }

    #[test]
    fn rpl_marking_leaves_other_layers() {
        let mut dpb = dpb_with(&[
            pic_with(4, NaluType::TrailNut, |p| p.layer_id = 0),
            pic_with(8, NaluType::TrailNut, |p| p.layer_id = 0),
        ]);
        let cur = Rc::new(RefCell::new(pic_with(8, NaluType::TrailNut, |p| {
            p.layer_id = 1
        })));
        let rpl0 = ReferencePictureList::from_entries(&[RplEntry::InterLayer { ilrp_idx: 0 }])
            .unwrap();
        let empty = ReferencePictureList::new();

        dpb.apply_rpl_marking(&cur, [&rpl0, &empty], &ReferencePicLists::default());
        assert_eq!(
            references(&dpb),
            vec![(4, Reference::ShortTerm), (8, Reference::LongTerm)]
        );
    }

    #[test]
    fn rpl_marking_after_idr() {
        let mut dpb = dpb_with(&[pic(0, NaluType::TrailNut), pic(3, NaluType::IdrWRadl)]);
        let idr = dpb.entries()[1].0.clone();
        let rpl0 = ReferencePictureList::from_entries(&[RplEntry::ShortTerm { delta_poc: 3 }])
            .unwrap();
        let empty = ReferencePictureList::new();

        dpb.apply_rpl_marking(&idr, [&rpl0, &empty], &ReferencePicLists::default());
        assert_eq!(
            references(&dpb),
            vec![(0, Reference::None), (3, Reference::ShortTerm)]
        );
    }

    #[test]
    fn long_term_lookup_prefers_long_term() {
        let dpb = dpb_with(&[
            pic_with(3, NaluType::TrailNut, |p| p.bits_for_poc = 4),
            pic_with(19, NaluType::TrailNut, |p| p.bits_for_poc = 4),
        ]);
        dpb.entries()[1].0.borrow_mut().set_reference(Reference::LongTerm);

        let found = dpb.find_long_term_ref_pic(3, false, 24, 0, 4).unwrap();
        assert_eq!(found.0.borrow().pic_order_cnt_val, 19);

        let found = dpb.find_long_term_ref_pic(3, true, 24, 0, 4).unwrap();
        assert_eq!(found.0.borrow().pic_order_cnt_val, 3);

        assert!(dpb.find_long_term_ref_pic(5, false, 24, 0, 4).is_none());
        // The current picture is never its own reference.
        assert!(dpb.find_long_term_ref_pic(3, true, 3, 0, 4).is_none());
    }

    #[test]
    fn stsa_flags_same_sub_layer() {
        let mut dpb = dpb_with(&[
            pic_with(2, NaluType::TrailNut, |p| p.temporal_id = 1),
            pic_with(4, NaluType::TrailNut, |p| p.temporal_id = 0),
            pic_with(6, NaluType::StsaNut, |p| p.temporal_id = 1),
        ]);
        let stsa = dpb.entries()[2].0.clone();

        dpb.mark_stsa_sub_layer_non_reference(&stsa);

        let flags = dpb
            .pictures()
            .map(|p| p.sub_layer_non_ref_due_to_stsa)
            .collect::<Vec<_>>();
        assert_eq!(flags, vec![true, false, false]);
    }

    #[test]
    fn idr_with_reused_poc() {
        let mut dpb = dpb_with(&[pic(0, NaluType::IdrNLp), pic(1, NaluType::TrailNut)]);
        let stale = dpb.entries()[0].0.clone();
        let mut state = RefreshState::default();

        let idr = Rc::new(RefCell::new(pic(0, NaluType::IdrNLp)));
        dpb.decoding_refresh_marking(&idr, NaluType::IdrNLp, &mut state, false);
        assert!(dpb.get_all_references().is_empty());

        dpb.store_picture(idr.clone(), DummyHandle::default())
            .unwrap();
        let found = dpb.find_ref_pic(0, 0).unwrap();
        assert!(Rc::ptr_eq(&found.0, &idr));

        // The marking of the new IDR picture does not mistake the old one for itself.
        stale.borrow_mut().set_reference(Reference::ShortTerm);
        let empty = ReferencePictureList::new();
        dpb.apply_rpl_marking(&idr, [&empty, &empty], &ReferencePicLists::default());
        let references = dpb.get_all_references();
        assert_eq!(references.len(), 1);
        assert!(Rc::ptr_eq(&references[0].0, &idr));

        // Without any picture used for reference, the lookup falls back to the POC alone.
        dpb.mark_all_as_unused_for_ref();
        let found = dpb.find_ref_pic(0, 0).unwrap();
        assert!(Rc::ptr_eq(&found.0, &stale));
    }
}
