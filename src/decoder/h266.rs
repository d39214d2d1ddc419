// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-picture driver of the H.266 reference picture management.
//!
//! [`H266RefPicManager`] sequences the codec-level pieces for each coded picture: parameter set
//! activation, decoding refresh marking and insertion of the picture in the DPB when it starts,
//! then for each slice the availability checks, reference picture list construction,
//! conformance checks, reference marking and resampling.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use bytes::Bytes;

use crate::codec::h266::conformance::check_active_ref_pics_available;
use crate::codec::h266::conformance::check_all_ref_pics_available;
use crate::codec::h266::conformance::check_drap;
use crate::codec::h266::conformance::check_leading_picture_restrictions;
use crate::codec::h266::conformance::check_rpl_restrictions;
use crate::codec::h266::conformance::check_stsa;
use crate::codec::h266::conformance::DrapState;
use crate::codec::h266::dpb::Dpb;
use crate::codec::h266::dpb::DpbEntry;
use crate::codec::h266::dpb::RefreshState;
use crate::codec::h266::nalu::NaluType;
use crate::codec::h266::parameter_sets::ActiveParameterSets;
use crate::codec::h266::parameter_sets::Aps;
use crate::codec::h266::parameter_sets::Pps;
use crate::codec::h266::parameter_sets::Sps;
use crate::codec::h266::parameter_sets::Vps;
use crate::codec::h266::picture::PictureData;
use crate::codec::h266::picture::RefPicHandle;
use crate::codec::h266::ps_manager::ParameterSetManager;
use crate::codec::h266::resampling::scale_ref_pic_lists;
use crate::codec::h266::resampling::Rescaler;
use crate::codec::h266::resampling::ScaledRefPicPool;
use crate::codec::h266::resampling::WorkingRefLists;
use crate::codec::h266::resolver::construct_ref_pic_lists;
use crate::codec::h266::resolver::ReferencePicLists;
use crate::codec::h266::rpl::RefList;
use crate::codec::h266::slice::Slice;
use crate::decoder::Config;
use crate::decoder::Result;

/// The IRAP picture following pictures are associated with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct IrapInfo {
    poc: i32,
    nalu_type: NaluType,
    decoding_order_number: u32,
}

struct CurrentPicState<T> {
    /// The picture as stored in the DPB.
    pic: DpbEntry<T>,
    /// The parameter sets the picture is coded with.
    active: ActiveParameterSets,
    /// The IRAP picture this picture is associated with.
    irap: IrapInfo,
    /// The first slice of the picture.
    first_slice: Slice,
    /// Number of slices handled so far.
    num_slices: usize,
}

/// The references of a slice.
#[derive(Debug)]
pub struct SliceRefs<T> {
    /// The reference pictures as stored in the DPB.
    pub ref_pic_lists: ReferencePicLists<T>,
    /// The pictures prediction reads from, resampled if needed.
    pub working: WorkingRefLists<T>,
}

pub struct H266RefPicManager<T: RefPicHandle> {
    config: Config,

    /// The stored parameter sets and the active ones.
    parameter_sets: ParameterSetManager,

    /// The decoded picture buffer.
    dpb: Dpb<T>,
    /// State of the deferred decoding refresh of CRA pictures.
    refresh: RefreshState,
    drap: DrapState,
    /// Rescaled references of the slice being processed.
    scaled_refs: ScaledRefPicPool<T>,

    /// Decoding order number of the next picture.
    decoding_order_number: u32,
    /// The latest IRAP picture in decoding order.
    last_irap: Option<IrapInfo>,

    /// The picture currently being processed.
    current_pic: Option<CurrentPicState<T>>,

    /// Pictures bumped out of the DPB to make room, in output order.
    ready_queue: Vec<DpbEntry<T>>,
}

impl<T: RefPicHandle> H266RefPicManager<T> {
    pub fn new(config: Config) -> Self {
        let mut dpb = Dpb::default();
        dpb.set_max_num_pics(config.max_dpb_size);

        Self {
            parameter_sets: ParameterSetManager::new(config.multi_sps),
            dpb,
            refresh: Default::default(),
            drap: DrapState::new(config.drap_checks),
            scaled_refs: Default::default(),
            decoding_order_number: 0,
            last_irap: None,
            current_pic: None,
            ready_queue: Default::default(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dpb(&self) -> &Dpb<T> {
        &self.dpb
    }

    pub fn parameter_sets(&self) -> &ParameterSetManager {
        &self.parameter_sets
    }

    pub fn parameter_sets_mut(&mut self) -> &mut ParameterSetManager {
        &mut self.parameter_sets
    }

    /// The picture being processed, if any.
    pub fn current_picture(&self) -> Option<&DpbEntry<T>> {
        self.current_pic.as_ref().map(|c| &c.pic)
    }

    /// Takes the pictures that left the DPB to make room for new ones.
    pub fn take_ready(&mut self) -> Vec<DpbEntry<T>> {
        std::mem::take(&mut self.ready_queue)
    }

    pub fn store_vps(&mut self, vps: Vps, raw: Option<Bytes>) -> Result<()> {
        Ok(self.parameter_sets.store_vps(vps, raw)?)
    }

    pub fn store_sps(&mut self, sps: Sps, raw: Option<Bytes>) -> Result<()> {
        Ok(self.parameter_sets.store_sps(sps, raw)?)
    }

    pub fn store_pps(&mut self, pps: Pps, raw: Option<Bytes>) -> Result<()> {
        Ok(self.parameter_sets.store_pps(pps, raw)?)
    }

    pub fn store_aps(&mut self, aps: Aps, raw: Option<Bytes>) -> Result<()> {
        Ok(self.parameter_sets.store_aps(aps, raw)?)
    }

    /// Called once per picture, with its first slice, to start it.
    ///
    /// Activates the parameter sets of the picture, fills the associated IRAP fields of `slice`,
    /// applies the decoding refresh marking and stores the picture in the DPB with `handle`.
    /// A picture still in progress is finished first.
    pub fn begin_picture(&mut self, slice: &mut Slice, handle: T) -> Result<DpbEntry<T>> {
        if self.current_pic.is_some() {
            log::debug!("Starting a new picture before the previous one was finished");
            self.finish_picture()?;
        }

        let is_irap = slice.nalu_type.is_irap();
        self.parameter_sets
            .try_activate_pps(slice.pps_id, is_irap)
            .map_err(|e| {
                log::warn!("{}", e);
                e
            })?;
        for &(aps_id, aps_type) in &slice.aps_ids {
            self.parameter_sets.try_activate_aps(aps_id, aps_type)?;
        }

        let active = self
            .parameter_sets
            .active_parameter_sets()
            .context("No active parameter sets after activation")?;

        let this_irap = IrapInfo {
            poc: slice.pic_order_cnt_val,
            nalu_type: slice.nalu_type,
            decoding_order_number: self.decoding_order_number,
        };
        let irap = match self.last_irap {
            Some(irap) => irap,
            None => this_irap,
        };
        Self::set_associated_irap(slice, &irap);
        if is_irap {
            self.last_irap = Some(this_irap);
        }

        let pic = PictureData::new_from_slice(
            slice,
            &active.sps,
            &active.pps,
            self.decoding_order_number,
        );
        self.decoding_order_number = self.decoding_order_number.wrapping_add(1);

        log::debug!(
            "Begin picture POC {} (layer {}, {:?})",
            pic.pic_order_cnt_val,
            pic.layer_id,
            pic.nalu_type
        );

        let pic = Rc::new(RefCell::new(pic));
        self.dpb.decoding_refresh_marking(
            &pic,
            slice.associated_irap_type,
            &mut self.refresh,
            self.config.efficient_field_irap,
        );

        self.make_room_in_dpb();
        let entry = self.dpb.store_picture(pic, handle)?;

        self.current_pic = Some(CurrentPicState {
            pic: entry.clone(),
            active,
            irap,
            first_slice: slice.clone(),
            num_slices: 0,
        });

        Ok(entry)
    }

    fn set_associated_irap(slice: &mut Slice, irap: &IrapInfo) {
        slice.associated_irap_poc = irap.poc;
        slice.associated_irap_type = irap.nalu_type;
        slice.associated_irap_decoding_order_number = irap.decoding_order_number;
    }

    /// Removes the pictures that are done with, then bumps pictures until the DPB has room for
    /// one more.
    fn make_room_in_dpb(&mut self) {
        self.dpb.remove_unused();

        while self.dpb.len() >= self.dpb.max_num_pics() {
            match self.dpb.bump(false) {
                Some(pic) => {
                    log::debug!(
                        "Bumped POC {} to make room in the DPB",
                        pic.0.borrow().pic_order_cnt_val
                    );
                    self.ready_queue.push(pic);
                }
                None => break,
            }
        }
    }

    /// Handles a slice of the current picture and returns its references.
    pub fn handle_slice<R>(&mut self, slice: &mut Slice, rescaler: &mut R) -> Result<SliceRefs<T>>
    where
        R: Rescaler<Handle = T>,
    {
        let cur = self
            .current_pic
            .as_mut()
            .context("Slice received outside of a picture")?;
        if !slice.same_picture_as(&cur.first_slice) {
            return Err(anyhow::anyhow!(
                "Slice of POC {} handed to picture POC {}",
                slice.pic_order_cnt_val,
                cur.first_slice.pic_order_cnt_val
            )
            .into());
        }
        Self::set_associated_irap(slice, &cur.irap);

        let first_slice = cur.num_slices == 0;
        cur.num_slices += 1;

        let active = cur.active.clone();
        let cur_entry = cur.pic.clone();
        let cur_pic = cur_entry.0.borrow().clone();

        for list in RefList::ALL {
            check_active_ref_pics_available(slice, list, slice.num_ref_idx(list), &self.dpb)?;

            if first_slice {
                // Inactive entries are only needed by later pictures.
                if let Err(loss) = check_all_ref_pics_available(slice, list, &self.dpb) {
                    log::debug!("Inactive entry of {:?} is not available: {}", list, loss);
                }
            }
        }

        let (ref_pic_lists, intents) = construct_ref_pic_lists(
            slice,
            active.sps.bits_for_poc(),
            active.vps.as_deref(),
            &self.dpb,
        )?;
        self.dpb.apply_intents(&intents);

        let mut violations = vec![];
        if first_slice {
            violations.extend(check_leading_picture_restrictions(
                slice,
                &self.dpb,
                active.pps.mixed_nalu_types_in_pic_flag,
            ));

            if self.config.rpl_restriction_checks {
                violations.extend(check_rpl_restrictions(
                    slice,
                    &active.sps,
                    cur_pic.decoding_order_number,
                    &self.dpb,
                ));
            }
        }
        violations.extend(check_stsa(slice, &ref_pic_lists));
        violations.extend(check_drap(slice, &self.drap, &ref_pic_lists));
        self.config.conformance_policy.enforce(violations)?;

        if first_slice {
            let violations = self.dpb.apply_rpl_marking(
                &cur_entry.0,
                [
                    slice.ref_pic_list(RefList::L0),
                    slice.ref_pic_list(RefList::L1),
                ],
                &ref_pic_lists,
            );
            self.config.conformance_policy.enforce(violations)?;

            if slice.nalu_type.is_stsa() {
                self.dpb.mark_stsa_sub_layer_non_reference(&cur_entry.0);
            }

            log::trace!("{:#?}", self.dpb);
        }

        let working = scale_ref_pic_lists(
            slice,
            &cur_pic.geometry,
            &ref_pic_lists,
            &mut self.scaled_refs,
            rescaler,
            self.config.whole_picture_resampling,
        )?;

        Ok(SliceRefs {
            ref_pic_lists,
            working,
        })
    }

    /// Called once all the slices of the current picture have been handled.
    pub fn finish_picture(&mut self) -> Result<()> {
        let cur = self
            .current_pic
            .take()
            .context("No picture to finish")?;

        let mut pic = cur.pic.0.borrow_mut();
        log::debug!("Finishing picture POC {}", pic.pic_order_cnt_val);
        pic.reconstructed = true;
        drop(pic);

        self.drap.update(&cur.first_slice);
        self.scaled_refs.clear();
        self.dpb.remove_unused();

        Ok(())
    }

    /// Finishes the current picture, if any, and empties the DPB. Returns the pictures that were
    /// pending output, in output order.
    pub fn flush(&mut self) -> Result<Vec<DpbEntry<T>>> {
        if self.current_pic.is_some() {
            self.finish_picture()?;
        }

        let mut pics = self.take_ready();
        pics.extend(self.dpb.drain());
        self.dpb.clear();

        self.refresh = Default::default();
        self.drap = DrapState::new(self.config.drap_checks);
        self.last_irap = None;

        Ok(pics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::h266::conformance::ConformancePolicy;
    use crate::codec::h266::conformance::PictureLoss;
    use crate::codec::h266::conformance::Violation;
    use crate::codec::h266::dummy::DummyHandle;
    use crate::codec::h266::dummy::DummyRescaler;
    use crate::codec::h266::nalu::SliceType;
    use crate::codec::h266::parameter_sets::PpsBuilder;
    use crate::codec::h266::parameter_sets::SpsBuilder;
    use crate::codec::h266::picture::Reference;
    use crate::codec::h266::ps_manager::ActivationError;
    use crate::codec::h266::rpl::ReferencePictureList;
    use crate::codec::h266::rpl::RplEntry;
    use crate::decoder::Error;

    fn manager(config: Config) -> H266RefPicManager<DummyHandle> {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut manager = H266RefPicManager::new(config);
        manager
            .store_sps(SpsBuilder::new().bits_for_poc(8).build(), None)
            .unwrap();
        manager
            .store_pps(PpsBuilder::new().resolution(64, 64).build(), None)
            .unwrap();
        manager
    }

    fn slice(poc: i32, nalu_type: NaluType, l0: &[RplEntry], l1: &[RplEntry]) -> Slice {
        let slice_type = if l0.is_empty() {
            SliceType::I
        } else if l1.is_empty() {
            SliceType::P
        } else {
            SliceType::B
        };

        Slice {
            nalu_type,
            slice_type,
            pic_order_cnt_val: poc,
            pic_output_flag: true,
            ref_pic_lists: [
                ReferencePictureList::from_entries(l0).unwrap(),
                ReferencePictureList::from_entries(l1).unwrap(),
            ],
            ..Default::default()
        }
    }

    fn decode(
        manager: &mut H266RefPicManager<DummyHandle>,
        mut slice: Slice,
    ) -> Result<SliceRefs<DummyHandle>> {
        manager.begin_picture(&mut slice, DummyHandle::default())?;
        let refs = manager.handle_slice(&mut slice, &mut DummyRescaler::default());
        manager.finish_picture()?;
        refs
    }

    fn references(manager: &H266RefPicManager<DummyHandle>) -> Vec<(i32, Reference)> {
        manager
            .dpb()
            .pictures()
            .map(|p| (p.pic_order_cnt_val, *p.reference()))
            .collect()
    }

    #[test]
    fn ip_sequence() {
        let mut manager = manager(Default::default());

        decode(&mut manager, slice(0, NaluType::IdrNLp, &[], &[])).unwrap();
        decode(
            &mut manager,
            slice(1, NaluType::TrailNut, &[RplEntry::ShortTerm { delta_poc: 1 }], &[]),
        )
        .unwrap();
        let refs = decode(
            &mut manager,
            slice(
                2,
                NaluType::TrailNut,
                &[RplEntry::ShortTerm { delta_poc: 1 }],
                &[],
            ),
        )
        .unwrap();

        assert_eq!(refs.ref_pic_lists.ref_pocs(RefList::L0), vec![1]);
        assert!(!refs.working.get(RefList::L0, 0).unwrap().rescaled);
        // POC 0 is no longer listed.
        assert_eq!(
            references(&manager),
            vec![
                (0, Reference::None),
                (1, Reference::ShortTerm),
                (2, Reference::ShortTerm)
            ]
        );
        assert!(manager
            .dpb()
            .pictures()
            .all(|p| p.reconstructed && p.bits_for_poc == 8));
    }

    #[test]
    fn slice_of_another_picture() {
        let mut manager = manager(Default::default());
        let mut idr = slice(0, NaluType::IdrNLp, &[], &[]);
        manager
            .begin_picture(&mut idr, DummyHandle::default())
            .unwrap();

        let mut other = slice(4, NaluType::TrailNut, &[], &[]);
        assert!(matches!(
            manager.handle_slice(&mut other, &mut DummyRescaler::default()),
            Err(Error::Other(_))
        ));
        assert!(manager
            .handle_slice(&mut idr, &mut DummyRescaler::default())
            .is_ok());
    }

    #[test]
    fn missing_pps() {
        let mut manager = manager(Default::default());
        let mut slice = slice(0, NaluType::IdrNLp, &[], &[]);
        slice.pps_id = 3;

        assert!(matches!(
            manager.begin_picture(&mut slice, DummyHandle::default()),
            Err(Error::Activation(ActivationError::MissingPps(3)))
        ));
        assert!(manager.dpb().is_empty());
        assert!(manager.current_picture().is_none());
    }

    #[test]
    fn lost_reference() {
        let mut manager = manager(Default::default());
        decode(&mut manager, slice(0, NaluType::IdrNLp, &[], &[])).unwrap();

        let result = decode(
            &mut manager,
            slice(8, NaluType::TrailNut, &[RplEntry::ShortTerm { delta_poc: 4 }], &[]),
        );
        assert!(matches!(
            result,
            Err(Error::PictureLoss(PictureLoss { poc: 4, .. }))
        ));
    }

    #[test]
    fn long_term_reference() {
        let mut manager = manager(Default::default());
        decode(&mut manager, slice(0, NaluType::IdrNLp, &[], &[])).unwrap();

        let lt = RplEntry::LongTerm {
            poc_lsb_lt: 0,
            delta_poc_msb_cycle_lt: None,
        };
        decode(&mut manager, slice(4, NaluType::TrailNut, &[lt], &[])).unwrap();
        assert_eq!(
            references(&manager),
            vec![(0, Reference::LongTerm), (4, Reference::ShortTerm)]
        );

        let refs = decode(
            &mut manager,
            slice(8, NaluType::TrailNut, &[RplEntry::ShortTerm { delta_poc: 4 }], &[lt]),
        )
        .unwrap();
        assert!(refs.ref_pic_lists.is_used_as_long_term(RefList::L1, 0));
        assert_eq!(refs.ref_pic_lists.ref_poc(RefList::L1, 0), Some(0));
        assert_eq!(
            references(&manager),
            vec![
                (0, Reference::LongTerm),
                (4, Reference::ShortTerm),
                (8, Reference::ShortTerm)
            ]
        );
    }

    #[test]
    fn cra_with_leading_pictures() {
        let mut manager = manager(Default::default());
        decode(&mut manager, slice(0, NaluType::IdrNLp, &[], &[])).unwrap();
        decode(
            &mut manager,
            slice(8, NaluType::TrailNut, &[RplEntry::ShortTerm { delta_poc: 8 }], &[]),
        )
        .unwrap();

        let mut cra = slice(16, NaluType::CraNut, &[], &[]);
        cra.ref_pic_lists[0] = ReferencePictureList::from_entries(&[RplEntry::ShortTerm {
            delta_poc: 8,
        }])
        .unwrap();
        cra.ref_pic_lists[0].set_num_active(0).unwrap();
        decode(&mut manager, cra).unwrap();

        // The RASL picture may still refer to the picture preceding the CRA.
        let refs = decode(
            &mut manager,
            slice(
                12,
                NaluType::RaslNut,
                &[RplEntry::ShortTerm { delta_poc: 4 }],
                &[RplEntry::ShortTerm { delta_poc: -4 }],
            ),
        )
        .unwrap();
        assert_eq!(refs.ref_pic_lists.ref_pocs(RefList::L0), vec![8]);
        assert_eq!(refs.ref_pic_lists.ref_pocs(RefList::L1), vec![16]);

        // The first trailing picture applies the deferred refresh.
        decode(
            &mut manager,
            slice(20, NaluType::TrailNut, &[RplEntry::ShortTerm { delta_poc: 4 }], &[]),
        )
        .unwrap();
        assert!(manager
            .dpb()
            .pictures()
            .filter(|p| p.pic_order_cnt_val < 16)
            .all(|p| !p.is_ref()));
    }

    #[test]
    fn strict_policy_rejects_violations() {
        let config = Config {
            conformance_policy: ConformancePolicy::Strict,
            ..Default::default()
        };
        let mut manager = manager(config);
        decode(&mut manager, slice(16, NaluType::IdrWRadl, &[], &[])).unwrap();

        // A trailing picture with a POC lower than its IRAP.
        let result = decode(
            &mut manager,
            slice(12, NaluType::TrailNut, &[RplEntry::ShortTerm { delta_poc: -4 }], &[]),
        );
        assert!(matches!(
            result,
            Err(Error::Conformance(Violation::LeadingPictureType { poc: 12, .. }))
        ));

        let mut lenient = self::manager(Default::default());
        decode(&mut lenient, slice(16, NaluType::IdrWRadl, &[], &[])).unwrap();
        decode(
            &mut lenient,
            slice(12, NaluType::TrailNut, &[RplEntry::ShortTerm { delta_poc: -4 }], &[]),
        )
        .unwrap();
    }

    #[test]
    fn stsa_marks_sub_layer() {
        let mut manager = manager(Default::default());
        decode(&mut manager, slice(0, NaluType::IdrNLp, &[], &[])).unwrap();

        let mut tid1 = slice(1, NaluType::TrailNut, &[RplEntry::ShortTerm { delta_poc: 1 }], &[]);
        tid1.temporal_id = 1;
        decode(&mut manager, tid1).unwrap();

        let mut stsa = slice(
            2,
            NaluType::StsaNut,
            &[RplEntry::ShortTerm { delta_poc: 2 }],
            &[],
        );
        stsa.temporal_id = 1;
        // POC 1 is kept for later pictures.
        stsa.ref_pic_lists[0]
            .push(RplEntry::ShortTerm { delta_poc: 1 })
            .unwrap();
        stsa.ref_pic_lists[0].set_num_active(1).unwrap();
        decode(&mut manager, stsa).unwrap();

        let flagged = manager
            .dpb()
            .pictures()
            .filter(|p| p.sub_layer_non_ref_due_to_stsa)
            .map(|p| p.pic_order_cnt_val)
            .collect::<Vec<_>>();
        assert_eq!(flagged, vec![1]);
    }

    #[test]
    fn flush_outputs_in_poc_order() {
        let mut manager = manager(Default::default());
        decode(&mut manager, slice(0, NaluType::IdrNLp, &[], &[])).unwrap();
        decode(
            &mut manager,
            slice(
                4,
                NaluType::TrailNut,
                &[RplEntry::ShortTerm { delta_poc: 4 }],
                &[],
            ),
        )
        .unwrap();
        decode(
            &mut manager,
            slice(
                2,
                NaluType::TrailNut,
                &[RplEntry::ShortTerm { delta_poc: 2 }],
                &[RplEntry::ShortTerm { delta_poc: -2 }],
            ),
        )
        .unwrap();

        let pocs = manager
            .flush()
            .unwrap()
            .iter()
            .map(|p| p.0.borrow().pic_order_cnt_val)
            .collect::<Vec<_>>();
        assert_eq!(pocs, vec![0, 2, 4]);
        assert!(manager.dpb().is_empty());
    }

    #[test]
    fn full_dpb_bumps() {
        let config = Config {
            max_dpb_size: 2,
            ..Default::default()
        };
        let mut manager = manager(config);
        decode(&mut manager, slice(0, NaluType::IdrNLp, &[], &[])).unwrap();
        // An intra picture with empty lists leaves POC 0 unreferenced.
        decode(&mut manager, slice(1, NaluType::TrailNut, &[], &[])).unwrap();
        decode(
            &mut manager,
            slice(2, NaluType::TrailNut, &[RplEntry::ShortTerm { delta_poc: 1 }], &[]),
        )
        .unwrap();

        let ready = manager
            .take_ready()
            .iter()
            .map(|p| p.0.borrow().pic_order_cnt_val)
            .collect::<Vec<_>>();
        assert_eq!(ready, vec![0]);
        assert_eq!(manager.dpb().len(), 2);
    }

    #[test]
    fn idr_restarts_poc() {
        let mut manager = manager(Default::default());
        let trail = || slice(1, NaluType::TrailNut, &[RplEntry::ShortTerm { delta_poc: 1 }], &[]);

        decode(&mut manager, slice(0, NaluType::IdrNLp, &[], &[])).unwrap();
        decode(&mut manager, trail()).unwrap();

        let mut idr = slice(0, NaluType::IdrNLp, &[], &[]);
        idr.no_output_of_prior_pics_flag = true;
        decode(&mut manager, idr).unwrap();

        let dons = |manager: &H266RefPicManager<DummyHandle>| {
            manager
                .dpb()
                .pictures()
                .filter(|p| p.is_ref())
                .map(|p| p.decoding_order_number)
                .collect::<Vec<_>>()
        };
        assert_eq!(dons(&manager), vec![2]);

        let refs = decode(&mut manager, trail()).unwrap();
        let ref_pic = refs.ref_pic_lists.get(RefList::L0, 0).unwrap();
        assert_eq!(ref_pic.pic.0.borrow().decoding_order_number, 2);
        assert_eq!(dons(&manager), vec![2, 3]);
    }
}
