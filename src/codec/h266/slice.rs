// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::codec::h266::nalu::NaluType;
use crate::codec::h266::nalu::SliceType;
use crate::codec::h266::parameter_sets::ApsType;
use crate::codec::h266::parameter_sets::Sps;
use crate::codec::h266::rpl::RefList;
use crate::codec::h266::rpl::ReferencePictureList;
use crate::codec::h266::rpl::RplError;

/// The slice-level information reference picture management works from. Everything except the
/// associated IRAP fields comes from the picture and slice headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Slice {
    pub nalu_type: NaluType,
    pub slice_type: SliceType,
    /// PicOrderCntVal of the picture containing this slice.
    pub pic_order_cnt_val: i32,
    /// nuh_layer_id.
    pub layer_id: u8,
    /// TemporalId.
    pub temporal_id: u8,
    /// ph_pic_parameter_set_id.
    pub pps_id: u8,
    /// APSs referred to by this slice.
    pub aps_ids: Vec<(u8, ApsType)>,
    pub pic_output_flag: bool,
    pub no_output_of_prior_pics_flag: bool,
    /// Whether temporal motion vector prediction is used by this slice.
    pub temporal_mvp_enabled_flag: bool,
    /// Whether this picture is a dependent random access point, as announced by SEI.
    pub is_drap: bool,
    /// The reference picture lists of this slice. When taken from the SPS, the chosen candidate
    /// has already been copied here, see [`Slice::select_sps_ref_pic_list`].
    pub ref_pic_lists: [ReferencePictureList; 2],
    /// Index of the SPS candidate each list was copied from, if any.
    pub rpl_sps_idx: [Option<usize>; 2],
    /// POC of the IRAP picture this picture is associated with.
    pub associated_irap_poc: i32,
    /// NAL unit type of the IRAP picture this picture is associated with.
    pub associated_irap_type: NaluType,
    /// Decoding order number of the IRAP picture this picture is associated with.
    pub associated_irap_decoding_order_number: u32,
}

impl Slice {
    pub fn ref_pic_list(&self, list: RefList) -> &ReferencePictureList {
        &self.ref_pic_lists[list as usize]
    }

    pub fn ref_pic_list_mut(&mut self, list: RefList) -> &mut ReferencePictureList {
        &mut self.ref_pic_lists[list as usize]
    }

    /// Number of active reference indices of `list`.
    pub fn num_ref_idx(&self, list: RefList) -> usize {
        match (self.slice_type, list) {
            (SliceType::I, _) | (SliceType::P, RefList::L1) => 0,
            _ => self.ref_pic_list(list).num_active(),
        }
    }

    /// Copies the `idx`-th SPS candidate of `list` into this slice.
    pub fn select_sps_ref_pic_list(
        &mut self,
        sps: &Sps,
        list: RefList,
        idx: usize,
    ) -> Result<(), RplError> {
        let rpl = sps
            .ref_pic_list(list, idx)
            .ok_or(RplError::ActiveExceedsEntries {
                active: idx + 1,
                len: sps.ref_pic_lists[list as usize].len(),
            })?;

        self.ref_pic_lists[list as usize] = rpl.clone();
        self.rpl_sps_idx[list as usize] = Some(idx);
        Ok(())
    }

    /// Whether this slice shares the POC and layer of `other`, i.e. belongs to the same picture.
    pub fn same_picture_as(&self, other: &Slice) -> bool {
        self.pic_order_cnt_val == other.pic_order_cnt_val && self.layer_id == other.layer_id
    }
}
