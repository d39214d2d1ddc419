// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Parameter sets, reduced to the fields that reference picture management depends on.
//!
//! Parameter sets are produced by a bitstream parser (or, when encoding, by the rate control
//! logic) and handed to [`crate::codec::h266::ps_manager::ParameterSetManager`], which owns them
//! from then on and shares them behind `Rc`.

use std::rc::Rc;

use enumn::N;

use crate::codec::h266::picture::PictureGeometry;
use crate::codec::h266::rpl::RefList;
use crate::codec::h266::rpl::ReferencePictureList;
use crate::Resolution;
use crate::Window;

/// Number of VPS ids.
pub const MAX_NUM_VPS: usize = 16;
/// Number of SPS ids.
pub const MAX_NUM_SPS: usize = 16;
/// Number of PPS ids.
pub const MAX_NUM_PPS: usize = 64;
/// Number of APS ids per APS type.
pub const MAX_NUM_APS: usize = 32;
/// Number of APS types.
pub const MAX_NUM_APS_TYPE: usize = 3;

/// Common interface of the parameter set kinds stored by
/// [`crate::codec::h266::ps_manager::ParameterSetMap`].
pub trait ParameterSet: Default {
    /// Name of the parameter set kind, for diagnostics.
    const KIND: &'static str;

    /// Key under which this parameter set is stored.
    fn id(&self) -> usize;

    /// Rewrites the identifiers of this parameter set so that [`ParameterSet::id`] returns `id`.
    fn set_id(&mut self, id: usize);
}

/// A H.266 Video Parameter Set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Vps {
    /// Identifier of the VPS for reference by other syntax elements.
    pub vps_id: u8,
    /// Maximum number of temporal sub-layers minus 1.
    pub max_sub_layers_minus1: u8,
    /// nuh_layer_id of each layer, indexed by general layer index.
    pub layer_id: Vec<u8>,
    /// For each layer, the general layer indices of its direct reference layers in signalling
    /// order. Inter-layer reference entries index into this list.
    pub direct_ref_layer_idx: Vec<Vec<u8>>,
}

impl Vps {
    /// Number of layers described by this VPS.
    pub fn max_layers(&self) -> usize {
        self.layer_id.len().max(1)
    }

    /// General layer index of the layer with nuh_layer_id `layer_id`.
    pub fn general_layer_idx(&self, layer_id: u8) -> Option<usize> {
        self.layer_id.iter().position(|&id| id == layer_id)
    }

    /// nuh_layer_id of the `ilrp_idx`-th direct reference layer of layer `layer_id`.
    pub fn direct_ref_layer_id(&self, layer_id: u8, ilrp_idx: u8) -> Option<u8> {
        let layer_idx = self.general_layer_idx(layer_id)?;
        let ref_layer_idx = self.direct_ref_layer_idx.get(layer_idx)?.get(usize::from(ilrp_idx))?;
        self.layer_id.get(usize::from(*ref_layer_idx)).copied()
    }

    /// Whether layer `layer_id` is coded without inter-layer prediction.
    pub fn is_independent_layer(&self, layer_id: u8) -> bool {
        self.general_layer_idx(layer_id)
            .and_then(|idx| self.direct_ref_layer_idx.get(idx))
            .map_or(true, |refs| refs.is_empty())
    }
}

impl ParameterSet for Vps {
    const KIND: &'static str = "VPS";

    fn id(&self) -> usize {
        usize::from(self.vps_id)
    }

    fn set_id(&mut self, id: usize) {
        self.vps_id = id as u8;
    }
}

#[derive(Debug, Default)]
pub struct VpsBuilder(Vps);

impl VpsBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn vps_id(mut self, value: u8) -> Self {
        self.0.vps_id = value;
        self
    }

    pub fn max_sub_layers_minus1(mut self, value: u8) -> Self {
        self.0.max_sub_layers_minus1 = value;
        self
    }

    /// Appends a layer that directly references the layers at the given general layer indices.
    pub fn layer(mut self, layer_id: u8, direct_ref_layer_idx: &[u8]) -> Self {
        self.0.layer_id.push(layer_id);
        self.0.direct_ref_layer_idx.push(direct_ref_layer_idx.to_vec());
        self
    }

    pub fn build(self) -> Vps {
        self.0
    }
}

/// A H.266 Sequence Parameter Set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sps {
    /// Identifier of the SPS for reference by other syntax elements.
    pub sps_id: u8,
    /// vps_video_parameter_set_id of the VPS referred to by this SPS, or 0 when the CVS has a
    /// single layer and no VPS.
    pub vps_id: u8,
    /// Maximum number of temporal sub-layers minus 1.
    pub max_sub_layers_minus1: u8,
    pub chroma_format_idc: u8,
    /// Maximum picture width in luma samples.
    pub pic_width_max_in_luma_samples: u32,
    /// Maximum picture height in luma samples.
    pub pic_height_max_in_luma_samples: u32,
    /// Specifies MaxPicOrderCntLsb = 2^(log2_max_pic_order_cnt_lsb_minus4 + 4).
    pub log2_max_pic_order_cnt_lsb_minus4: u8,
    /// Whether the CVS conveys pictures that represent fields.
    pub field_seq_flag: bool,
    /// Maximum decoded picture buffer size minus 1, for the highest temporal sub-layer.
    pub max_dec_pic_buffering_minus1: u8,
    /// Whether long-term reference pictures may be used.
    pub long_term_ref_pics_flag: bool,
    /// Whether inter-layer reference pictures may be used.
    pub inter_layer_prediction_enabled_flag: bool,
    /// Whether temporal motion vector predictors may be used.
    pub temporal_mvp_enabled_flag: bool,
    /// Whether reference pictures of a different size than the current picture may be used.
    pub ref_pic_resampling_enabled_flag: bool,
    /// Candidate reference picture lists that slices may select by index.
    pub ref_pic_lists: [Vec<ReferencePictureList>; 2],
}

impl Sps {
    /// Number of bits of the POC LSBs.
    pub fn bits_for_poc(&self) -> u8 {
        self.log2_max_pic_order_cnt_lsb_minus4 + 4
    }

    /// MaxPicOrderCntLsb.
    pub fn max_pic_order_cnt_lsb(&self) -> i32 {
        1 << self.bits_for_poc()
    }

    pub fn max_dpb_size(&self) -> usize {
        usize::from(self.max_dec_pic_buffering_minus1) + 1
    }

    /// The `idx`-th candidate list of `list`.
    pub fn ref_pic_list(&self, list: RefList, idx: usize) -> Option<&ReferencePictureList> {
        self.ref_pic_lists[list as usize].get(idx)
    }

    pub fn max_resolution(&self) -> Resolution {
        Resolution {
            width: self.pic_width_max_in_luma_samples,
            height: self.pic_height_max_in_luma_samples,
        }
    }
}

impl ParameterSet for Sps {
    const KIND: &'static str = "SPS";

    fn id(&self) -> usize {
        usize::from(self.sps_id)
    }

    fn set_id(&mut self, id: usize) {
        self.sps_id = id as u8;
    }
}

#[derive(Debug, Default)]
pub struct SpsBuilder(Sps);

impl SpsBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn sps_id(mut self, value: u8) -> Self {
        self.0.sps_id = value;
        self
    }

    pub fn vps_id(mut self, value: u8) -> Self {
        self.0.vps_id = value;
        self
    }

    pub fn max_sub_layers_minus1(mut self, value: u8) -> Self {
        self.0.max_sub_layers_minus1 = value;
        self
    }

    pub fn chroma_format_idc(mut self, value: u8) -> Self {
        self.0.chroma_format_idc = value;
        self
    }

    pub fn max_resolution(mut self, width: u32, height: u32) -> Self {
        self.0.pic_width_max_in_luma_samples = width;
        self.0.pic_height_max_in_luma_samples = height;
        self
    }

    pub fn log2_max_pic_order_cnt_lsb_minus4(mut self, value: u8) -> Self {
        self.0.log2_max_pic_order_cnt_lsb_minus4 = value;
        self
    }

    pub fn bits_for_poc(self, value: u8) -> Self {
        self.log2_max_pic_order_cnt_lsb_minus4(value.saturating_sub(4))
    }

    pub fn field_seq_flag(mut self, value: bool) -> Self {
        self.0.field_seq_flag = value;
        self
    }

    pub fn max_dec_pic_buffering_minus1(mut self, value: u8) -> Self {
        self.0.max_dec_pic_buffering_minus1 = value;
        self
    }

    pub fn long_term_ref_pics_flag(mut self, value: bool) -> Self {
        self.0.long_term_ref_pics_flag = value;
        self
    }

    pub fn inter_layer_prediction_enabled_flag(mut self, value: bool) -> Self {
        self.0.inter_layer_prediction_enabled_flag = value;
        self
    }

    pub fn temporal_mvp_enabled_flag(mut self, value: bool) -> Self {
        self.0.temporal_mvp_enabled_flag = value;
        self
    }

    pub fn ref_pic_resampling_enabled_flag(mut self, value: bool) -> Self {
        self.0.ref_pic_resampling_enabled_flag = value;
        self
    }

    /// Appends a candidate list to `list`.
    pub fn ref_pic_list(mut self, list: RefList, rpl: ReferencePictureList) -> Self {
        self.0.ref_pic_lists[list as usize].push(rpl);
        self
    }

    pub fn build(self) -> Sps {
        self.0
    }
}

/// A H.266 Picture Parameter Set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pps {
    /// Identifier of the PPS for reference by other syntax elements.
    pub pps_id: u8,
    /// sps_seq_parameter_set_id of the SPS referred to by this PPS.
    pub sps_id: u8,
    /// Width of each decoded picture referring to this PPS, in luma samples.
    pub pic_width_in_luma_samples: u32,
    /// Height of each decoded picture referring to this PPS, in luma samples.
    pub pic_height_in_luma_samples: u32,
    /// Scaling window used when computing the scaling ratio against reference pictures.
    pub scaling_window: Window,
    /// Whether the pictures referring to this PPS may mix VCL NAL unit types.
    pub mixed_nalu_types_in_pic_flag: bool,
    /// Default number of active reference indices minus 1, per list.
    pub num_ref_idx_default_active_minus1: [u8; 2],
}

impl Pps {
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.pic_width_in_luma_samples,
            height: self.pic_height_in_luma_samples,
        }
    }

    /// Geometry of the pictures referring to this PPS.
    pub fn geometry(&self) -> PictureGeometry {
        PictureGeometry {
            size: self.resolution(),
            scaling_window: self.scaling_window,
        }
    }
}

impl ParameterSet for Pps {
    const KIND: &'static str = "PPS";

    fn id(&self) -> usize {
        usize::from(self.pps_id)
    }

    fn set_id(&mut self, id: usize) {
        self.pps_id = id as u8;
    }
}

#[derive(Debug, Default)]
pub struct PpsBuilder(Pps);

impl PpsBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn pps_id(mut self, value: u8) -> Self {
        self.0.pps_id = value;
        self
    }

    pub fn sps_id(mut self, value: u8) -> Self {
        self.0.sps_id = value;
        self
    }

    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.0.pic_width_in_luma_samples = width;
        self.0.pic_height_in_luma_samples = height;
        self
    }

    pub fn scaling_window(mut self, left: i32, right: i32, top: i32, bottom: i32) -> Self {
        self.0.scaling_window = Window {
            left_offset: left,
            right_offset: right,
            top_offset: top,
            bottom_offset: bottom,
        };
        self
    }

    pub fn mixed_nalu_types_in_pic_flag(mut self, value: bool) -> Self {
        self.0.mixed_nalu_types_in_pic_flag = value;
        self
    }

    pub fn num_ref_idx_default_active_minus1(mut self, l0: u8, l1: u8) -> Self {
        self.0.num_ref_idx_default_active_minus1 = [l0, l1];
        self
    }

    pub fn build(self) -> Pps {
        self.0
    }
}

/// Type of the content carried by an APS.
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApsType {
    #[default]
    Alf = 0,
    Lmcs = 1,
    ScalingList = 2,
}

/// A H.266 Adaptation Parameter Set. The filter and scaling list payloads stay opaque and are
/// only kept in raw form by the parameter set table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Aps {
    /// Identifier of the APS within its type.
    pub aps_id: u8,
    pub aps_type: ApsType,
    pub layer_id: u8,
    pub temporal_id: u8,
}

impl Aps {
    /// Table key of the APS with id `aps_id` and type `aps_type`.
    pub fn key(aps_id: u8, aps_type: ApsType) -> usize {
        usize::from(aps_id) + MAX_NUM_APS * aps_type as usize
    }
}

impl ParameterSet for Aps {
    const KIND: &'static str = "APS";

    fn id(&self) -> usize {
        Self::key(self.aps_id, self.aps_type)
    }

    fn set_id(&mut self, id: usize) {
        self.aps_id = (id % MAX_NUM_APS) as u8;
        self.aps_type = ApsType::n((id / MAX_NUM_APS) as u32).unwrap_or_default();
    }
}

#[derive(Debug, Default)]
pub struct ApsBuilder(Aps);

impl ApsBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn aps_id(mut self, value: u8) -> Self {
        self.0.aps_id = value;
        self
    }

    pub fn aps_type(mut self, value: ApsType) -> Self {
        self.0.aps_type = value;
        self
    }

    pub fn layer_id(mut self, value: u8) -> Self {
        self.0.layer_id = value;
        self
    }

    pub fn temporal_id(mut self, value: u8) -> Self {
        self.0.temporal_id = value;
        self
    }

    pub fn build(self) -> Aps {
        self.0
    }
}

/// Shared handles to the parameter sets in effect for one picture.
#[derive(Clone, Debug)]
pub struct ActiveParameterSets {
    pub vps: Option<Rc<Vps>>,
    pub sps: Rc<Sps>,
    pub pps: Rc<Pps>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aps_keys_are_unique_per_type() {
        let alf = ApsBuilder::new().aps_id(5).aps_type(ApsType::Alf).build();
        let lmcs = ApsBuilder::new().aps_id(5).aps_type(ApsType::Lmcs).build();
        let scaling = ApsBuilder::new().aps_id(5).aps_type(ApsType::ScalingList).build();

        assert_eq!(alf.id(), 5);
        assert_eq!(lmcs.id(), 37);
        assert_eq!(scaling.id(), 69);

        let mut placeholder = Aps::default();
        placeholder.set_id(lmcs.id());
        assert_eq!(placeholder.aps_id, 5);
        assert_eq!(placeholder.aps_type, ApsType::Lmcs);
    }

    #[test]
    fn vps_direct_reference_layers() {
        let vps = VpsBuilder::new()
            .vps_id(1)
            .layer(0, &[])
            .layer(2, &[0])
            .layer(4, &[1, 0])
            .build();

        assert_eq!(vps.max_layers(), 3);
        assert_eq!(vps.general_layer_idx(4), Some(2));
        assert_eq!(vps.general_layer_idx(3), None);
        assert_eq!(vps.direct_ref_layer_id(2, 0), Some(0));
        assert_eq!(vps.direct_ref_layer_id(4, 0), Some(2));
        assert_eq!(vps.direct_ref_layer_id(4, 1), Some(0));
        assert_eq!(vps.direct_ref_layer_id(4, 2), None);
        assert!(vps.is_independent_layer(0));
        assert!(!vps.is_independent_layer(2));
    }

    #[test]
    fn sps_poc_bits() {
        let sps = SpsBuilder::new().bits_for_poc(8).build();
        assert_eq!(sps.log2_max_pic_order_cnt_lsb_minus4, 4);
        assert_eq!(sps.bits_for_poc(), 8);
        assert_eq!(sps.max_pic_order_cnt_lsb(), 256);
    }
}
