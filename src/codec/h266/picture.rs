// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::codec::h266::nalu::NaluType;
use crate::codec::h266::parameter_sets::Pps;
use crate::codec::h266::parameter_sets::Sps;
use crate::codec::h266::slice::Slice;
use crate::Resolution;
use crate::Window;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Reference {
    #[default]
    None,
    ShortTerm,
    LongTerm,
}

/// Size and scaling window of a picture, in luma samples.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PictureGeometry {
    pub size: Resolution,
    pub scaling_window: Window,
}

impl PictureGeometry {
    /// Width of the scaling window.
    pub fn scaled_width(&self) -> i32 {
        self.scaling_window.inner_width(self.size.width)
    }

    /// Height of the scaling window.
    pub fn scaled_height(&self) -> i32 {
        self.scaling_window.inner_height(self.size.height)
    }
}

/// Access to the sample buffers backing a picture, provided by the client.
pub trait RefPicHandle: Clone {
    /// Pads the reconstructed samples past the picture edges so that motion compensation may
    /// reference them.
    fn extend_border(&self) -> anyhow::Result<()>;

    /// Drops any block hash tables built for the picture.
    fn clear_hash(&self) {}
}

/// Data associated with an h.266 picture. Most fields are extracted from the
/// slice header and kept for future processing.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct PictureData {
    // Fields extracted from the slice header.
    pub nalu_type: NaluType,
    pub pic_order_cnt_val: i32,
    pub layer_id: u8,
    pub temporal_id: u8,
    pub pic_output_flag: bool,
    pub associated_irap_poc: i32,

    // Fields extracted from the parameter sets in effect.
    pub field_seq_flag: bool,
    /// Number of POC LSBs of the SPS this picture was coded with.
    pub bits_for_poc: u8,
    pub geometry: PictureGeometry,

    // Internal state.
    /// Position of the picture in decoding order.
    pub decoding_order_number: u32,
    /// Whether all the slices of the picture have been processed.
    pub reconstructed: bool,
    pub needed_for_output: bool,
    /// Set on pictures of the same sub-layer as a following STSA picture, which may then no
    /// longer be referenced by it or by pictures following it in that sub-layer.
    pub sub_layer_non_ref_due_to_stsa: bool,
    reference: Reference,
}

impl PictureData {
    /// Instantiates a new `PictureData` from the first slice of a picture.
    pub fn new_from_slice(slice: &Slice, sps: &Sps, pps: &Pps, decoding_order_number: u32) -> Self {
        Self {
            nalu_type: slice.nalu_type,
            pic_order_cnt_val: slice.pic_order_cnt_val,
            layer_id: slice.layer_id,
            temporal_id: slice.temporal_id,
            pic_output_flag: slice.pic_output_flag,
            associated_irap_poc: slice.associated_irap_poc,
            field_seq_flag: sps.field_seq_flag,
            bits_for_poc: sps.bits_for_poc(),
            geometry: pps.geometry(),
            decoding_order_number,
            reconstructed: false,
            needed_for_output: false,
            sub_layer_non_ref_due_to_stsa: false,
            reference: Default::default(),
        }
    }

    /// Whether the current picture is a reference, either ShortTerm or LongTerm.
    pub fn is_ref(&self) -> bool {
        !matches!(self.reference, Reference::None)
    }

    pub fn is_long_term(&self) -> bool {
        matches!(self.reference, Reference::LongTerm)
    }

    pub fn set_reference(&mut self, reference: Reference) {
        if self.reference != reference {
            log::debug!(
                "Set reference of POC {} (layer {}) to {:?}",
                self.pic_order_cnt_val,
                self.layer_id,
                reference
            );
        }

        self.reference = reference;
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }
}
