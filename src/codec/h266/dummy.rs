// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Dummy picture handles and rescaler whose only purpose is to let the reference picture
//! management run in isolation, while recording what was asked of them.

use std::cell::RefCell;
use std::rc::Rc;

use crate::codec::h266::dpb::Dpb;
use crate::codec::h266::nalu::NaluType;
use crate::codec::h266::picture::PictureData;
use crate::codec::h266::picture::PictureGeometry;
use crate::codec::h266::picture::RefPicHandle;
use crate::codec::h266::resampling::Rescaler;
use crate::codec::h266::resampling::ScalingRatio;
use crate::Resolution;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DummyHandleState {
    pub border_extensions: usize,
    pub hash_clears: usize,
    /// Makes border extension fail.
    pub broken: bool,
}

#[derive(Clone, Debug, Default)]
pub struct DummyHandle(Rc<RefCell<DummyHandleState>>);

impl DummyHandle {
    pub fn broken() -> Self {
        let handle = Self::default();
        handle.0.borrow_mut().broken = true;
        handle
    }

    pub fn state(&self) -> DummyHandleState {
        *self.0.borrow()
    }
}

impl RefPicHandle for DummyHandle {
    fn extend_border(&self) -> anyhow::Result<()> {
        let mut state = self.0.borrow_mut();
        if state.broken {
            anyhow::bail!("broken picture");
        }

        state.border_extensions += 1;
        Ok(())
    }

    fn clear_hash(&self) {
        self.0.borrow_mut().hash_clears += 1;
    }
}

#[derive(Debug, Default)]
pub struct DummyRescaler {
    /// Geometries of the working pictures allocated so far.
    pub allocations: Vec<PictureGeometry>,
    /// Ratio and direction of every rescale request.
    pub rescales: Vec<(ScalingRatio, bool)>,
}

impl Rescaler for DummyRescaler {
    type Handle = DummyHandle;

    fn new_working_picture(
        &mut self,
        geometry: &PictureGeometry,
        _layer_id: u8,
    ) -> anyhow::Result<Self::Handle> {
        self.allocations.push(*geometry);
        Ok(DummyHandle::default())
    }

    fn rescale(
        &mut self,
        ratio: ScalingRatio,
        _src: &Self::Handle,
        _src_geometry: &PictureGeometry,
        _dst: &Self::Handle,
        _dst_geometry: &PictureGeometry,
        downsampling: bool,
    ) -> anyhow::Result<()> {
        self.rescales.push((ratio, downsampling));
        Ok(())
    }
}

/// A reconstructed 64x64 picture of layer 0 and sub-layer 0, with 8 bits of POC LSBs.
pub fn pic(poc: i32, nalu_type: NaluType) -> PictureData {
    let mut pic = PictureData::default();
    pic.nalu_type = nalu_type;
    pic.pic_order_cnt_val = poc;
    pic.bits_for_poc = 8;
    pic.reconstructed = true;
    pic.geometry = PictureGeometry {
        size: Resolution {
            width: 64,
            height: 64,
        },
        scaling_window: Default::default(),
    };
    pic
}

/// Same as [`pic`], with `f` applied to the result.
pub fn pic_with<F: FnOnce(&mut PictureData)>(poc: i32, nalu_type: NaluType, f: F) -> PictureData {
    let mut pic = pic(poc, nalu_type);
    f(&mut pic);
    pic
}

/// A DPB holding `pics`, all marked as short-term references and keeping their output state.
pub fn dpb_with(pics: &[PictureData]) -> Dpb<DummyHandle> {
    let mut dpb = Dpb::default();

    for pic in pics {
        let entry = dpb
            .store_picture(Rc::new(RefCell::new(pic.clone())), DummyHandle::default())
            .unwrap();
        entry.0.borrow_mut().needed_for_output = pic.needed_for_output;
    }

    dpb
}
