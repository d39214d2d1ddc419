// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reference picture resampling.
//!
//! Each reference of a slice is compared with the current picture. References of a different
//! size or scaling window get a scaling ratio and, when the whole picture is resampled at once,
//! a rescaled copy that is cached for the duration of the slice.

use thiserror::Error;

use crate::codec::h266::dpb::DpbEntry;
use crate::codec::h266::picture::PictureGeometry;
use crate::codec::h266::picture::RefPicHandle;
use crate::codec::h266::resolver::ReferencePicLists;
use crate::codec::h266::rpl::RefList;
use crate::codec::h266::rpl::MAX_NUM_REF;
use crate::codec::h266::slice::Slice;

/// Precision of the scaling ratios, in bits.
pub const SCALE_RATIO_BITS: u32 = 14;

/// Horizontal and vertical ratios between the scaling windows of a reference and of the current
/// picture, in units of `1 << SCALE_RATIO_BITS`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScalingRatio {
    pub x: i32,
    pub y: i32,
}

impl ScalingRatio {
    pub const UNIT: ScalingRatio = ScalingRatio {
        x: 1 << SCALE_RATIO_BITS,
        y: 1 << SCALE_RATIO_BITS,
    };

    pub fn new(ref_geometry: &PictureGeometry, cur_geometry: &PictureGeometry) -> Self {
        let ratio = |ref_len: i32, cur_len: i32| {
            let cur_len = i64::from(cur_len.max(1));
            (((i64::from(ref_len) << SCALE_RATIO_BITS) + (cur_len >> 1)) / cur_len) as i32
        };

        Self {
            x: ratio(ref_geometry.scaled_width(), cur_geometry.scaled_width()),
            y: ratio(ref_geometry.scaled_height(), cur_geometry.scaled_height()),
        }
    }

    pub fn is_unit(&self) -> bool {
        *self == Self::UNIT
    }
}

impl Default for ScalingRatio {
    fn default() -> Self {
        Self::UNIT
    }
}

/// Rescales reference pictures, provided by the client.
pub trait Rescaler {
    type Handle: RefPicHandle;

    /// Allocates a picture to rescale references into.
    fn new_working_picture(
        &mut self,
        geometry: &PictureGeometry,
        layer_id: u8,
    ) -> anyhow::Result<Self::Handle>;

    /// Resamples `src` into `dst`. `downsampling` is set when `src` is at least as large as
    /// `dst` in both dimensions.
    fn rescale(
        &mut self,
        ratio: ScalingRatio,
        src: &Self::Handle,
        src_geometry: &PictureGeometry,
        dst: &Self::Handle,
        dst_geometry: &PictureGeometry,
        downsampling: bool,
    ) -> anyhow::Result<()>;
}

#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("no room left for more than {max} rescaled references")]
    PoolExhausted { max: usize },
    #[error("picture {poc} uses temporal MV prediction without a same resolution reference")]
    TmvpWithoutSameResolutionRef { poc: i32 },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Clone, Debug)]
struct ScaledRefPic<T> {
    poc: i32,
    layer_id: u8,
    handle: T,
}

/// Rescaled copies of the references of the slice being processed, one per POC and layer.
#[derive(Debug)]
pub struct ScaledRefPicPool<T> {
    pics: Vec<ScaledRefPic<T>>,
}

impl<T> Default for ScaledRefPicPool<T> {
    fn default() -> Self {
        Self {
            pics: Default::default(),
        }
    }
}

impl<T: Clone> ScaledRefPicPool<T> {
    pub fn len(&self) -> usize {
        self.pics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pics.is_empty()
    }

    pub fn clear(&mut self) {
        self.pics.clear();
    }

    fn get(&self, poc: i32, layer_id: u8) -> Option<T> {
        self.pics
            .iter()
            .find(|p| p.poc == poc && p.layer_id == layer_id)
            .map(|p| p.handle.clone())
    }

    fn insert(&mut self, poc: i32, layer_id: u8, handle: T) -> Result<(), ResampleError> {
        if self.pics.len() >= MAX_NUM_REF {
            return Err(ResampleError::PoolExhausted { max: MAX_NUM_REF });
        }

        self.pics.push(ScaledRefPic {
            poc,
            layer_id,
            handle,
        });
        Ok(())
    }
}

/// The picture prediction reads from for one reference index.
#[derive(Clone, Debug)]
pub struct WorkingRef<T> {
    /// Samples to predict from: the rescaled copy if there is one, the reference otherwise.
    pub handle: T,
    /// The reference as stored in the DPB.
    pub unscaled: DpbEntry<T>,
    pub scaling_ratio: ScalingRatio,
    /// Whether `handle` is a rescaled copy.
    pub rescaled: bool,
    /// Geometry of the samples behind `handle`.
    pub geometry: PictureGeometry,
}

#[derive(Clone, Debug)]
pub struct WorkingRefLists<T> {
    lists: [Vec<WorkingRef<T>>; 2],
}

impl<T> Default for WorkingRefLists<T> {
    fn default() -> Self {
        Self {
            lists: [vec![], vec![]],
        }
    }
}

impl<T> WorkingRefLists<T> {
    pub fn list(&self, list: RefList) -> &[WorkingRef<T>] {
        &self.lists[list as usize]
    }

    pub fn get(&self, list: RefList, ref_idx: usize) -> Option<&WorkingRef<T>> {
        self.list(list).get(ref_idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkingRef<T>> {
        self.lists.iter().flatten()
    }
}

/// Whether any reference of `lists` has a size other than `cur_geometry`'s.
pub fn needs_rpr<T>(lists: &ReferencePicLists<T>, cur_geometry: &PictureGeometry) -> bool {
    lists
        .iter()
        .any(|e| e.pic.0.borrow().geometry.size != cur_geometry.size)
}

/// Builds the lists prediction reads from for `slice`.
///
/// Unless `whole_picture` is set, references keep their own samples and only the scaling ratio is
/// recorded. Otherwise references with a different geometry are rescaled into working pictures
/// of `cur_geometry`, once per POC and layer. `pool` is emptied first.
pub fn scale_ref_pic_lists<R: Rescaler>(
    slice: &Slice,
    cur_geometry: &PictureGeometry,
    lists: &ReferencePicLists<R::Handle>,
    pool: &mut ScaledRefPicPool<R::Handle>,
    rescaler: &mut R,
    whole_picture: bool,
) -> Result<WorkingRefLists<R::Handle>, ResampleError> {
    let mut working = WorkingRefLists::default();

    if slice.slice_type.is_i() {
        return Ok(working);
    }

    pool.clear();
    let mut has_same_resolution_ref = false;

    for list in RefList::ALL {
        for entry in lists.list(list) {
            let (poc, layer_id, ref_geometry) = {
                let pic = entry.pic.0.borrow();
                (pic.pic_order_cnt_val, pic.layer_id, pic.geometry)
            };

            let scaling_ratio = ScalingRatio::new(&ref_geometry, cur_geometry);
            if ref_geometry == *cur_geometry {
                has_same_resolution_ref = true;
            }

            let working_ref = if scaling_ratio.is_unit() || !whole_picture {
                WorkingRef {
                    handle: entry.pic.1.clone(),
                    unscaled: entry.pic.clone(),
                    scaling_ratio,
                    rescaled: false,
                    geometry: ref_geometry,
                }
            } else {
                let handle = match pool.get(poc, layer_id) {
                    Some(handle) => handle,
                    None => {
                        let handle = rescaler.new_working_picture(cur_geometry, layer_id)?;
                        let downsampling = ref_geometry.size.width >= cur_geometry.size.width
                            && ref_geometry.size.height >= cur_geometry.size.height;

                        log::debug!(
                            "Rescaling POC {} (layer {}) by {:?}",
                            poc,
                            layer_id,
                            scaling_ratio
                        );
                        rescaler.rescale(
                            scaling_ratio,
                            &entry.pic.1,
                            &ref_geometry,
                            &handle,
                            cur_geometry,
                            downsampling,
                        )?;
                        handle.extend_border()?;

                        pool.insert(poc, layer_id, handle.clone())?;
                        handle
                    }
                };

                WorkingRef {
                    handle,
                    unscaled: entry.pic.clone(),
                    scaling_ratio,
                    rescaled: true,
                    geometry: *cur_geometry,
                }
            };

            working.lists[list as usize].push(working_ref);
        }
    }

    if !has_same_resolution_ref && slice.temporal_mvp_enabled_flag {
        return Err(ResampleError::TmvpWithoutSameResolutionRef {
            poc: slice.pic_order_cnt_val,
        });
    }

    Ok(working)
}
