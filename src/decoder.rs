// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

pub mod h266;

use thiserror::Error;

use crate::codec::h266::conformance::ConformancePolicy;
use crate::codec::h266::conformance::PictureLoss;
use crate::codec::h266::conformance::Violation;
use crate::codec::h266::dpb::StorePictureError;
use crate::codec::h266::dpb::MAX_DPB_SIZE;
use crate::codec::h266::ps_manager::ActivationError;
use crate::codec::h266::ps_manager::StoreError;
use crate::codec::h266::resampling::ResampleError;
use crate::codec::h266::resolver::ResolveError;
use crate::codec::h266::rpl::RplError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Activation(#[from] ActivationError),
    #[error(transparent)]
    Rpl(#[from] RplError),
    #[error(transparent)]
    PictureLoss(#[from] PictureLoss),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    StorePicture(#[from] StorePictureError),
    #[error(transparent)]
    Conformance(#[from] Violation),
    #[error(transparent)]
    Resample(#[from] ResampleError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Behaviour of the reference picture management, chosen at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// What happens when the bitstream breaks a conformance rule.
    pub conformance_policy: ConformancePolicy,
    /// Check that reference pictures do not precede the associated IRAP picture.
    pub rpl_restriction_checks: bool,
    /// DRAP pictures are signalled in the bitstream.
    pub drap_checks: bool,
    /// Defer the refresh of an IDR picture to its second field.
    pub efficient_field_irap: bool,
    /// Allow a PPS to switch SPS at a picture that is not IRAP.
    pub multi_sps: bool,
    /// Rescale references of a different resolution into working pictures, instead of leaving
    /// the scaling to motion compensation.
    pub whole_picture_resampling: bool,
    /// Capacity of the DPB.
    pub max_dpb_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            conformance_policy: Default::default(),
            rpl_restriction_checks: true,
            drap_checks: false,
            efficient_field_irap: false,
            multi_sps: true,
            whole_picture_resampling: false,
            max_dpb_size: MAX_DPB_SIZE,
        }
    }
}
