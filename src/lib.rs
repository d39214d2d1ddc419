// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reference picture bookkeeping for H.266 decoders and encoders.
//!
//! This crate keeps track of which parameter sets are active for the picture being coded, turns
//! the signalled reference picture lists into concrete pictures of the decoded picture buffer,
//! marks pictures as used or unused for reference, validates the picture ordering rules of the
//! standard and decides when a reference needs to be resampled to the current resolution.
//!
//! Sample storage, entropy decoding and the rescaling filters themselves are left to the client,
//! which plugs them in through the [`codec::h266::picture::RefPicHandle`] and
//! [`codec::h266::resampling::Rescaler`] traits.
//!
//! [`decoder::h266::H266RefPicManager`] drives the per-picture sequence: parameter set
//! activation, reference picture list construction, conformance checks, reference marking and
//! reference resampling.

pub mod codec;
pub mod decoder;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Offsets of a rectangular window from the edges of a picture, in luma samples.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Window {
    pub left_offset: i32,
    pub right_offset: i32,
    pub top_offset: i32,
    pub bottom_offset: i32,
}

impl Window {
    /// Width left inside the window for a picture that is `width` samples wide.
    pub fn inner_width(&self, width: u32) -> i32 {
        width as i32 - self.left_offset - self.right_offset
    }

    /// Height left inside the window for a picture that is `height` samples high.
    pub fn inner_height(&self, height: u32) -> i32 {
        height as i32 - self.top_offset - self.bottom_offset
    }
}
