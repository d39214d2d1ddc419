// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

pub mod conformance;
pub mod dpb;
#[cfg(test)]
pub(crate) mod dummy;
pub mod nalu;
pub mod parameter_sets;
pub mod picture;
pub mod ps_manager;
pub mod resampling;
pub mod resolver;
pub mod rpl;
pub mod slice;
