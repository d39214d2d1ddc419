// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Bitstream conformance checks on picture ordering and reference availability.
//!
//! The checks never fail by themselves: they report the [`Violation`]s they find and a
//! [`ConformancePolicy`] decides whether decoding goes on.

use thiserror::Error;

use crate::codec::h266::dpb::matches_long_term;
use crate::codec::h266::dpb::Dpb;
use crate::codec::h266::nalu::NaluType;
use crate::codec::h266::parameter_sets::Sps;
use crate::codec::h266::resolver::ReferencePicLists;
use crate::codec::h266::rpl::long_term_poc;
use crate::codec::h266::rpl::RefList;
use crate::codec::h266::rpl::RplEntry;
use crate::codec::h266::slice::Slice;

/// A reference picture listed by the current picture that is not in the DPB.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("reference picture {poc} of picture {cur_poc} is missing (entry {ref_idx}, long-term: {long_term})")]
pub struct PictureLoss {
    /// POC of the current picture.
    pub cur_poc: i32,
    /// POC of the missing picture. For long-term entries checked before resolution this is the
    /// identifier signalled in the list.
    pub poc: i32,
    /// Index of the offending entry in its list.
    pub ref_idx: usize,
    pub long_term: bool,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("leading picture {poc} has type {nalu_type:?} instead of RASL or RADL")]
    LeadingPictureType { poc: i32, nalu_type: NaluType },
    #[error("trailing picture {poc} has leading type {nalu_type:?}")]
    TrailingPictureType { poc: i32, nalu_type: NaluType },
    #[error("RASL picture {poc} is associated with an IDR picture")]
    RaslAssociatedWithIdr { poc: i32 },
    #[error("RADL picture {poc} is associated with an IDR_N_LP picture")]
    RadlAssociatedWithIdrNoLeading { poc: i32 },
    #[error("picture {other_poc} precedes IRAP picture {poc} in decoding order but not in output order")]
    OutputAfterIrap { poc: i32, other_poc: i32 },
    #[error("picture {other_poc} precedes the IRAP of RADL picture {poc} but follows it in output order")]
    OutputAfterRadl { poc: i32, other_poc: i32 },
    #[error("leading picture {poc} follows trailing picture {other_poc} of the same IRAP")]
    LeadingAfterTrailing { poc: i32, other_poc: i32 },
    #[error("RASL picture {poc} follows RADL picture {other_poc} of the same CRA in output order")]
    RaslAfterRadl { poc: i32, other_poc: i32 },
    #[error("RASL picture {poc} precedes earlier IRAP picture {other_poc} in output order")]
    RaslBeforePrecedingIrap { poc: i32, other_poc: i32 },
    #[error("CRA picture {poc} refers to picture {ref_poc} which precedes the previous IRAP")]
    CraRefPrecedesIrap { poc: i32, ref_poc: i32 },
    #[error("trailing picture {poc} refers to picture {ref_poc} which precedes its IRAP (active: {active})")]
    TrailingRefPrecedesIrap { poc: i32, ref_poc: i32, active: bool },
    #[error("RADL picture {poc} refers to picture {ref_poc} which precedes its IRAP in decoding order")]
    RadlRefPrecedesIrap { poc: i32, ref_poc: i32 },
    #[error("STSA picture {poc} refers to picture {ref_poc} of its own sub-layer {temporal_id}")]
    StsaSameSubLayerRef { poc: i32, ref_poc: i32, temporal_id: u8 },
    #[error("picture {poc} refers to picture {ref_poc} which precedes an STSA picture of its sub-layer")]
    RefBeforeStsa { poc: i32, ref_poc: i32 },
    #[error("picture {poc} (sub-layer {temporal_id}) refers to picture {ref_poc} of higher sub-layer {ref_temporal_id}")]
    HigherSubLayerRef {
        poc: i32,
        temporal_id: u8,
        ref_poc: i32,
        ref_temporal_id: u8,
    },
    #[error("DRAP picture {poc} is not a trailing picture")]
    DrapNotTrailing { poc: i32 },
    #[error("DRAP picture {poc} has temporal id {temporal_id}")]
    DrapTemporalId { poc: i32, temporal_id: u8 },
    #[error("DRAP picture {poc} refers to picture {ref_poc} which is not its IRAP")]
    DrapRefNotIrap { poc: i32, ref_poc: i32 },
    #[error("picture {poc} refers to picture {ref_poc} which precedes DRAP picture {drap_poc}")]
    RefBeforeDrap { poc: i32, ref_poc: i32, drap_poc: i32 },
}

/// What to do with conformance violations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConformancePolicy {
    /// The first violation aborts the processing of the picture.
    Strict,
    /// Violations are logged and processing continues.
    Lenient,
}

impl Default for ConformancePolicy {
    fn default() -> Self {
        if cfg!(feature = "strict-conformance") {
            Self::Strict
        } else {
            Self::Lenient
        }
    }
}

impl ConformancePolicy {
    /// Reports `violations` and returns the first one under the strict policy.
    pub fn enforce<I>(&self, violations: I) -> Result<(), Violation>
    where
        I: IntoIterator<Item = Violation>,
    {
        let mut first = None;

        for violation in violations {
            match self {
                Self::Lenient => log::warn!("Non-conforming bitstream: {}", violation),
                Self::Strict => {
                    log::error!("Non-conforming bitstream: {}", violation);
                    first.get_or_insert(violation);
                }
            }
        }

        match first {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }
}

/// Checks the rules about leading and trailing pictures for the picture `slice` belongs to.
///
/// The rules on the NAL unit type are skipped when `mixed_nalu_types_in_pic` is set. The rules
/// relating the current picture to earlier ones are checked against the reconstructed pictures
/// of its layer in `dpb`.
pub fn check_leading_picture_restrictions<T: Clone>(
    slice: &Slice,
    dpb: &Dpb<T>,
    mixed_nalu_types_in_pic: bool,
) -> Vec<Violation> {
    let mut violations = vec![];
    let poc = slice.pic_order_cnt_val;
    let nalu_type = slice.nalu_type;
    let irap_poc = slice.associated_irap_poc;
    let irap_type = slice.associated_irap_type;

    if !mixed_nalu_types_in_pic {
        // IRAP pictures may have a POC lower than the one of their associated IRAP.
        let is_idr_or_cra = nalu_type.is_idr() || nalu_type.is_cra();
        if irap_poc > poc && !is_idr_or_cra && !nalu_type.is_leading() {
            violations.push(Violation::LeadingPictureType { poc, nalu_type });
        }

        if irap_poc < poc && nalu_type.is_leading() {
            violations.push(Violation::TrailingPictureType { poc, nalu_type });
        }
    }

    if nalu_type.is_rasl() && irap_type.is_idr() {
        violations.push(Violation::RaslAssociatedWithIdr { poc });
    }

    if nalu_type.is_radl() && irap_type == NaluType::IdrNLp {
        violations.push(Violation::RadlAssociatedWithIdrNoLeading { poc });
    }

    let mut num_leading_found = 0;
    for pic in dpb.pictures() {
        if !pic.reconstructed || pic.pic_order_cnt_val == poc || pic.layer_id != slice.layer_id {
            continue;
        }

        let other_poc = pic.pic_order_cnt_val;

        if pic.pic_output_flag
            && !slice.no_output_of_prior_pics_flag
            && (nalu_type.is_idr() || nalu_type.is_cra())
            && other_poc >= poc
        {
            violations.push(Violation::OutputAfterIrap { poc, other_poc });
        }

        // `pic` precedes the IRAP in decoding order and is not the IRAP itself.
        if pic.pic_output_flag
            && nalu_type.is_radl()
            && irap_poc > pic.associated_irap_poc
            && irap_poc != other_poc
            && other_poc >= poc
        {
            violations.push(Violation::OutputAfterRadl { poc, other_poc });
        }

        if nalu_type.is_leading()
            && !pic.nalu_type.is_leading()
            && pic.associated_irap_poc == irap_poc
        {
            num_leading_found += 1;
            // Field coding tolerates the second field of the IRAP.
            let limit = usize::from(pic.field_seq_flag);
            if other_poc > irap_poc && num_leading_found > limit {
                violations.push(Violation::LeadingAfterTrailing { poc, other_poc });
            }
        }

        if nalu_type.is_rasl() && irap_type.is_cra() {
            if pic.associated_irap_poc == irap_poc && pic.nalu_type.is_radl() && other_poc <= poc {
                violations.push(Violation::RaslAfterRadl { poc, other_poc });
            }

            if other_poc < irap_poc
                && (pic.nalu_type.is_idr() || pic.nalu_type.is_cra())
                && poc <= other_poc
            {
                violations.push(Violation::RaslBeforePrecedingIrap { poc, other_poc });
            }
        }
    }

    violations
}

/// Checks that no entry of the lists of `slice` refers to a picture preceding the associated
/// IRAP picture, with the exceptions allowed for each picture type.
///
/// `decoding_order_number` is the one of the current picture. Entries whose picture is not in
/// the DPB are left to the availability checks.
pub fn check_rpl_restrictions<T: Clone>(
    slice: &Slice,
    sps: &Sps,
    decoding_order_number: u32,
    dpb: &Dpb<T>,
) -> Vec<Violation> {
    let mut violations = vec![];
    let poc = slice.pic_order_cnt_val;
    let irap_poc = slice.associated_irap_poc;
    let irap_don = slice.associated_irap_decoding_order_number;
    let bits_for_poc = sps.bits_for_poc();

    let is_trailing = decoding_order_number > irap_don
        && !matches!(
            slice.nalu_type,
            NaluType::StsaNut
                | NaluType::IdrWRadl
                | NaluType::IdrNLp
                | NaluType::CraNut
                | NaluType::RadlNut
                | NaluType::RaslNut
        );

    for list in RefList::ALL {
        let num_active = slice.num_ref_idx(list);

        for (i, entry) in slice.ref_pic_list(list).entries().iter().enumerate() {
            let pic = match *entry {
                RplEntry::ShortTerm { delta_poc } => {
                    dpb.find_ref_pic(poc - delta_poc, slice.layer_id)
                }
                RplEntry::LongTerm {
                    poc_lsb_lt,
                    delta_poc_msb_cycle_lt,
                } => dpb.find_long_term_ref_pic(
                    long_term_poc(poc_lsb_lt, delta_poc_msb_cycle_lt, poc, bits_for_poc),
                    delta_poc_msb_cycle_lt.is_some(),
                    poc,
                    slice.layer_id,
                    bits_for_poc,
                ),
                RplEntry::InterLayer { .. } => continue,
            };

            let Some(pic) = pic else {
                continue;
            };
            let (ref_poc, ref_don) = {
                let pic = pic.0.borrow();
                (pic.pic_order_cnt_val, pic.decoding_order_number)
            };
            let precedes_irap = ref_poc < irap_poc || ref_don < irap_don;
            let active = i < num_active;

            if slice.nalu_type.is_cra() && precedes_irap {
                violations.push(Violation::CraRefPrecedesIrap { poc, ref_poc });
            }

            // Outside of field coding all the leading pictures of an IRAP precede its trailing
            // pictures, so inactive entries are constrained too.
            if is_trailing && precedes_irap && (active || !sps.field_seq_flag) {
                violations.push(Violation::TrailingRefPrecedesIrap {
                    poc,
                    ref_poc,
                    active,
                });
            }

            if active && slice.nalu_type.is_radl() && ref_don < irap_don {
                violations.push(Violation::RadlRefPrecedesIrap { poc, ref_poc });
            }
        }
    }

    violations
}

/// Checks that every entry of `list` has a picture in the DPB.
pub fn check_all_ref_pics_available<T: Clone>(
    slice: &Slice,
    list: RefList,
    dpb: &Dpb<T>,
) -> Result<(), PictureLoss> {
    let entries = slice.ref_pic_list(list).entries();
    check_ref_pics_available(slice, entries, dpb)
}

/// Checks that the first `num_active` entries of `list` have a picture in the DPB.
pub fn check_active_ref_pics_available<T: Clone>(
    slice: &Slice,
    list: RefList,
    num_active: usize,
    dpb: &Dpb<T>,
) -> Result<(), PictureLoss> {
    let entries = slice.ref_pic_list(list).entries();
    check_ref_pics_available(slice, &entries[..num_active.min(entries.len())], dpb)
}

fn check_ref_pics_available<T: Clone>(
    slice: &Slice,
    entries: &[RplEntry],
    dpb: &Dpb<T>,
) -> Result<(), PictureLoss> {
    // The DPB is about to be emptied anyway.
    if slice.nalu_type.is_idr() {
        return Ok(());
    }

    let cur_poc = slice.pic_order_cnt_val;

    // Long-term entries first. A short-term picture can still become their target.
    for (ref_idx, entry) in entries.iter().enumerate() {
        let RplEntry::LongTerm {
            poc_lsb_lt,
            delta_poc_msb_cycle_lt,
        } = *entry
        else {
            continue;
        };

        let available = dpb.pictures().any(|pic| {
            pic.is_ref()
                && pic.layer_id == slice.layer_id
                && pic.pic_order_cnt_val != cur_poc
                && matches_long_term(&pic, poc_lsb_lt, delta_poc_msb_cycle_lt, cur_poc)
        });

        if !available {
            let loss = PictureLoss {
                cur_poc,
                poc: poc_lsb_lt as i32,
                ref_idx,
                long_term: true,
            };
            log::warn!("{}", loss);
            return Err(loss);
        }
    }

    for (ref_idx, entry) in entries.iter().enumerate() {
        let RplEntry::ShortTerm { delta_poc } = *entry else {
            continue;
        };

        let poc = cur_poc - delta_poc;
        let available = dpb.pictures().any(|pic| {
            pic.is_ref()
                && !pic.is_long_term()
                && pic.layer_id == slice.layer_id
                && pic.pic_order_cnt_val == poc
        });

        if !available {
            let loss = PictureLoss {
                cur_poc,
                poc,
                ref_idx,
                long_term: false,
            };
            log::warn!("{}", loss);
            return Err(loss);
        }
    }

    Ok(())
}

/// Checks the STSA rules on the resolved lists of `slice`.
pub fn check_stsa<T>(slice: &Slice, lists: &ReferencePicLists<T>) -> Vec<Violation> {
    let poc = slice.pic_order_cnt_val;

    lists
        .iter()
        .filter_map(|entry| {
            let pic = entry.pic.0.borrow();
            let ref_poc = pic.pic_order_cnt_val;
            let same_sub_layer = pic.temporal_id == slice.temporal_id;

            if slice.nalu_type.is_stsa() && pic.layer_id == slice.layer_id && same_sub_layer {
                Some(Violation::StsaSameSubLayerRef {
                    poc,
                    ref_poc,
                    temporal_id: slice.temporal_id,
                })
            } else if pic.sub_layer_non_ref_due_to_stsa && same_sub_layer {
                Some(Violation::RefBeforeStsa { poc, ref_poc })
            } else {
                None
            }
        })
        .collect()
}

/// Whether no picture of the DPB used for reference is at the sub-layer of `slice` or above.
pub fn is_temporal_layer_switching_point<T: Clone>(slice: &Slice, dpb: &Dpb<T>) -> bool {
    dpb.pictures().all(|pic| {
        !pic.is_ref()
            || pic.pic_order_cnt_val == slice.pic_order_cnt_val
            || pic.temporal_id < slice.temporal_id
    })
}

/// Whether the picture of `slice` could be coded as an STSA picture.
///
/// Only references at the sub-layer of `slice` or above matter here too, so this is the same
/// test as [`is_temporal_layer_switching_point`].
pub fn is_stepwise_temporal_layer_switching_point_candidate<T: Clone>(
    slice: &Slice,
    dpb: &Dpb<T>,
) -> bool {
    is_temporal_layer_switching_point(slice, dpb)
}

/// DRAP tracking within a coded video sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrapState {
    /// Whether DRAP pictures are signalled in the bitstream.
    pub enabled: bool,
    latest_drap_poc: Option<i32>,
}

impl DrapState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            latest_drap_poc: None,
        }
    }

    /// Whether a DRAP picture was seen since the start of the coded video sequence.
    pub fn cvs_has_previous_drap(&self) -> bool {
        self.latest_drap_poc.is_some()
    }

    pub fn latest_drap_poc(&self) -> Option<i32> {
        self.latest_drap_poc
    }

    /// Records a decoded picture. IRAP pictures start a new sequence.
    pub fn update(&mut self, slice: &Slice) {
        if slice.nalu_type.is_irap() {
            self.latest_drap_poc = None;
        }

        if slice.is_drap {
            self.latest_drap_poc = Some(slice.pic_order_cnt_val);
        }
    }

    /// Whether the picture of `slice` may not refer to the picture with POC `poc`.
    ///
    /// `preceding_drap_in_decoding_order` tells whether that picture precedes the latest DRAP
    /// picture in decoding order.
    pub fn is_poc_restricted_by_drap(
        &self,
        slice: &Slice,
        poc: i32,
        preceding_drap_in_decoding_order: bool,
    ) -> bool {
        if !self.enabled {
            return false;
        }

        if slice.is_drap && poc != slice.associated_irap_poc {
            return true;
        }

        match self.latest_drap_poc {
            Some(drap_poc) => {
                slice.pic_order_cnt_val > drap_poc
                    && (preceding_drap_in_decoding_order || poc < drap_poc)
            }
            None => false,
        }
    }
}

/// Checks the DRAP rules on the resolved lists of `slice`.
pub fn check_drap<T>(
    slice: &Slice,
    state: &DrapState,
    lists: &ReferencePicLists<T>,
) -> Vec<Violation> {
    let mut violations = vec![];
    if !state.enabled {
        return violations;
    }

    let poc = slice.pic_order_cnt_val;
    let irap_poc = slice.associated_irap_poc;
    let ref_pocs = RefList::ALL
        .into_iter()
        .flat_map(|list| lists.ref_pocs(list))
        .collect::<Vec<_>>();

    if slice.is_drap {
        if !matches!(slice.nalu_type, NaluType::TrailNut | NaluType::StsaNut) {
            violations.push(Violation::DrapNotTrailing { poc });
        }

        if slice.temporal_id != 0 {
            violations.push(Violation::DrapTemporalId {
                poc,
                temporal_id: slice.temporal_id,
            });
        }

        violations.extend(
            ref_pocs
                .iter()
                .filter(|&&ref_poc| ref_poc != irap_poc)
                .map(|&ref_poc| Violation::DrapRefNotIrap { poc, ref_poc }),
        );
    }

    if let Some(drap_poc) = state.latest_drap_poc {
        if poc > drap_poc {
            violations.extend(
                ref_pocs
                    .iter()
                    .filter(|&&ref_poc| ref_poc < drap_poc && ref_poc != irap_poc)
                    .map(|&ref_poc| Violation::RefBeforeDrap {
                        poc,
                        ref_poc,
                        drap_poc,
                    }),
            );
        }
    }

    violations
}
