// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! NAL unit and slice type codes.

use enumn::N;

/// Table 5 – NAL unit type codes and NAL unit type classes
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NaluType {
    #[default]
    TrailNut = 0,
    StsaNut = 1,
    RadlNut = 2,
    RaslNut = 3,
    RsvVcl4 = 4,
    RsvVcl5 = 5,
    RsvVcl6 = 6,
    IdrWRadl = 7,
    IdrNLp = 8,
    CraNut = 9,
    GdrNut = 10,
    RsvIrap11 = 11,
    OpiNut = 12,
    DciNut = 13,
    VpsNut = 14,
    SpsNut = 15,
    PpsNut = 16,
    PrefixApsNut = 17,
    SuffixApsNut = 18,
    PhNut = 19,
    AudNut = 20,
    EosNut = 21,
    EobNut = 22,
    PrefixSeiNut = 23,
    SuffixSeiNut = 24,
    FdNut = 25,
    RsvNvcl26 = 26,
    RsvNvcl27 = 27,
    UnspecNvcl28 = 28,
    UnspecNvcl29 = 29,
    UnspecNvcl30 = 30,
    UnspecNvcl31 = 31,
}

impl NaluType {
    /// Whether this is an IDR NALU.
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }

    /// Whether this is an IRAP NALU.
    pub fn is_irap(&self) -> bool {
        let type_ = *self as u32;
        type_ >= Self::IdrWRadl as u32 && type_ <= Self::RsvIrap11 as u32 && !self.is_gdr()
    }

    /// Whether this is a CRA NALU.
    pub fn is_cra(&self) -> bool {
        matches!(self, Self::CraNut)
    }

    /// Whether this is a GDR NALU.
    pub fn is_gdr(&self) -> bool {
        matches!(self, Self::GdrNut)
    }

    /// Whether this is a RADL NALU.
    pub fn is_radl(&self) -> bool {
        matches!(self, Self::RadlNut)
    }

    /// Whether this is a RASL NALU.
    pub fn is_rasl(&self) -> bool {
        matches!(self, Self::RaslNut)
    }

    /// Whether this is a RADL or a RASL NALU.
    pub fn is_leading(&self) -> bool {
        self.is_radl() || self.is_rasl()
    }

    /// Whether this is a STSA NALU.
    pub fn is_stsa(&self) -> bool {
        matches!(self, Self::StsaNut)
    }

    /// Whether this NALU carries coded slice data.
    pub fn is_vcl(&self) -> bool {
        (*self as u32) <= Self::RsvIrap11 as u32
    }
}

/// Table 9 – Name association to sh_slice_type
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SliceType {
    B = 0,
    P = 1,
    #[default]
    I = 2,
}

impl SliceType {
    /// Whether this is a P slice.
    pub fn is_p(&self) -> bool {
        matches!(self, SliceType::P)
    }

    /// Whether this is a B slice.
    pub fn is_b(&self) -> bool {
        matches!(self, SliceType::B)
    }

    /// Whether this is an I slice.
    pub fn is_i(&self) -> bool {
        matches!(self, SliceType::I)
    }
}

#[cfg(test)]
mod tests {
    use super::NaluType;
    use super::SliceType;

    #[test]
    fn nalu_type_classes() {
        assert_eq!(NaluType::n(7u32), Some(NaluType::IdrWRadl));
        assert_eq!(NaluType::n(9u32), Some(NaluType::CraNut));
        assert_eq!(NaluType::n(32u32), None);

        assert!(NaluType::IdrNLp.is_idr());
        assert!(NaluType::IdrNLp.is_irap());
        assert!(NaluType::CraNut.is_irap());
        assert!(NaluType::RsvIrap11.is_irap());
        assert!(!NaluType::GdrNut.is_irap());
        assert!(!NaluType::TrailNut.is_irap());

        assert!(NaluType::RaslNut.is_leading());
        assert!(NaluType::RadlNut.is_leading());
        assert!(!NaluType::StsaNut.is_leading());

        assert!(NaluType::GdrNut.is_vcl());
        assert!(!NaluType::SpsNut.is_vcl());
    }

    #[test]
    fn slice_type_codes() {
        assert_eq!(SliceType::n(0u32), Some(SliceType::B));
        assert_eq!(SliceType::n(1u32), Some(SliceType::P));
        assert_eq!(SliceType::n(2u32), Some(SliceType::I));
        assert_eq!(SliceType::n(3u32), None);
    }
}
