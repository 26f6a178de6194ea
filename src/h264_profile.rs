//! H264 profile-level-id handling.
//!
//! H264 codec matching cannot simply compare fmtp strings: different
//! profile-idc/profile-iop combinations name the same profile, and the
//! answer must carry a level both sides can handle.

use crate::rtp::Parameters;
use crate::RtcError;

/// One byte bit pattern to allow matching against specific bits.
///
/// Use `1` for bits that must be set, `0` for bits that must not be set,
/// and `x` for bits that can take any value.
#[derive(Copy, Clone)]
struct BitPattern {
    mask: u8,
    masked_value: u8,
}

impl BitPattern {
    fn matches(&self, profile_iop: u8) -> bool {
        ((profile_iop ^ self.masked_value) & self.mask) == 0x0
    }

    const fn new(pattern: [u8; 8]) -> Self {
        const fn bit_to_mask_bit(pattern: [u8; 8], i: usize) -> u8 {
            let bit = pattern[7 - i];
            match bit {
                b'1' | b'0' => 0x1 << i,
                b'x' => 0x0,
                _ => panic!("Invalid bit pattern, only ASCII 1, 0, and x are allowed"),
            }
        }

        const fn bit_to_mask_value_bit(pattern: [u8; 8], i: usize) -> u8 {
            let bit = pattern[7 - i];
            match bit {
                b'1' => 0x1 << i,
                b'x' | b'0' => 0x0,
                _ => panic!("Invalid bit pattern, only ASCII 1, 0, and x are allowed"),
            }
        }

        let mut mask = 0;
        let mut masked_value = 0;
        let mut i = 0;
        while i < 8 {
            mask |= bit_to_mask_bit(pattern, i);
            masked_value |= bit_to_mask_value_bit(pattern, i);
            i += 1;
        }

        Self { mask, masked_value }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct H264ProfileLevel {
    profile: H264Profile,
    level_idc: H264LevelIdc,
}

impl H264ProfileLevel {
    // The default should really be Baseline and Level1 according to
    // https://tools.ietf.org/html/rfc6184#section-8.1. However, libWebRTC
    // specifies Level3_1 to not break backwards compatibility and we copy
    // them.
    const FALLBACK: Self = Self {
        profile: H264Profile::Baseline,
        level_idc: H264LevelIdc::Level3_1,
    };

    /// Different combinations of profile-iop and profile-idc match to the same profile.
    /// See table 5 in https://www.rfc-editor.org/rfc/rfc6184#section-8.1
    ///
    /// The first value in each tuple is the profile that is matched if the profile-idc and the
    /// BitPattern matches a given fmtp line.
    const PROFILES: &'static [(H264Profile, H264ProfileIdc, BitPattern)] = &[
        // Constrained Baseline
        (
            H264Profile::ConstrainedBaseline,
            H264ProfileIdc::X42,
            BitPattern::new(*b"x1xx0000"),
        ),
        (
            H264Profile::ConstrainedBaseline,
            H264ProfileIdc::X4D,
            BitPattern::new(*b"1xxx0000"),
        ),
        (
            H264Profile::ConstrainedBaseline,
            H264ProfileIdc::X58,
            BitPattern::new(*b"11xx0000"),
        ),
        // Baseline
        (
            H264Profile::Baseline,
            H264ProfileIdc::X42,
            BitPattern::new(*b"x0xx0000"),
        ),
        (
            H264Profile::Baseline,
            H264ProfileIdc::X58,
            BitPattern::new(*b"10xx0000"),
        ),
        // Main
        (
            H264Profile::Main,
            H264ProfileIdc::X4D,
            BitPattern::new(*b"0x0x0000"),
        ),
        // Extended
        (
            H264Profile::Extended,
            H264ProfileIdc::X58,
            BitPattern::new(*b"00xx0000"),
        ),
        // High (no constraints)
        (
            H264Profile::High,
            H264ProfileIdc::X64,
            BitPattern::new(*b"00000000"),
        ),
        (
            H264Profile::High10,
            H264ProfileIdc::X6E,
            BitPattern::new(*b"00000000"),
        ),
        (
            H264Profile::High422,
            H264ProfileIdc::X7A,
            BitPattern::new(*b"00000000"),
        ),
        (
            H264Profile::High444Predictive,
            H264ProfileIdc::XF4,
            BitPattern::new(*b"00000000"),
        ),
        // Intra profiles
        (
            H264Profile::High10Intra,
            H264ProfileIdc::X6E,
            BitPattern::new(*b"00010000"),
        ),
        (
            H264Profile::High422Intra,
            H264ProfileIdc::X7A,
            BitPattern::new(*b"00010000"),
        ),
        (
            H264Profile::High444Intra,
            H264ProfileIdc::XF4,
            BitPattern::new(*b"00010000"),
        ),
        (
            H264Profile::CAVLC444Intra,
            H264ProfileIdc::X2C,
            BitPattern::new(*b"00010000"),
        ),
    ];

    /// Construct a new H264ProfileLevel.
    ///
    /// Returns `Some(Self)` only if the provided parameters identify a valid profile.
    fn new(profile_idc: H264ProfileIdc, profile_iop: u8, level_idc: H264LevelIdc) -> Option<Self> {
        Self::PROFILES
            .iter()
            .find_map(|&(profile, expected_pidc, iop_pattern)| {
                if expected_pidc != profile_idc {
                    return None;
                }
                if !iop_pattern.matches(profile_iop) {
                    return None;
                }

                Some(Self { profile, level_idc })
            })
    }

    /// The hex string for the answer, using the canonical (idc, iop)
    /// encoding of this profile. Only the profiles libWebRTC emits can be
    /// encoded.
    fn to_hex_string(self) -> Option<String> {
        use H264LevelIdc::Level1B;
        use H264Profile::*;

        // Level 1b needs the constraint_set3_flag set and level_idc 11.
        if self.level_idc == Level1B {
            return match self.profile {
                ConstrainedBaseline => Some("42f00b".into()),
                Baseline => Some("42100b".into()),
                Main => Some("4d100b".into()),
                _ => None,
            };
        }

        let prefix = match self.profile {
            ConstrainedBaseline => "42e0",
            Baseline => "4200",
            Main => "4d00",
            Extended => "5800",
            High => "6400",
            _ => return None,
        };

        Some(format!("{}{:02x}", prefix, self.level_idc as u8))
    }
}

impl TryFrom<u32> for H264ProfileLevel {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        const CONSTRAINT_SET3_FLAG: u8 = 0x10;

        let bytes = value.to_be_bytes();

        let profile_idc = bytes[1].try_into()?;
        let profile_iop = bytes[2];
        let mut profile_level = bytes[3].try_into()?;

        // When profile_idc is equal to 66, 77, or 88 (the Baseline, Main, or
        // Extended profile), level_idc is equal to 11, and bit 4
        // (constraint_set3_flag) of the profile-iop byte is equal to 1,
        // the level is Level 1b.
        if [
            H264ProfileIdc::X42,
            H264ProfileIdc::X4D,
            H264ProfileIdc::X58,
        ]
        .contains(&profile_idc)
            && profile_level == H264LevelIdc::Level1_1
            && (profile_iop & CONSTRAINT_SET3_FLAG) != 0
        {
            profile_level = H264LevelIdc::Level1B;
        }

        Self::new(profile_idc, profile_iop, profile_level).ok_or(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum H264Profile {
    Baseline,
    ConstrainedBaseline,
    Main,
    Extended,
    High,
    High10,
    High422,
    High444Predictive,
    High10Intra,
    High422Intra,
    High444Intra,
    CAVLC444Intra,
}

/// The various h264 profile_idc, not all of these have a name,
/// but they are a constrained portion of `u8`, hence an
/// enum to prevent using unspecified values.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
enum H264ProfileIdc {
    X2C = 44_u8,
    X42 = 66_u8, // B
    X4D = 77_u8, // M
    X58 = 88_u8, // E
    X64 = 100_u8,
    X6E = 110_u8,
    X7A = 122_u8,
    XF4 = 244_u8,
}

impl TryFrom<u8> for H264ProfileIdc {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            x if (Self::X2C as u8) == x => Ok(Self::X2C),
            x if (Self::X42 as u8) == x => Ok(Self::X42),
            x if (Self::X4D as u8) == x => Ok(Self::X4D),
            x if (Self::X58 as u8) == x => Ok(Self::X58),
            x if (Self::X64 as u8) == x => Ok(Self::X64),
            x if (Self::X6E as u8) == x => Ok(Self::X6E),
            x if (Self::X7A as u8) == x => Ok(Self::X7A),
            x if (Self::XF4 as u8) == x => Ok(Self::XF4),
            _ => Err(()),
        }
    }
}

// Per libWebRTC
//     All values are equal to ten times the level number, except level 1b
//     which is special.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[rustfmt::skip]
enum H264LevelIdc {
    Level1B  = 0_u8,
    Level1   = 10_u8,
    Level1_1 = 11_u8,
    Level1_2 = 12_u8,
    Level1_3 = 13_u8,
    Level2   = 20_u8,
    Level2_1 = 21_u8,
    Level2_2 = 22_u8,
    Level3   = 30_u8,
    Level3_1 = 31_u8,
    Level3_2 = 32_u8,
    Level4   = 40_u8,
    Level4_1 = 41_u8,
    Level4_2 = 42_u8,
    Level5   = 50_u8,
    Level5_1 = 51_u8,
    Level5_2 = 52_u8,
}

impl H264LevelIdc {
    /// Ordering key. Level 1b sits between 1 and 1.1, the idc numbering
    /// does not reflect that.
    #[rustfmt::skip]
    fn rank(self) -> u8 {
        use H264LevelIdc::*;
        match self {
            Level1   => 0,
            Level1B  => 1,
            Level1_1 => 2,
            Level1_2 => 3,
            Level1_3 => 4,
            Level2   => 5,
            Level2_1 => 6,
            Level2_2 => 7,
            Level3   => 8,
            Level3_1 => 9,
            Level3_2 => 10,
            Level4   => 11,
            Level4_1 => 12,
            Level4_2 => 13,
            Level5   => 14,
            Level5_1 => 15,
            Level5_2 => 16,
        }
    }

    fn min(self, other: Self) -> Self {
        if self.rank() <= other.rank() {
            self
        } else {
            other
        }
    }
}

impl TryFrom<u8> for H264LevelIdc {
    type Error = ();

    #[rustfmt::skip]
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use H264LevelIdc::*;

        match value {
            x if (Level1B as u8)  == x => Ok(Level1B),
            x if (Level1 as u8)   == x => Ok(Level1),
            x if (Level1_1 as u8) == x => Ok(Level1_1),
            x if (Level1_2 as u8) == x => Ok(Level1_2),
            x if (Level1_3 as u8) == x => Ok(Level1_3),
            x if (Level2 as u8)   == x => Ok(Level2),
            x if (Level2_1 as u8) == x => Ok(Level2_1),
            x if (Level2_2 as u8) == x => Ok(Level2_2),
            x if (Level3 as u8)   == x => Ok(Level3),
            x if (Level3_1 as u8) == x => Ok(Level3_1),
            x if (Level3_2 as u8) == x => Ok(Level3_2),
            x if (Level4 as u8)   == x => Ok(Level4),
            x if (Level4_1 as u8) == x => Ok(Level4_1),
            x if (Level4_2 as u8) == x => Ok(Level4_2),
            x if (Level5 as u8)   == x => Ok(Level5),
            x if (Level5_1 as u8) == x => Ok(Level5_1),
            x if (Level5_2 as u8) == x => Ok(Level5_2),
            _ => Err(()),
        }
    }
}

/// Parse the 6 hex char profile-level-id form, e.g. "42e01f".
fn parse_profile_level_id(s: &str) -> Option<H264ProfileLevel> {
    if s.len() != 6 {
        return None;
    }
    let value = u32::from_str_radix(s, 16).ok()?;
    value.try_into().ok()
}

/// The profile-level-id in a set of fmtp parameters, or the libWebRTC
/// fallback when the parameter is absent. `None` when present but invalid.
fn profile_level_for(params: &Parameters) -> Option<H264ProfileLevel> {
    match params.get("profile-level-id") {
        Some(v) => parse_profile_level_id(&v.to_string()),
        None => Some(H264ProfileLevel::FALLBACK),
    }
}

fn level_asymmetry_allowed(params: &Parameters) -> bool {
    params
        .get("level-asymmetry-allowed")
        .and_then(|v| v.as_i64())
        == Some(1)
}

/// Whether two fmtp parameter sets name the same H264 profile (level is
/// not considered).
pub(crate) fn is_same_profile(a: &Parameters, b: &Parameters) -> bool {
    match (profile_level_for(a), profile_level_for(b)) {
        (Some(a), Some(b)) => a.profile == b.profile,
        _ => false,
    }
}

/// Generate the profile-level-id an answer must carry given the local and
/// remote offered parameters.
///
/// Returns `Ok(None)` when neither side sent a profile-level-id (the answer
/// must not carry one either). Errors when either id is invalid or the
/// profiles differ.
pub(crate) fn generate_profile_level_id_for_answer(
    local: &Parameters,
    remote: &Parameters,
) -> Result<Option<String>, RtcError> {
    if !local.contains_key("profile-level-id") && !remote.contains_key("profile-level-id") {
        return Ok(None);
    }

    let local_pl = profile_level_for(local)
        .ok_or_else(|| RtcError::Unsupported("invalid local profile-level-id".into()))?;
    let remote_pl = profile_level_for(remote)
        .ok_or_else(|| RtcError::Unsupported("invalid remote profile-level-id".into()))?;

    if local_pl.profile != remote_pl.profile {
        return Err(RtcError::Unsupported(
            "H264 profile mismatch in answer generation".into(),
        ));
    }

    // With level asymmetry each side uses its own level, so the answer
    // carries the local one. Otherwise both must agree on the minimum.
    let asymmetry = level_asymmetry_allowed(local) && level_asymmetry_allowed(remote);
    let answer_level = if asymmetry {
        local_pl.level_idc
    } else {
        local_pl.level_idc.min(remote_pl.level_idc)
    };

    let answer = H264ProfileLevel {
        profile: local_pl.profile,
        level_idc: answer_level,
    };

    answer
        .to_hex_string()
        .map(Some)
        .ok_or_else(|| RtcError::Unsupported("unrepresentable H264 answer profile".into()))
}
