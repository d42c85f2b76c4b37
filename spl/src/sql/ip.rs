//! IPv4 address taxonomy shared by both dialects.
//!
//! Ranges are tested in table order and the first match wins, so overlapping blocks
//! resolve to the earlier class. Anything unmatched is public.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Class of an IPv4 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpClass {
    /// 127.0.0.0/8
    Loopback,
    /// 169.254.0.0/16
    LinkLocal,
    /// 224.0.0.0/4
    Multicast,
    /// Unroutable and documentation blocks.
    Reserved,
    /// RFC 1918 and carrier-grade NAT.
    Private,
    /// Everything else.
    Public,
}

impl IpClass {
    /// Label returned by `classify_ip`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Loopback => "loopback",
            Self::LinkLocal => "link_local",
            Self::Multicast => "multicast",
            Self::Reserved => "reserved",
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

/// An inclusive address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    /// First address.
    pub start: Ipv4Addr,
    /// Last address.
    pub end: Ipv4Addr,
    /// Class of every address in the range.
    pub class: IpClass,
}

impl IpRange {
    const fn new(start: [u8; 4], end: [u8; 4], class: IpClass) -> Self {
        Self {
            start: Ipv4Addr::new(start[0], start[1], start[2], start[3]),
            end: Ipv4Addr::new(end[0], end[1], end[2], end[3]),
            class,
        }
    }

    /// Returns true if the address lies inside the range.
    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        (self.start..=self.end).contains(&addr)
    }
}

/// Priority-ordered classification table.
pub const IP_RANGES: &[IpRange] = &[
    IpRange::new([127, 0, 0, 0], [127, 255, 255, 255], IpClass::Loopback),
    IpRange::new([169, 254, 0, 0], [169, 254, 255, 255], IpClass::LinkLocal),
    IpRange::new([224, 0, 0, 0], [239, 255, 255, 255], IpClass::Multicast),
    IpRange::new([0, 0, 0, 0], [0, 255, 255, 255], IpClass::Reserved),
    IpRange::new([240, 0, 0, 0], [255, 255, 255, 255], IpClass::Reserved),
    IpRange::new([192, 0, 0, 0], [192, 0, 0, 255], IpClass::Reserved),
    IpRange::new([192, 0, 2, 0], [192, 0, 2, 255], IpClass::Reserved),
    IpRange::new([198, 51, 100, 0], [198, 51, 100, 255], IpClass::Reserved),
    IpRange::new([203, 0, 113, 0], [203, 0, 113, 255], IpClass::Reserved),
    IpRange::new([198, 18, 0, 0], [198, 19, 255, 255], IpClass::Reserved),
    IpRange::new([10, 0, 0, 0], [10, 255, 255, 255], IpClass::Private),
    IpRange::new([172, 16, 0, 0], [172, 31, 255, 255], IpClass::Private),
    IpRange::new([192, 168, 0, 0], [192, 168, 255, 255], IpClass::Private),
    IpRange::new([100, 64, 0, 0], [100, 127, 255, 255], IpClass::Private),
];

/// Classifies an address using [`IP_RANGES`].
#[must_use]
pub fn classify_ipv4(addr: Ipv4Addr) -> IpClass {
    IP_RANGES
        .iter()
        .find(|range| range.contains(addr))
        .map_or(IpClass::Public, |range| range.class)
}

/// The eval functions built on the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum IpFunction {
    Classify,
    IsPublic,
    IsPrivate,
    IsInternal,
    IsLoopback,
    IsLinkLocal,
    IsMulticast,
    IsReserved,
}

impl IpFunction {
    /// Looks up an eval function name (already lowercased).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "classify_ip" => Self::Classify,
            "is_public_ip" => Self::IsPublic,
            "is_private_ip" => Self::IsPrivate,
            "is_internal_ip" => Self::IsInternal,
            "is_loopback_ip" => Self::IsLoopback,
            "is_link_local_ip" => Self::IsLinkLocal,
            "is_multicast_ip" => Self::IsMulticast,
            "is_reserved_ip" => Self::IsReserved,
            _ => return None,
        })
    }

    /// Classes a predicate accepts. Empty for `Classify`.
    #[must_use]
    pub const fn classes(self) -> &'static [IpClass] {
        match self {
            Self::Classify => &[],
            Self::IsPublic => &[IpClass::Public],
            Self::IsPrivate => &[IpClass::Private],
            Self::IsInternal => &[IpClass::Private, IpClass::Loopback, IpClass::LinkLocal],
            Self::IsLoopback => &[IpClass::Loopback],
            Self::IsLinkLocal => &[IpClass::LinkLocal],
            Self::IsMulticast => &[IpClass::Multicast],
            Self::IsReserved => &[IpClass::Reserved],
        }
    }

    /// Evaluates the function on a concrete address.
    #[must_use]
    pub fn evaluate(self, addr: Ipv4Addr) -> IpAnswer {
        let class = classify_ipv4(addr);
        match self {
            Self::Classify => IpAnswer::Label(class.label()),
            _ => IpAnswer::Flag(self.classes().contains(&class)),
        }
    }
}

/// Compile-time answer of an IP function applied to a literal address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpAnswer {
    /// Result of `classify_ip`.
    Label(&'static str),
    /// Result of an `is_*_ip` predicate.
    Flag(bool),
}

/// Parses a CIDR block (`10.0.0.0/8`) into its first and last address.
#[must_use]
pub fn cidr_bounds(cidr: &str) -> Option<(Ipv4Addr, Ipv4Addr)> {
    let (addr, prefix) = cidr.trim().split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix: u32 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
    let start = u32::from(addr) & mask;
    Some((Ipv4Addr::from(start), Ipv4Addr::from(start | !mask)))
}
