//! CIDR 프리픽스 -- 주소와 프리픽스 길이로 범위 포함 여부를 판단합니다.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// `10.0.0.0/8`, `2001:db8::/32` 형식의 네트워크 프리픽스
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNet {
    addr: IpAddr,
    prefix: u8,
}

impl IpNet {
    /// 주소와 프리픽스 길이로 생성합니다. 호스트 비트는 0으로 정규화됩니다.
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, String> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(format!("prefix length {prefix} exceeds {max}"));
        }
        let addr = match addr {
            IpAddr::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4) & v4_mask(prefix))),
            IpAddr::V6(v6) => IpAddr::V6(Ipv6Addr::from(u128::from(v6) & v6_mask(prefix))),
        };
        Ok(Self { addr, prefix })
    }

    /// 네트워크 주소
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// 프리픽스 길이
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// 주소가 이 범위에 포함되는지 확인합니다.
    ///
    /// IPv4-mapped IPv6 주소는 IPv4로 간주합니다. 주소 체계가 다르면 false입니다.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                u32::from(ip) & v4_mask(self.prefix) == u32::from(net)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                u128::from(ip) & v6_mask(self.prefix) == u128::from(net)
            }
            _ => false,
        }
    }
}

impl FromStr for IpNet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("'{s}' is missing a prefix length"))?;
        let addr = addr
            .parse::<IpAddr>()
            .map_err(|e| format!("'{s}': {e}"))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|e| format!("'{s}': invalid prefix length: {e}"))?;
        Self::new(addr, prefix).map_err(|e| format!("'{s}': {e}"))
    }
}

impl fmt::Display for IpNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

fn v4_mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn v6_mask(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}
