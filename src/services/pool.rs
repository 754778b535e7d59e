use std::collections::HashSet;
use std::net::Ipv4Addr;

/// An IPv4 prefix in `a.b.c.d/len` form. All pool arithmetic lives here so
/// the persistence layer stays a thin read-modify-write shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    addr: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    pub fn parse(cidr: &str) -> Result<Self, String> {
        let (addr, len) = cidr
            .split_once('/')
            .ok_or_else(|| format!("invalid CIDR {:?}", cidr))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| format!("invalid CIDR {:?}", cidr))?;
        let prefix_len: u8 = len
            .parse()
            .map_err(|_| format!("invalid CIDR {:?}", cidr))?;
        if prefix_len > 32 {
            return Err(format!("prefix length {} out of range", prefix_len));
        }
        Ok(Self { addr, prefix_len })
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix_len)
        }
    }

    /// The prefix with host bits cleared.
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & self.mask())
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network()) | !self.mask())
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & self.mask() == u32::from(self.network())
    }

    /// Host at `offset` from the network address, if still inside the prefix.
    pub fn nth_host(&self, offset: u32) -> Option<Ipv4Addr> {
        let size = self.host_span();
        if offset >= size {
            return None;
        }
        Some(Ipv4Addr::from(u32::from(self.network()) + offset))
    }

    /// Number of addresses covered by the prefix, network and broadcast
    /// included.
    pub fn host_span(&self) -> u32 {
        if self.prefix_len == 0 {
            u32::MAX
        } else {
            1u32 << (32 - self.prefix_len)
        }
    }
}

impl std::fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// CIDR whose host bits carry `ip` and whose mask is the pool's prefix
/// length. This is the wire form handed out for N3/N4 host allocations.
pub fn host_cidr(ip: Ipv4Addr, pool: &Ipv4Cidr) -> String {
    format!("{}/{}", ip, pool.prefix_len())
}

/// First usable host not in `taken`, skipping the network and broadcast
/// addresses. `taken` holds plain dotted-quad strings.
pub fn first_free_host(pool: &Ipv4Cidr, taken: &HashSet<String>) -> Option<Ipv4Addr> {
    let span = pool.host_span();
    if span <= 2 {
        return None;
    }
    for offset in 1..span - 1 {
        let ip = pool.nth_host(offset)?;
        if !taken.contains(&ip.to_string()) {
            return Some(ip);
        }
    }
    None
}

/// First child prefix of `child_len` inside `parent` whose CIDR string is not
/// in `taken`.
pub fn first_free_subnet(
    parent: &Ipv4Cidr,
    child_len: u8,
    taken: &HashSet<String>,
) -> Option<Ipv4Cidr> {
    if child_len < parent.prefix_len() || child_len > 32 {
        return None;
    }
    let count = 1u64 << (child_len - parent.prefix_len());
    let step = 1u64 << (32 - child_len);
    let base = u32::from(parent.network()) as u64;
    for i in 0..count {
        let child = Ipv4Cidr {
            addr: Ipv4Addr::from((base + i * step) as u32),
            prefix_len: child_len,
        };
        if !taken.contains(&child.to_string()) {
            return Some(child);
        }
    }
    None
}
