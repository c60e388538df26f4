//! Rule header address groups.
//!
//! An address group is `any`, a single address, a CIDR block, or a bracketed
//! list that may nest and negate: `[10.0.0.0/8, !10.1.1.1, [a, b]]`. Parsing
//! resolves negation into canonical, sorted, inclusive range pairs per
//! address family, which is also what the bidirectional symmetry check and
//! the compiled per-signature match arrays consume.

use std::net::IpAddr;

use ipnet::IpNet;

/// Canonical parsed address group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressGroup {
    /// Inclusive IPv4 ranges in host byte order, sorted and merged.
    pub v4: Vec<(u32, u32)>,
    /// Inclusive IPv6 ranges as 128-bit integers, sorted and merged.
    pub v6: Vec<(u128, u128)>,
    pub contains_negation: bool,
}

/// One entry of an IP-only CIDR list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpOnlyCidr {
    pub net: IpNet,
    pub negated: bool,
}

#[derive(Default)]
struct RangeSets {
    pos4: Vec<(u32, u32)>,
    neg4: Vec<(u32, u32)>,
    pos6: Vec<(u128, u128)>,
    neg6: Vec<(u128, u128)>,
    saw_negation: bool,
}

pub fn parse_address_group(input: &str) -> Result<AddressGroup, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty address specification".into());
    }

    let mut sets = RangeSets::default();
    parse_into(input, false, &mut sets)?;

    let pos4 = sets.pos4.into_iter().map(|(a, b)| (a as u128, b as u128)).collect();
    let neg4 = sets.neg4.into_iter().map(|(a, b)| (a as u128, b as u128)).collect();
    let v4 = resolve(pos4, neg4, 0, u32::MAX as u128)
        .into_iter()
        .map(|(a, b)| (a as u32, b as u32))
        .collect::<Vec<_>>();
    let v6 = resolve(sets.pos6, sets.neg6, 0, u128::MAX);

    if v4.is_empty() && v6.is_empty() {
        return Err(format!("address group \"{input}\" matches no addresses"));
    }

    Ok(AddressGroup { v4, v6, contains_negation: sets.saw_negation })
}

/// Flatten an address specification into a CIDR list for the IP-only engine.
/// Negation markers are kept as-is; the IP-only engine resolves them against
/// its radix tree.
pub fn parse_iponly_list(input: &str) -> Result<Vec<IpOnlyCidr>, String> {
    let mut out = Vec::new();
    flatten_iponly(input.trim(), false, &mut out)?;
    if out.is_empty() {
        return Err("empty address specification".into());
    }
    Ok(out)
}

fn flatten_iponly(input: &str, negate: bool, out: &mut Vec<IpOnlyCidr>) -> Result<(), String> {
    let (negate, body) = strip_negation(input, negate)?;
    if let Some(inner) = strip_brackets(body)? {
        for item in split_top_level(inner)? {
            flatten_iponly(item, negate, out)?;
        }
        return Ok(());
    }
    if body.eq_ignore_ascii_case("any") {
        if negate {
            return Err("negating \"any\" is not supported".into());
        }
        out.push(IpOnlyCidr { net: "0.0.0.0/0".parse().expect("constant"), negated: false });
        out.push(IpOnlyCidr { net: "::/0".parse().expect("constant"), negated: false });
        return Ok(());
    }
    let net = parse_net(body)?;
    out.push(IpOnlyCidr { net, negated: negate });
    Ok(())
}

fn parse_into(input: &str, negate: bool, sets: &mut RangeSets) -> Result<(), String> {
    let (negate, body) = {
        let (n, b) = strip_negation(input, negate)?;
        if n {
            sets.saw_negation = true;
        }
        (n, b)
    };

    if let Some(inner) = strip_brackets(body)? {
        for item in split_top_level(inner)? {
            parse_into(item, negate, sets)?;
        }
        return Ok(());
    }

    if body.eq_ignore_ascii_case("any") {
        if negate {
            return Err("negating \"any\" is not supported".into());
        }
        sets.pos4.push((0, u32::MAX));
        sets.pos6.push((0, u128::MAX));
        return Ok(());
    }

    let net = parse_net(body)?;
    match net {
        IpNet::V4(n) => {
            let lo = u32::from(n.network());
            let hi = u32::from(n.broadcast());
            if negate {
                sets.neg4.push((lo, hi));
            } else {
                sets.pos4.push((lo, hi));
            }
        }
        IpNet::V6(n) => {
            let lo = u128::from(n.network());
            let hi = u128::from(n.broadcast());
            if negate {
                sets.neg6.push((lo, hi));
            } else {
                sets.pos6.push((lo, hi));
            }
        }
    }
    Ok(())
}

fn strip_negation(input: &str, negate: bool) -> Result<(bool, &str), String> {
    let mut s = input.trim();
    let mut neg = negate;
    while let Some(rest) = s.strip_prefix('!') {
        neg = !neg;
        s = rest.trim_start();
    }
    if s.is_empty() {
        return Err("dangling negation in address specification".into());
    }
    Ok((neg, s))
}

fn strip_brackets(input: &str) -> Result<Option<&str>, String> {
    if let Some(rest) = input.strip_prefix('[') {
        match rest.strip_suffix(']') {
            Some(inner) => Ok(Some(inner)),
            None => Err(format!("unbalanced brackets in \"{input}\"")),
        }
    } else if input.ends_with(']') {
        Err(format!("unbalanced brackets in \"{input}\""))
    } else {
        Ok(None)
    }
}

fn split_top_level(input: &str) -> Result<Vec<&str>, String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("unbalanced brackets in \"{input}\""))?;
            }
            ',' if depth == 0 => {
                let item = input[start..i].trim();
                if item.is_empty() {
                    return Err("empty list member".into());
                }
                out.push(item);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(format!("unbalanced brackets in \"{input}\""));
    }
    let last = input[start..].trim();
    if last.is_empty() {
        return Err("empty list member".into());
    }
    out.push(last);
    Ok(out)
}

fn parse_net(s: &str) -> Result<IpNet, String> {
    if s.contains('/') {
        s.parse::<IpNet>()
            .map_err(|e| format!("invalid address block \"{s}\": {e}"))
    } else {
        match s.parse::<IpAddr>() {
            Ok(IpAddr::V4(a)) => Ok(IpNet::from(ipnet::Ipv4Net::new(a, 32).expect("host prefix"))),
            Ok(IpAddr::V6(a)) => Ok(IpNet::from(ipnet::Ipv6Net::new(a, 128).expect("host prefix"))),
            Err(e) => Err(format!("invalid address \"{s}\": {e}")),
        }
    }
}

/// Resolve positive and negative ranges into a canonical positive list.
/// A negation-only specification starts from the full address space.
fn resolve(
    mut pos: Vec<(u128, u128)>,
    neg: Vec<(u128, u128)>,
    space_lo: u128,
    space_hi: u128,
) -> Vec<(u128, u128)> {
    if pos.is_empty() && !neg.is_empty() {
        pos.push((space_lo, space_hi));
    }
    let mut ranges = normalize(pos);
    for cut in neg {
        ranges = ranges
            .into_iter()
            .flat_map(|(lo, hi)| subtract((lo, hi), cut))
            .collect();
    }
    ranges
}

fn normalize(mut ranges: Vec<(u128, u128)>) -> Vec<(u128, u128)> {
    ranges.sort_unstable();
    let mut out: Vec<(u128, u128)> = Vec::with_capacity(ranges.len());
    for (lo, hi) in ranges {
        match out.last_mut() {
            Some(last) if lo <= last.1.saturating_add(1) => last.1 = last.1.max(hi),
            _ => out.push((lo, hi)),
        }
    }
    out
}

fn subtract(range: (u128, u128), cut: (u128, u128)) -> Vec<(u128, u128)> {
    let (lo, hi) = range;
    let (clo, chi) = cut;
    if chi < lo || clo > hi {
        return vec![range];
    }
    let mut out = Vec::new();
    if clo > lo {
        out.push((lo, clo - 1));
    }
    if chi < hi {
        out.push((chi + 1, hi));
    }
    out
}

impl AddressGroup {
    /// Whether two groups cover the same addresses. Used by the
    /// bidirectional symmetry check; canonical forms make this a plain
    /// comparison.
    pub fn same_coverage(&self, other: &AddressGroup) -> bool {
        self.v4 == other.v4 && self.v6 == other.v6
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn v4(s: &str) -> u32 {
        s.parse::<Ipv4Addr>().map(u32::from).expect("valid address")
    }

    #[test]
    fn single_address() {
        let g = parse_address_group("1.2.3.4").expect("parses");
        assert_eq!(g.v4, vec![(v4("1.2.3.4"), v4("1.2.3.4"))]);
        assert!(g.v6.is_empty());
        assert!(!g.contains_negation);
    }

    #[test]
    fn any_covers_both_families() {
        let g = parse_address_group("any").expect("parses");
        assert_eq!(g.v4, vec![(0, u32::MAX)]);
        assert_eq!(g.v6, vec![(0, u128::MAX)]);
    }

    #[test]
    fn negated_single_address_splits_space() {
        let g = parse_address_group("!1.2.3.4").expect("parses");
        assert_eq!(
            g.v4,
            vec![(0, v4("1.2.3.4") - 1), (v4("1.2.3.4") + 1, u32::MAX)]
        );
        assert_eq!(g.v6, vec![(0, u128::MAX)]);
        assert!(g.contains_negation);
    }

    #[test]
    fn negated_any_is_refused() {
        assert!(parse_address_group("!any").is_err());
        assert!(parse_address_group("![any]").is_err());
    }

    #[test]
    fn nested_lists_flatten() {
        let g = parse_address_group("[1.2.3.4, [10.0.0.0/8, 192.168.1.1]]").expect("parses");
        assert_eq!(g.v4.len(), 3);
    }

    #[test]
    fn contradictory_members_are_refused() {
        assert!(parse_address_group("[1.2.3.4, !1.2.3.4]").is_err());
    }

    #[test]
    fn cidr_minus_host() {
        let g = parse_address_group("[10.0.0.0/30, !10.0.0.2]").expect("parses");
        assert_eq!(g.v4, vec![(v4("10.0.0.0"), v4("10.0.0.1")), (v4("10.0.0.3"), v4("10.0.0.3"))]);
    }

    #[test]
    fn unbalanced_brackets_are_refused() {
        assert!(parse_address_group("[1.2.3.4").is_err());
        assert!(parse_address_group("1.2.3.4]").is_err());
    }

    #[test]
    fn double_negation_cancels() {
        let g = parse_address_group("!!1.2.3.4").expect("parses");
        assert_eq!(g.v4, vec![(v4("1.2.3.4"), v4("1.2.3.4"))]);
    }

    #[test]
    fn symmetry_comparison_uses_canonical_forms() {
        let a = parse_address_group("[1.2.3.4, 1.2.3.5]").expect("parses");
        let b = parse_address_group("[1.2.3.5, 1.2.3.4]").expect("parses");
        assert!(a.same_coverage(&b));
    }

    #[test]
    fn iponly_list_keeps_negation_markers() {
        let list = parse_iponly_list("[10.0.0.0/8, !10.1.0.0/16]").expect("parses");
        assert_eq!(list.len(), 2);
        assert!(!list[0].negated);
        assert!(list[1].negated);
    }

    #[test]
    fn range_subtraction() {
        assert_eq!(subtract((0, 10), (3, 5)), vec![(0, 2), (6, 10)]);
        assert_eq!(subtract((0, 10), (20, 30)), vec![(0, 10)]);
        assert_eq!(subtract((0, 10), (0, 10)), Vec::<(u128, u128)>::new());
    }
}
